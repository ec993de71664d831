// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile writes for a known identity.
//!
//! A [`ProfileWriter`] holds no subscription, so request handlers that only
//! write can use it directly. [`ProfileSync`](super::ProfileSync) delegates
//! to one for its own mutators.

use crate::db::{record_key, ProfileStore};
use crate::error::ProfileError;
use crate::identity::IdentityProvider;
use crate::models::{NewProfile, Profile, ProfileImage, ProfilePatch, SessionIdentity};
use crate::time_utils::{format_utc_rfc3339, Clock};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProfileWriter {
    store: Arc<dyn ProfileStore>,
    identity_provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
}

impl ProfileWriter {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            identity_provider,
            clock,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Write a complete profile for `identity`.
    ///
    /// Create-or-replace; unset scheduling fields get their defaults. Returns
    /// the record as written.
    pub async fn create_profile(
        &self,
        identity: &SessionIdentity,
        input: NewProfile,
    ) -> Result<Profile, ProfileError> {
        let profile = Profile::apply_defaults(identity, input, self.clock.now());
        let key = record_key(&identity.id);

        self.store.set(&key, &profile).await.map_err(|e| {
            tracing::error!(identity_id = %identity.id, error = %e, "Error creating user profile");
            ProfileError::Write(e)
        })?;

        tracing::info!(identity_id = %identity.id, role = ?profile.role, "Profile created");
        Ok(profile)
    }

    /// Merge `patch` into the existing profile.
    ///
    /// `updated_at` is always the write time, whatever the patch carried.
    pub async fn update_profile(
        &self,
        identity: &SessionIdentity,
        mut patch: ProfilePatch,
    ) -> Result<(), ProfileError> {
        let now = self.clock.now();
        patch.updated_at = Some(now);
        let key = record_key(&identity.id);

        self.store.update(&key, &patch).await.map_err(|e| {
            tracing::error!(identity_id = %identity.id, error = %e, "Error updating user profile");
            ProfileError::Write(e)
        })?;

        tracing::info!(
            identity_id = %identity.id,
            updated_at = %format_utc_rfc3339(now),
            fields = ?patch.field_paths(),
            "Profile updated"
        );
        Ok(())
    }

    /// Hand `image` to the identity provider's image hosting.
    ///
    /// No size or type checks happen here; callers own that policy.
    pub async fn set_profile_image(
        &self,
        identity: &SessionIdentity,
        image: ProfileImage,
    ) -> Result<(), ProfileError> {
        self.identity_provider
            .set_profile_image(&identity.id, image)
            .await
            .map_err(|e| {
                tracing::error!(identity_id = %identity.id, error = %e, "Error updating profile image");
                ProfileError::ImageUpload(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::identity::MemoryIdentityProvider;
    use crate::models::Role;
    use crate::time_utils::ManualClock;
    use chrono::{TimeZone, Utc};

    fn writer(store: &MemoryStore) -> ProfileWriter {
        ProfileWriter::new(
            Arc::new(store.clone()),
            Arc::new(MemoryIdentityProvider::new()),
            Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
                chrono::Duration::seconds(1),
            )),
        )
    }

    fn identity() -> SessionIdentity {
        let mut identity = SessionIdentity::new("u1");
        identity.primary_email = Some("u1@example.com".to_string());
        identity
    }

    #[tokio::test]
    async fn test_writes_do_not_subscribe() {
        let store = MemoryStore::new();
        let writer = writer(&store);

        writer
            .create_profile(
                &identity(),
                NewProfile {
                    display_name: "Ann".to_string(),
                    role: Role::Booker,
                    timezone: "UTC".to_string(),
                    default_session_minutes: None,
                    buffer_minutes: None,
                    bio: None,
                },
            )
            .await
            .unwrap();
        writer
            .update_profile(
                &identity(),
                ProfilePatch {
                    bio: Some("Hi".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.listener_count("u1"), 0);
        let stored = store.document("u1").unwrap();
        assert_eq!(stored.bio.as_deref(), Some("Hi"));
        assert!(stored.updated_at > stored.created_at);
    }

    #[tokio::test]
    async fn test_update_without_record_is_write_error() {
        let store = MemoryStore::new();
        let err = writer(&store)
            .update_profile(&identity(), ProfilePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Write(_)));
    }
}
