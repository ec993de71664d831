// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Published view of the profile sync adapter and its transitions.

use crate::db::Snapshot;
use crate::error::{ProfileError, StoreError};
use crate::models::{Profile, SessionIdentity};
use serde::{Serialize, Serializer};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where the adapter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SyncPhase {
    /// Identity provider has not reported yet.
    Unresolved,
    /// Resolved with nobody signed in.
    NoSession,
    /// Subscription open, first snapshot pending.
    Subscribing,
    Synced,
    NeedsSetup,
    /// Subscription reported a failure; last known data is kept.
    Errored,
}

/// Everything a screen needs to render the current user's profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ViewState {
    pub phase: SyncPhase,
    /// Identity ID this view belongs to
    pub subject: Option<String>,
    pub profile: Option<Profile>,
    /// Hosted image from the identity provider, independent of the profile
    pub image_url: Option<String>,
    pub is_loading: bool,
    #[serde(serialize_with = "serialize_error")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub error: Option<ProfileError>,
    pub needs_profile_setup: bool,
}

fn serialize_error<S: Serializer>(
    error: &Option<ProfileError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::unresolved()
    }
}

impl ViewState {
    pub fn unresolved() -> Self {
        Self {
            phase: SyncPhase::Unresolved,
            subject: None,
            profile: None,
            image_url: None,
            is_loading: true,
            error: None,
            needs_profile_setup: false,
        }
    }

    pub fn no_session() -> Self {
        Self {
            phase: SyncPhase::NoSession,
            is_loading: false,
            ..Self::unresolved()
        }
    }

    /// Fresh view for a newly opened subscription. Nothing from a previous
    /// identity carries over.
    pub fn subscribing(identity: &SessionIdentity) -> Self {
        Self {
            phase: SyncPhase::Subscribing,
            subject: Some(identity.id.clone()),
            image_url: identity.image_url.clone(),
            ..Self::unresolved()
        }
    }

    /// Re-evaluate existence from a snapshot. Clears any earlier error.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.needs_profile_setup = snapshot.profile.is_none();
        self.phase = if snapshot.profile.is_some() {
            SyncPhase::Synced
        } else {
            SyncPhase::NeedsSetup
        };
        self.profile = snapshot.profile;
        self.is_loading = false;
        self.error = None;
    }

    /// Record a subscription failure, keeping the last known profile.
    pub fn apply_error(&mut self, err: StoreError) {
        self.phase = SyncPhase::Errored;
        self.is_loading = false;
        self.error = Some(ProfileError::Subscription(err));
    }
}
