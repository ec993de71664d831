// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile sync adapter.
//!
//! Follows the session identity, keeps one live subscription on that
//! identity's profile document, and publishes a [`ViewState`] that screens
//! can read or watch. Mutations write through to the store and the identity
//! provider; they never touch the published view directly, the subscription
//! reports their effect.
//!
//! Every subscription is opened under a generation number. Snapshot and error
//! callbacks carry the generation they were opened with and are ignored once
//! a newer one is current, so a late delivery for a previous identity can
//! never leak into the view.

pub mod state;
pub mod writer;

pub use state::{SyncPhase, ViewState};
pub use writer::ProfileWriter;

use crate::db::{record_key, ErrorCallback, ProfileStore, Snapshot, SnapshotCallback, Subscription};
use crate::error::{ProfileError, StoreError};
use crate::identity::IdentityProvider;
use crate::models::{
    profile, IdentityState, NewProfile, Profile, ProfileImage, ProfilePatch, SessionIdentity,
};
use crate::time_utils::Clock;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Subscription currently owned by the adapter.
#[derive(Default)]
struct Active {
    generation: u64,
    identity: Option<SessionIdentity>,
    subscription: Option<Subscription>,
}

struct Inner {
    writer: ProfileWriter,
    view: watch::Sender<ViewState>,
    active: Mutex<Active>,
}

impl Inner {
    fn apply_identity(self: &Arc<Self>, state: IdentityState) {
        match state {
            IdentityState::Unresolved => self.close(ViewState::unresolved()),
            IdentityState::SignedOut => self.close(ViewState::no_session()),
            IdentityState::SignedIn(identity) => {
                if !self.refresh_identity(&identity) {
                    self.open(identity);
                }
            }
        }
    }

    /// Same user as before: take the new identity details without
    /// resubscribing. Returns false if the ID changed.
    fn refresh_identity(&self, identity: &SessionIdentity) -> bool {
        let mut active = self.active.lock();
        let same = active
            .identity
            .as_ref()
            .is_some_and(|current| current.id == identity.id);
        if !same {
            return false;
        }

        active.identity = Some(identity.clone());
        self.view.send_if_modified(|view| {
            if view.image_url == identity.image_url {
                return false;
            }
            view.image_url = identity.image_url.clone();
            true
        });
        true
    }

    /// Tear down the current subscription and publish `view`.
    fn close(&self, view: ViewState) {
        let previous = {
            let mut active = self.active.lock();
            active.generation += 1;
            if let Some(identity) = active.identity.take() {
                tracing::debug!(
                    identity_id = %identity.id,
                    generation = active.generation,
                    "Closing profile subscription"
                );
            }
            self.view.send_replace(view);
            active.subscription.take()
        };
        drop(previous);
    }

    fn open(self: &Arc<Self>, identity: SessionIdentity) {
        let key = record_key(&identity.id);

        let (generation, previous) = {
            let mut active = self.active.lock();
            active.generation += 1;
            active.identity = Some(identity.clone());
            self.view.send_replace(ViewState::subscribing(&identity));
            (active.generation, active.subscription.take())
        };
        // The old subscription is closed before the new one exists.
        drop(previous);

        tracing::debug!(
            identity_id = %identity.id,
            generation,
            "Opening profile subscription"
        );

        let on_snapshot: SnapshotCallback = {
            let inner: Weak<Inner> = Arc::downgrade(self);
            Arc::new(move |snapshot| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_snapshot(generation, snapshot);
                }
            })
        };
        let on_error: ErrorCallback = {
            let inner: Weak<Inner> = Arc::downgrade(self);
            Arc::new(move |err| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_error(generation, err);
                }
            })
        };

        // The store may deliver the first snapshot before this returns, so no
        // lock is held across the call.
        let subscription = self.writer.store().subscribe(&key, on_snapshot, on_error);

        let mut active = self.active.lock();
        if active.generation == generation {
            active.subscription = Some(subscription);
        } else {
            drop(active);
            tracing::debug!(generation, "Subscription superseded while opening");
            drop(subscription);
        }
    }

    fn on_snapshot(&self, generation: u64, snapshot: Snapshot) {
        let active = self.active.lock();
        if active.generation != generation {
            tracing::debug!(
                key = %snapshot.key,
                generation,
                current = active.generation,
                "Discarding stale profile snapshot"
            );
            return;
        }

        let exists = snapshot.exists();
        let changed = self.view.send_if_modified(|view| {
            let before = view.clone();
            view.apply_snapshot(snapshot);
            *view != before
        });
        if changed {
            tracing::debug!(generation, exists, "Profile snapshot applied");
        }
    }

    fn on_error(&self, generation: u64, err: StoreError) {
        let active = self.active.lock();
        if active.generation != generation {
            tracing::debug!(generation, error = %err, "Discarding stale subscription error");
            return;
        }

        tracing::error!(
            identity_id = ?active.identity.as_ref().map(|i| i.id.as_str()),
            error = %err,
            "Error fetching user profile"
        );
        self.view.send_modify(|view| view.apply_error(err));
    }
}

/// Follow the session for as long as the adapter lives.
async fn drive(inner: Weak<Inner>, mut identity: watch::Receiver<IdentityState>) {
    while identity.changed().await.is_ok() {
        let state = identity.borrow_and_update().clone();
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_identity(state);
    }
    tracing::debug!("Session closed; profile sync keeps its last state");
}

/// Live view of the signed-in user's profile.
///
/// Must be created inside a tokio runtime. Dropping it closes the
/// subscription.
pub struct ProfileSync {
    inner: Arc<Inner>,
    driver: JoinHandle<()>,
}

impl ProfileSync {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        mut identity: watch::Receiver<IdentityState>,
    ) -> Self {
        let (view, _) = watch::channel(ViewState::unresolved());
        let inner = Arc::new(Inner {
            writer: ProfileWriter::new(store, identity_provider, clock),
            view,
            active: Mutex::new(Active::default()),
        });

        let initial = identity.borrow_and_update().clone();
        if initial.is_resolved() {
            inner.apply_identity(initial);
        }

        let driver = tokio::spawn(drive(Arc::downgrade(&inner), identity));
        Self { inner, driver }
    }

    /// Current view.
    pub fn view(&self) -> ViewState {
        self.inner.view.borrow().clone()
    }

    /// Receiver that observes every view change.
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.inner.view.subscribe()
    }

    /// Wait until the view is no longer loading and return it.
    pub async fn settled(&self) -> ViewState {
        let mut rx = self.inner.view.subscribe();
        let settled = rx.wait_for(|view| !view.is_loading).await;
        match settled {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        }
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.view.borrow().profile.clone()
    }

    pub fn image_url(&self) -> Option<String> {
        self.inner.view.borrow().image_url.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.view.borrow().is_loading
    }

    pub fn error(&self) -> Option<ProfileError> {
        self.inner.view.borrow().error.clone()
    }

    pub fn needs_profile_setup(&self) -> bool {
        self.inner.view.borrow().needs_profile_setup
    }

    pub fn is_provider_role(&self) -> bool {
        profile::is_provider_role(self.inner.view.borrow().profile.as_ref())
    }

    pub fn is_booker_role(&self) -> bool {
        profile::is_booker_role(self.inner.view.borrow().profile.as_ref())
    }

    fn current_identity(&self) -> Result<SessionIdentity, ProfileError> {
        self.inner
            .active
            .lock()
            .identity
            .clone()
            .ok_or(ProfileError::NoSession)
    }

    /// Write a complete profile for the signed-in identity.
    ///
    /// Create-or-replace; unset scheduling fields get their defaults. Returns
    /// the record as written.
    pub async fn create_profile(&self, input: NewProfile) -> Result<Profile, ProfileError> {
        let identity = self.current_identity()?;
        self.inner.writer.create_profile(&identity, input).await
    }

    /// Merge `patch` into the signed-in identity's profile.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<(), ProfileError> {
        let identity = self.current_identity()?;
        self.inner.writer.update_profile(&identity, patch).await
    }

    pub async fn set_profile_image(&self, image: ProfileImage) -> Result<(), ProfileError> {
        let identity = self.current_identity()?;
        self.inner.writer.set_profile_image(&identity, image).await
    }
}

impl Drop for ProfileSync {
    fn drop(&mut self) {
        self.driver.abort();
        let last = self.view();
        self.inner.close(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::identity::{MemoryIdentityProvider, Session};
    use crate::models::Role;
    use crate::time_utils::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        store: MemoryStore,
        provider: MemoryIdentityProvider,
        clock: Arc<ManualClock>,
        session: Session,
        sync: ProfileSync,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let provider = MemoryIdentityProvider::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
            Duration::seconds(1),
        ));
        let session = Session::new();
        let sync = ProfileSync::new(
            Arc::new(store.clone()),
            Arc::new(provider.clone()),
            clock.clone(),
            session.subscribe(),
        );
        Harness {
            store,
            provider,
            clock,
            session,
            sync,
        }
    }

    fn identity(id: &str) -> SessionIdentity {
        let mut identity = SessionIdentity::new(id);
        identity.primary_email = Some(format!("{id}@example.com"));
        identity
    }

    fn new_profile(name: &str, role: Role) -> NewProfile {
        NewProfile {
            display_name: name.to_string(),
            role,
            timezone: "UTC".to_string(),
            default_session_minutes: None,
            buffer_minutes: None,
            bio: None,
        }
    }

    async fn wait_for(sync: &ProfileSync, pred: impl FnMut(&ViewState) -> bool) -> ViewState {
        let mut rx = sync.watch();
        let view = tokio::time::timeout(std::time::Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("view did not reach expected state")
            .unwrap()
            .clone();
        view
    }

    #[tokio::test]
    async fn test_starts_unresolved_and_loading() {
        let h = harness();
        let view = h.sync.view();
        assert_eq!(view.phase, SyncPhase::Unresolved);
        assert!(view.is_loading);
        assert!(!h.sync.needs_profile_setup());
    }

    #[tokio::test]
    async fn test_signed_out_settles_without_subscription() {
        let h = harness();
        h.session.sign_out();

        let view = wait_for(&h.sync, |v| v.phase == SyncPhase::NoSession).await;
        assert!(!view.is_loading);
        assert!(view.profile.is_none());
        assert!(h.store.subscribed_keys().is_empty());
    }

    #[tokio::test]
    async fn test_new_identity_needs_setup() {
        let h = harness();
        h.session.sign_in(identity("u1"));

        let view = wait_for(&h.sync, |v| v.phase == SyncPhase::NeedsSetup).await;
        assert!(view.profile.is_none());
        assert!(!view.is_loading);
        assert!(view.needs_profile_setup);
        assert_eq!(h.store.subscribed_keys(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_create_profile_flips_view_to_synced() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| v.needs_profile_setup).await;

        let written = h
            .sync
            .create_profile(new_profile("Ann", Role::Booker))
            .await
            .unwrap();
        assert_eq!(written.id, "u1");
        assert_eq!(written.default_session_minutes, 60);
        assert_eq!(written.buffer_minutes, 15);

        let view = wait_for(&h.sync, |v| v.phase == SyncPhase::Synced).await;
        assert!(!view.needs_profile_setup);
        assert_eq!(view.profile.unwrap().display_name, "Ann");
        assert!(h.sync.is_booker_role());
        assert!(!h.sync.is_provider_role());
    }

    #[tokio::test]
    async fn test_update_overwrites_caller_updated_at() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| !v.is_loading).await;
        let created = h
            .sync
            .create_profile(new_profile("Ann", Role::Both))
            .await
            .unwrap();

        let expected = h.clock.peek();
        h.sync
            .update_profile(ProfilePatch {
                bio: Some("hi".to_string()),
                updated_at: Some(Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();

        let stored = h.store.document("u1").unwrap();
        assert_eq!(stored.bio.as_deref(), Some("hi"));
        assert_eq!(stored.updated_at, expected);
        assert!(stored.updated_at > created.updated_at);
        assert_eq!(stored.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_without_record_is_write_error() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| v.needs_profile_setup).await;

        let err = h
            .sync
            .update_profile(ProfilePatch {
                bio: Some("hi".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Write(StoreError::NotFound(_))));
        assert!(h.sync.view().needs_profile_setup);
    }

    #[tokio::test]
    async fn test_mutators_without_session_touch_nothing() {
        let h = harness();
        h.session.sign_out();
        wait_for(&h.sync, |v| v.phase == SyncPhase::NoSession).await;

        let create = h.sync.create_profile(new_profile("Ann", Role::Booker)).await;
        let update = h.sync.update_profile(ProfilePatch::default()).await;
        let image = h
            .sync
            .set_profile_image(ProfileImage {
                file_name: "a.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![0],
            })
            .await;

        assert_eq!(create.unwrap_err(), ProfileError::NoSession);
        assert_eq!(update.unwrap_err(), ProfileError::NoSession);
        assert_eq!(image.unwrap_err(), ProfileError::NoSession);
        assert!(h.store.document("").is_none());
        assert_eq!(h.provider.image_uploads(), 0);
    }

    #[tokio::test]
    async fn test_subscription_error_keeps_last_profile() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| !v.is_loading).await;
        let written = h
            .sync
            .create_profile(new_profile("Ann", Role::Provider))
            .await
            .unwrap();
        wait_for(&h.sync, |v| v.phase == SyncPhase::Synced).await;

        h.store
            .emit_error("u1", StoreError::Unavailable("permission denied".to_string()));

        let view = h.sync.view();
        assert_eq!(view.phase, SyncPhase::Errored);
        assert_eq!(view.profile, Some(written));
        assert!(!view.is_loading);
        assert!(matches!(view.error, Some(ProfileError::Subscription(_))));
    }

    #[tokio::test]
    async fn test_write_failure_leaves_view_untouched() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        let before = wait_for(&h.sync, |v| !v.is_loading).await;

        h.store.set_unavailable(true);
        let err = h
            .sync
            .create_profile(new_profile("Ann", Role::Booker))
            .await
            .unwrap_err();

        assert!(matches!(err, ProfileError::Write(StoreError::Unavailable(_))));
        assert_eq!(h.sync.view(), before);
    }

    #[tokio::test]
    async fn test_identity_switch_resubscribes() {
        let h = harness();
        h.store.seed(
            "u2",
            Profile::apply_defaults(&identity("u2"), new_profile("Bo", Role::Both), h.clock.now()),
        );
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| v.subject.as_deref() == Some("u1") && !v.is_loading).await;

        h.session.sign_in(identity("u2"));
        let view = wait_for(&h.sync, |v| v.subject.as_deref() == Some("u2") && !v.is_loading).await;

        assert_eq!(view.phase, SyncPhase::Synced);
        assert_eq!(view.profile.unwrap().display_name, "Bo");
        assert_eq!(h.store.subscribed_keys(), vec!["u2".to_string()]);
    }

    #[tokio::test]
    async fn test_same_identity_refresh_keeps_subscription() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| !v.is_loading).await;

        let mut refreshed = identity("u1");
        refreshed.image_url = Some("https://img.example.com/new.png".to_string());
        h.session.sign_in(refreshed);

        let view = wait_for(&h.sync, |v| v.image_url.is_some()).await;
        assert_eq!(view.phase, SyncPhase::NeedsSetup);
        assert_eq!(h.store.listener_count("u1"), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_subscription() {
        let h = harness();
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| !v.is_loading).await;
        assert_eq!(h.store.listener_count("u1"), 1);

        drop(h.sync);
        assert_eq!(h.store.listener_count("u1"), 0);
    }

    #[tokio::test]
    async fn test_image_upload_is_delegated() {
        let h = harness();
        h.provider.insert(identity("u1"), "secret1");
        h.session.sign_in(identity("u1"));
        wait_for(&h.sync, |v| !v.is_loading).await;

        h.sync
            .set_profile_image(ProfileImage {
                file_name: "me.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap();
        assert_eq!(h.provider.image_uploads(), 1);
        assert!(h.store.document("u1").is_none());

        h.provider.set_fail_uploads(true);
        let err = h
            .sync
            .set_profile_image(ProfileImage {
                file_name: "me.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![1],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::ImageUpload(_)));
    }
}
