// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use account_profiles::config::Config;
use account_profiles::db::{
    ErrorCallback, FirestoreDb, MemoryStore, ProfileStore, Snapshot, SnapshotCallback,
    Subscription,
};
use account_profiles::error::StoreError;
use account_profiles::identity::MemoryIdentityProvider;
use account_profiles::models::{Profile, ProfilePatch, SessionIdentity};
use account_profiles::routes::create_router;
use account_profiles::sync::{ProfileSync, ViewState};
use account_profiles::time_utils::ManualClock;
use account_profiles::AppState;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Clock for tests: starts at a fixed instant and ticks one second per read.
#[allow(dead_code)]
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        chrono::Duration::seconds(1),
    ))
}

/// Handles on the in-memory collaborators behind a test app.
#[allow(dead_code)]
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub identity: MemoryIdentityProvider,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
impl TestApp {
    /// Register an account and return a bearer token for it.
    pub fn account(&self, id: &str, first_name: &str, last_name: &str) -> String {
        let mut identity = SessionIdentity::new(id);
        identity.primary_email = Some(format!("{id}@example.com"));
        identity.first_name = Some(first_name.to_string());
        identity.last_name = Some(last_name.to_string());
        self.identity.insert(identity, "secret1");
        create_test_jwt(id, &self.state.config.jwt_signing_key)
    }
}

/// Create a test app with in-memory collaborators.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, TestApp) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> (axum::Router, TestApp) {
    create_test_app_with_config(Config {
        frontend_url: frontend_url.to_string(),
        ..Config::test_default()
    })
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, TestApp) {
    let store = MemoryStore::new();
    let identity = MemoryIdentityProvider::new();
    let clock = test_clock();

    let state = Arc::new(AppState {
        config,
        store: Arc::new(store.clone()),
        identity_provider: Arc::new(identity.clone()),
        clock: clock.clone(),
    });

    let app = TestApp {
        state: state.clone(),
        store,
        identity,
        clock,
    };
    (create_router(state), app)
}

/// Create a test app backed by a [`ManualStore`], with one registered
/// account. Returns the router, the store and a token for `id`.
#[allow(dead_code)]
pub fn create_manual_store_app(id: &str) -> (axum::Router, ManualStore, String) {
    let store = ManualStore::new();
    let identity = MemoryIdentityProvider::new();

    let mut account = SessionIdentity::new(id);
    account.primary_email = Some(format!("{id}@example.com"));
    identity.insert(account, "secret1");

    let config = Config::test_default();
    let token = create_test_jwt(id, &config.jwt_signing_key);
    let state = Arc::new(AppState {
        config,
        store: Arc::new(store.clone()),
        identity_provider: Arc::new(identity),
        clock: test_clock(),
    });

    (create_router(state), store, token)
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(identity_id: &str, signing_key: &[u8]) -> String {
    account_profiles::middleware::auth::create_jwt(identity_id, signing_key)
        .expect("JWT creation")
}

/// Wait (bounded) until the sync's view satisfies `pred`.
#[allow(dead_code)]
pub async fn wait_for_view(
    sync: &ProfileSync,
    pred: impl FnMut(&ViewState) -> bool,
) -> ViewState {
    let mut rx = sync.watch();
    let view = tokio::time::timeout(std::time::Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("view did not reach expected state")
        .expect("view sender dropped")
        .clone();
    view
}

/// One subscription handed out by [`ManualStore`].
#[allow(dead_code)]
pub struct Opened {
    pub key: String,
    pub on_snapshot: SnapshotCallback,
    pub on_error: ErrorCallback,
    pub cancelled: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl Opened {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Store that never delivers anything on its own. Tests fire snapshots and
/// errors through the recorded callbacks, in whatever order they like.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct ManualStore {
    opened: Arc<Mutex<Vec<Arc<Opened>>>>,
}

#[allow(dead_code)]
impl ManualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subscription opened so far, oldest first.
    pub fn opened(&self) -> Vec<Arc<Opened>> {
        self.opened.lock().clone()
    }

    /// Keys of subscriptions that have not been closed.
    pub fn live_keys(&self) -> Vec<String> {
        self.opened
            .lock()
            .iter()
            .filter(|o| !o.is_cancelled())
            .map(|o| o.key.clone())
            .collect()
    }

    pub fn fire(&self, index: usize, profile: Option<Profile>) {
        let opened = self.opened.lock()[index].clone();
        (opened.on_snapshot)(Snapshot {
            key: opened.key.clone(),
            profile,
        });
    }

    pub fn fail(&self, index: usize, err: StoreError) {
        let opened = self.opened.lock()[index].clone();
        (opened.on_error)(err);
    }
}

#[async_trait]
impl ProfileStore for ManualStore {
    async fn get(&self, _key: &str) -> Result<Option<Profile>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _profile: &Profile) -> Result<(), StoreError> {
        Ok(())
    }

    async fn update(&self, key: &str, _patch: &ProfilePatch) -> Result<(), StoreError> {
        Err(StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn subscribe(
        &self,
        key: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Subscription {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.opened.lock().push(Arc::new(Opened {
            key: key.to_string(),
            on_snapshot,
            on_error,
            cancelled: cancelled.clone(),
        }));

        Subscription::new(key, move || cancelled.store(true, Ordering::SeqCst))
    }
}
