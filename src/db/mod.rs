// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the profile store seam and its implementations.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{Profile, ProfilePatch};
use async_trait::async_trait;
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    /// Profile records, keyed by identity ID
    pub const USERS: &str = "users";
}

/// Derive the document key for an identity.
///
/// Identity IDs are opaque strings; anything that is not safe in a document
/// path is percent-encoded.
pub fn record_key(identity_id: &str) -> String {
    urlencoding::encode(identity_id).into_owned()
}

/// Current existence/content of one profile document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: String,
    pub profile: Option<Profile>,
}

impl Snapshot {
    pub fn exists(&self) -> bool {
        self.profile.is_some()
    }
}

pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

/// Handle for an open subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription closes it"]
pub struct Subscription {
    key: String,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(key: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key: key.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Key this subscription is listening to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Close the subscription now.
    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("open", &self.cancel.is_some())
            .finish()
    }
}

/// Per-key profile document store with real-time push.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read a profile once.
    async fn get(&self, key: &str) -> Result<Option<Profile>, StoreError>;

    /// Create or replace the document at `key`.
    async fn set(&self, key: &str, profile: &Profile) -> Result<(), StoreError>;

    /// Merge the present fields of `patch` into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, key: &str, patch: &ProfilePatch) -> Result<(), StoreError>;

    /// Delete the document at `key`. Deleting a missing document succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Listen to the document at `key`.
    ///
    /// `on_snapshot` receives the current state first and every change after
    /// that; `on_error` receives transport or permission failures. Callbacks
    /// may run on any task, and may still fire briefly after the returned
    /// handle is dropped.
    fn subscribe(
        &self,
        key: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Subscription;
}
