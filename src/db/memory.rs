// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process profile store for offline development and tests.
//!
//! Writes notify subscribers synchronously, and a new subscription receives
//! the current document state before `subscribe` returns.

use crate::db::{ErrorCallback, ProfileStore, Snapshot, SnapshotCallback, Subscription};
use crate::error::StoreError;
use crate::models::{Profile, ProfilePatch};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

struct Listener {
    key: String,
    on_snapshot: SnapshotCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct Inner {
    docs: DashMap<String, Profile>,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    unavailable: AtomicBool,
}

/// Profile store backed by a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document in place without going through `set`.
    pub fn seed(&self, key: &str, profile: Profile) {
        self.inner.docs.insert(key.to_string(), profile);
    }

    /// Current document at `key`, if any.
    pub fn document(&self, key: &str) -> Option<Profile> {
        self.inner.docs.get(key).map(|doc| doc.value().clone())
    }

    /// Number of open subscriptions on `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner
            .listeners
            .iter()
            .filter(|entry| entry.value().key == key)
            .count()
    }

    /// Keys with at least one open subscription.
    pub fn subscribed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .listeners
            .iter()
            .map(|entry| entry.value().key.clone())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Make every read and write fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Report `err` to every subscriber of `key`.
    pub fn emit_error(&self, key: &str, err: StoreError) {
        let callbacks: Vec<ErrorCallback> = self
            .inner
            .listeners
            .iter()
            .filter(|entry| entry.value().key == key)
            .map(|entry| entry.value().on_error.clone())
            .collect();

        for on_error in callbacks {
            on_error(err.clone());
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store is marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn notify(&self, key: &str) {
        let callbacks: Vec<SnapshotCallback> = self
            .inner
            .listeners
            .iter()
            .filter(|entry| entry.value().key == key)
            .map(|entry| entry.value().on_snapshot.clone())
            .collect();

        if callbacks.is_empty() {
            return;
        }

        let snapshot = Snapshot {
            key: key.to_string(),
            profile: self.document(key),
        };

        for on_snapshot in callbacks {
            on_snapshot(snapshot.clone());
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Profile>, StoreError> {
        self.check_available()?;
        Ok(self.document(key))
    }

    async fn set(&self, key: &str, profile: &Profile) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner.docs.insert(key.to_string(), profile.clone());
        self.notify(key);
        Ok(())
    }

    async fn update(&self, key: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        self.check_available()?;
        match self.inner.docs.get_mut(key) {
            Some(mut doc) => doc.merge(patch),
            None => return Err(StoreError::NotFound(format!("users/{}", key))),
        }
        self.notify(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if self.inner.docs.remove(key).is_some() {
            self.notify(key);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        key: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.insert(
            id,
            Listener {
                key: key.to_string(),
                on_snapshot: on_snapshot.clone(),
                on_error: on_error.clone(),
            },
        );

        if let Err(e) = self.check_available() {
            on_error(e);
        } else {
            on_snapshot(Snapshot {
                key: key.to_string(),
                profile: self.document(key),
            });
        }

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(key, move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.remove(&id);
            }
        })
    }
}
