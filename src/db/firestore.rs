// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing the profile store.
//!
//! Provides:
//! - Profile reads and writes (`users/{id}`)
//! - Merge updates that require the document to exist
//! - Real-time subscriptions via Firestore listen targets

use crate::db::{
    collections, ErrorCallback, ProfileStore, Snapshot, SnapshotCallback, Subscription,
};
use crate::error::StoreError;
use crate::models::{Profile, ProfilePatch};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreListenEvent, FirestoreListenerTarget, FirestoreMemListenStateStorage,
    FirestoreWritePrecondition,
};
use tokio::sync::oneshot;

/// Listen target ID. Each subscription owns its own listener, so one ID is enough.
const PROFILE_TARGET_ID: u32 = 1;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client.as_ref().ok_or_else(|| {
            StoreError::Unavailable("Database not connected (offline mode)".to_string())
        })
    }

    /// Deliver the current document, then stream changes until `cancel` fires.
    async fn run_listener(
        &self,
        key: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
        cancel: oneshot::Receiver<()>,
    ) -> Result<(), StoreError> {
        let client = self.get_client()?;

        // Listen targets only report documents that exist, so absence has to
        // come from an explicit read.
        let current = self.get(key).await?;
        on_snapshot(Snapshot {
            key: key.to_string(),
            profile: current,
        });

        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(to_store_error)?;

        client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .batch_listen([key.to_string()])
            .add_target(FirestoreListenerTarget::new(PROFILE_TARGET_ID), &mut listener)
            .map_err(to_store_error)?;

        let listen_key = key.to_string();
        listener
            .start(move |event| {
                let on_snapshot = on_snapshot.clone();
                let on_error = on_error.clone();
                let key = listen_key.clone();
                async move {
                    match event {
                        FirestoreListenEvent::DocumentChange(ref change) => {
                            if let Some(doc) = &change.document {
                                match firestore::FirestoreDb::deserialize_doc_to::<Profile>(doc) {
                                    Ok(profile) => on_snapshot(Snapshot {
                                        key,
                                        profile: Some(profile),
                                    }),
                                    Err(e) => {
                                        tracing::warn!(key = %key, error = %e, "Malformed profile document");
                                        on_error(StoreError::Rejected(format!(
                                            "Malformed profile document: {}",
                                            e
                                        )));
                                    }
                                }
                            }
                        }
                        FirestoreListenEvent::DocumentDelete(_)
                        | FirestoreListenEvent::DocumentRemove(_) => {
                            on_snapshot(Snapshot { key, profile: None });
                        }
                        _ => {}
                    }
                    Ok(())
                }
            })
            .await
            .map_err(to_store_error)?;

        tracing::debug!(key = %key, "Profile listener started");

        // Sender dropped or fired: either way the subscription is over.
        let _ = cancel.await;

        listener.shutdown().await.map_err(to_store_error)?;
        tracing::debug!(key = %key, "Profile listener stopped");
        Ok(())
    }
}

fn to_store_error(err: FirestoreError) -> StoreError {
    match err {
        FirestoreError::DataNotFoundError(e) => StoreError::NotFound(e.to_string()),
        FirestoreError::DataConflictError(e) => StoreError::Rejected(e.to_string()),
        FirestoreError::InvalidParametersError(e) => StoreError::Rejected(e.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ProfileStore for FirestoreDb {
    async fn get(&self, key: &str) -> Result<Option<Profile>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(key)
            .await
            .map_err(to_store_error)
    }

    async fn set(&self, key: &str, profile: &Profile) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(key)
            .object(profile)
            .execute()
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn update(&self, key: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(patch.field_paths())
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(key)
            .object(patch)
            .execute()
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(key)
            .execute()
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    fn subscribe(
        &self,
        key: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Subscription {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let db = self.clone();
        let listen_key = key.to_string();

        tokio::spawn(async move {
            if let Err(e) = db
                .run_listener(&listen_key, on_snapshot, on_error.clone(), cancel_rx)
                .await
            {
                tracing::warn!(key = %listen_key, error = %e, "Profile subscription failed");
                on_error(e);
            }
        });

        Subscription::new(key, move || {
            let _ = cancel_tx.send(());
        })
    }
}
