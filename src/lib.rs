// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Account profiles: the signed-in user's profile kept in sync with Firestore
//!
//! This crate provides the backend API for signing in through an external
//! identity provider, creating and editing the user's profile record, and
//! streaming a live view of that record as it changes.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod sync;
pub mod time_utils;

use config::Config;
use db::ProfileStore;
use identity::{IdentityProvider, Session};
use std::sync::Arc;
use sync::{ProfileSync, ProfileWriter};
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProfileStore>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Start a profile sync that follows `session`.
    pub fn profile_sync(&self, session: &Session) -> ProfileSync {
        ProfileSync::new(
            self.store.clone(),
            self.identity_provider.clone(),
            self.clock.clone(),
            session.subscribe(),
        )
    }

    /// Profile writes without a live subscription.
    pub fn profile_writer(&self) -> ProfileWriter {
        ProfileWriter::new(
            self.store.clone(),
            self.identity_provider.clone(),
            self.clock.clone(),
        )
    }

    pub fn account_service(&self, session: Session) -> services::AccountService {
        services::AccountService::new(
            session,
            self.store.clone(),
            self.identity_provider.clone(),
        )
    }
}
