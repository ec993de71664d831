// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account Profiles API Server
//!
//! Signs users in through the identity provider and keeps their profile
//! records in Firestore.

use account_profiles::{
    config::Config, db::FirestoreDb, identity::ClerkClient, time_utils::SystemClock, AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Account Profiles API");

    // Initialize Firestore database
    let store = FirestoreDb::new(&config.gcp_project_id).await?;

    let identity_provider = ClerkClient::new(
        config.identity_api_url.clone(),
        config.identity_secret_key.clone(),
    );
    tracing::info!(url = %config.identity_api_url, "Identity provider client initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store: Arc::new(store),
        identity_provider: Arc::new(identity_provider),
        clock: Arc::new(SystemClock),
    });

    // Build router
    let app = account_profiles::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("account_profiles=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
