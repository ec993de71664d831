// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::record_key;
use crate::error::{AppError, Result};
use crate::identity::Session;
use crate::middleware::auth::AuthUser;
use crate::models::{NewProfile, Profile, ProfileImage, ProfilePatch, SessionIdentity};
use crate::routes::auth::end_session;
use crate::services::{ChangePasswordForm, DashboardSummary};
use crate::sync::{ProfileSync, ViewState};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// How long a request waits for the first profile snapshot.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the original file name of an uploaded image.
const FILE_NAME_HEADER: &str = "x-file-name";

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes(max_image_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/events", get(me_events))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/profile", post(create_profile).patch(update_profile))
        .route(
            "/api/profile/image",
            // Leave headroom so oversized images reach validation instead of a bare 413.
            put(upload_image).layer(DefaultBodyLimit::max(max_image_bytes + 1024 * 1024)),
        )
        .route("/api/account/password", post(change_password))
        .route("/api/account", delete(delete_account))
}

/// Resolve the token subject to its identity.
async fn resolve_identity(state: &AppState, user: &AuthUser) -> Result<SessionIdentity> {
    state
        .identity_provider
        .fetch_identity(&user.identity_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(identity_id = %user.identity_id, "Token for unknown identity");
            AppError::Unauthorized
        })
}

/// Resolve the token subject to a live session.
async fn open_session(state: &AppState, user: &AuthUser) -> Result<Session> {
    Ok(Session::signed_in(resolve_identity(state, user).await?))
}

/// Wait for the first snapshot, or give up and report what is known.
async fn settle(sync: &ProfileSync) -> ViewState {
    match tokio::time::timeout(SETTLE_TIMEOUT, sync.settled()).await {
        Ok(view) => view,
        Err(_) => {
            tracing::warn!("Profile did not settle in time");
            sync.view()
        }
    }
}

// ─── Profile View ────────────────────────────────────────────

/// Current profile view.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ViewState>> {
    let session = open_session(&state, &user).await?;
    let sync = state.profile_sync(&session);
    Ok(Json(settle(&sync).await))
}

/// Stream every change of the profile view. The sync lives as long as the
/// client stays connected.
async fn me_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let session = open_session(&state, &user).await?;
    let sync = state.profile_sync(&session);
    let rx = sync.watch();
    tracing::info!(identity_id = %user.identity_id, "Profile event stream opened");

    let events = stream::unfold(
        (sync, session, rx, true),
        |(sync, session, mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let view = rx.borrow_and_update().clone();
            let event = match Event::default().event("view").json_data(&view) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode profile view");
                    Event::default().event("error").data("encoding failed")
                }
            };
            Some((Ok::<_, Infallible>(event), (sync, session, rx, false)))
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DashboardSummary>> {
    let session = open_session(&state, &user).await?;
    let sync = state.profile_sync(&session);
    let view = settle(&sync).await;

    let identity = session
        .current()
        .identity()
        .cloned()
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(DashboardSummary::new(&identity, &view)))
}

// ─── Profile Writes ──────────────────────────────────────────

/// First-time profile setup (create-or-replace).
async fn create_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<NewProfile>,
) -> Result<(StatusCode, Json<Profile>)> {
    validator::Validate::validate(&input)?;

    let identity = resolve_identity(&state, &user).await?;
    let profile = state.profile_writer().create_profile(&identity, input).await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// Partial update; returns the stored record.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<Profile>> {
    let identity = resolve_identity(&state, &user).await?;
    state.profile_writer().update_profile(&identity, patch).await?;

    let profile = state
        .store
        .get(&record_key(&user.identity_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Profile has not been set up".to_string()))?;
    Ok(Json(profile))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ImageResponse {
    pub image_url: Option<String>,
}

/// Replace the hosted profile image. The body is the raw image.
async fn upload_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ImageResponse>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or("profile-image")
        .to_string();

    let image = ProfileImage {
        file_name,
        content_type,
        bytes: body.to_vec(),
    };

    let session = open_session(&state, &user).await?;
    let image_url = state
        .account_service(session)
        .upload_profile_image(
            &state.profile_writer(),
            image,
            state.config.max_profile_image_bytes,
        )
        .await?;

    Ok(Json(ImageResponse { image_url }))
}

// ─── Account ─────────────────────────────────────────────────

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(form): Json<ChangePasswordForm>,
) -> Result<StatusCode> {
    let session = open_session(&state, &user).await?;
    state.account_service(session).change_password(&form).await?;

    tracing::info!(identity_id = %user.identity_id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Delete the profile record and end the session.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    let session = open_session(&state, &user).await?;
    state.account_service(session).delete_account().await?;

    Ok((StatusCode::NO_CONTENT, end_session(jar, &state.config)))
}
