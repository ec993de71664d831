// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password authentication routes and session cookies.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::identity::Session;
use crate::middleware::auth::{create_jwt, SESSION_COOKIE, SESSION_HINT_COOKIE, SESSION_TTL_SECS};
use crate::models::SessionIdentity;
use crate::services::account::{password_requirements, PasswordRequirement};
use crate::services::{SignInForm, SignUpForm};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/password-requirements", post(check_password))
}

/// Response for sign-in and sign-up.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    pub identity: SessionIdentity,
    /// Email verification is pending; no session was started.
    pub needs_verification: bool,
}

/// Sign in with email and password.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<SignInForm>,
) -> Result<impl IntoResponse> {
    let account = state.account_service(Session::new());
    let identity = account.sign_in(&form).await?;

    let jar = start_session(jar, &state.config, &identity.id)?;
    tracing::info!(identity_id = %identity.id, "Session started");

    Ok((
        jar,
        Json(AuthResponse {
            identity,
            needs_verification: false,
        }),
    ))
}

/// Create an account. A session starts right away unless the provider
/// wants the email verified first.
async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<SignUpForm>,
) -> Result<impl IntoResponse> {
    let account = state.account_service(Session::new());
    let outcome = account.sign_up(&form).await?;

    let jar = if outcome.needs_verification {
        tracing::info!(identity_id = %outcome.identity.id, "Account awaits email verification");
        jar
    } else {
        start_session(jar, &state.config, &outcome.identity.id)?
    };

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            identity: outcome.identity,
            needs_verification: outcome.needs_verification,
        }),
    ))
}

/// Remove the session cookies.
async fn sign_out(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    (StatusCode::NO_CONTENT, end_session(jar, &state.config))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCheckRequest {
    password: String,
    #[serde(default)]
    confirm_password: String,
}

/// Live checklist for the sign-up form.
async fn check_password(Json(req): Json<PasswordCheckRequest>) -> Json<Vec<PasswordRequirement>> {
    Json(password_requirements(&req.password, &req.confirm_password))
}

// ─── Cookies ─────────────────────────────────────────────────

struct CookiePolicy {
    secure: bool,
    /// Domain for the hint cookie so sibling subdomains can read it.
    hint_domain: Option<String>,
}

impl CookiePolicy {
    fn for_config(config: &Config) -> Self {
        let secure = config.frontend_url.starts_with("https://");
        let host = frontend_host(&config.frontend_url);

        let hint_domain = host.filter(|_| secure).and_then(|host| {
            let labels: Vec<&str> = host.split('.').collect();
            (labels.len() >= 3).then(|| labels[1..].join("."))
        });

        Self {
            secure,
            hint_domain,
        }
    }

    fn session_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::seconds(SESSION_TTL_SECS))
            .build()
    }

    fn hint_cookie(&self, value: String) -> Cookie<'static> {
        let mut builder = Cookie::build((SESSION_HINT_COOKIE, value))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::seconds(SESSION_TTL_SECS));
        if let Some(domain) = &self.hint_domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

fn frontend_host(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest)?;
    let authority = rest.split('/').next()?;
    let host = authority.split(':').next()?;
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

fn start_session(jar: CookieJar, config: &Config, identity_id: &str) -> Result<CookieJar> {
    let jwt = create_jwt(identity_id, &config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let policy = CookiePolicy::for_config(config);
    Ok(jar
        .add(policy.session_cookie(jwt))
        .add(policy.hint_cookie("1".to_string())))
}

/// Expire both session cookies with the attributes they were set with.
pub(crate) fn end_session(jar: CookieJar, config: &Config) -> CookieJar {
    let policy = CookiePolicy::for_config(config);

    let mut token = policy.session_cookie(String::new());
    token.make_removal();
    let mut hint = policy.hint_cookie(String::new());
    hint.make_removal();

    jar.add(token).add(hint)
}
