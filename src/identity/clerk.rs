// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider client for the Clerk backend API.
//!
//! Handles:
//! - Credential verification for email/password sign-in
//! - Account creation
//! - Identity lookup (email, names, hosted image URL)
//! - Password changes
//! - Profile image uploads

use crate::error::IdentityError;
use crate::identity::{IdentityProvider, SignUpOutcome, SignUpRequest};
use crate::models::{ProfileImage, SessionIdentity};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Clerk backend API client.
#[derive(Clone)]
pub struct ClerkClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

/// User object as returned by the backend API.
#[derive(Debug, Deserialize)]
pub struct ClerkUser {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<ClerkEmailAddress>,
}

#[derive(Debug, Deserialize)]
pub struct ClerkEmailAddress {
    pub id: String,
    pub email_address: String,
    pub verification: Option<ClerkVerification>,
}

#[derive(Debug, Deserialize)]
pub struct ClerkVerification {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct VerifyPasswordResponse {
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct ClerkErrorBody {
    #[serde(default)]
    errors: Vec<ClerkErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ClerkErrorItem {
    message: String,
    long_message: Option<String>,
}

impl ClerkUser {
    fn primary_email(&self) -> Option<&ClerkEmailAddress> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .find(|e| Some(e.id.as_str()) == primary)
            .or_else(|| self.email_addresses.first())
    }

    /// Whether the primary email still awaits verification.
    pub fn needs_verification(&self) -> bool {
        self.primary_email()
            .and_then(|e| e.verification.as_ref())
            .is_some_and(|v| v.status != "verified")
    }

    pub fn into_identity(self) -> SessionIdentity {
        let primary_email = self.primary_email().map(|e| e.email_address.clone());
        SessionIdentity {
            id: self.id,
            primary_email,
            image_url: self.image_url.filter(|url| !url.is_empty()),
            first_name: self.first_name.filter(|n| !n.is_empty()),
            last_name: self.last_name.filter(|n| !n.is_empty()),
        }
    }
}

impl ClerkClient {
    /// Create a new client with the backend secret key.
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<ClerkUser>, IdentityError> {
        let url = format!("{}/users", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(&[("email_address", email)])
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let users: Vec<ClerkUser> = check_response_json(response).await?;
        Ok(users.into_iter().next())
    }

    async fn verify_password(&self, id: &str, password: &str) -> Result<bool, IdentityError> {
        let url = format!("{}/users/{}/verify_password", self.base_url, id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        // A wrong password comes back as 400/422, not `verified: false`.
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Ok(false);
        }

        let body: VerifyPasswordResponse = check_response_json(response).await?;
        Ok(body.verified)
    }

    async fn get_user(&self, id: &str) -> Result<Option<ClerkUser>, IdentityError> {
        let url = format!("{}/users/{}", self.base_url, id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        check_response_json(response).await.map(Some)
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionIdentity, IdentityError> {
        let user = self
            .find_user_by_email(email)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !self.verify_password(&user.id, password).await? {
            tracing::info!(identity_id = %user.id, "Password verification failed");
            return Err(IdentityError::InvalidCredentials);
        }

        tracing::info!(identity_id = %user.id, "Signed in with password");
        Ok(user.into_identity())
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, IdentityError> {
        let url = format!("{}/users", self.base_url);
        let mut body = serde_json::json!({
            "email_address": [request.email],
            "password": request.password,
        });
        if let Some(first_name) = &request.first_name {
            body["first_name"] = serde_json::Value::String(first_name.clone());
        }
        if let Some(last_name) = &request.last_name {
            body["last_name"] = serde_json::Value::String(last_name.clone());
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let user: ClerkUser = check_response_json(response).await?;
        let needs_verification = user.needs_verification();
        tracing::info!(identity_id = %user.id, needs_verification, "Account created");

        Ok(SignUpOutcome {
            identity: user.into_identity(),
            needs_verification,
        })
    }

    async fn fetch_identity(&self, id: &str) -> Result<Option<SessionIdentity>, IdentityError> {
        Ok(self.get_user(id).await?.map(ClerkUser::into_identity))
    }

    async fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        if !self.verify_password(id, current_password).await? {
            return Err(IdentityError::Rejected(
                "Current password is incorrect".to_string(),
            ));
        }

        let url = format!("{}/users/{}", self.base_url, id);
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.secret_key)
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        check_response(response).await?;
        tracing::info!(identity_id = %id, "Password changed");
        Ok(())
    }

    async fn set_profile_image(&self, id: &str, image: ProfileImage) -> Result<(), IdentityError> {
        let url = format!("{}/users/{}/profile_image", self.base_url, id);
        let size = image.bytes.len();

        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.content_type)
            .map_err(|e| IdentityError::Rejected(format!("Invalid content type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        check_response(response).await?;
        tracing::info!(identity_id = %id, bytes = size, "Profile image uploaded");
        Ok(())
    }
}

/// Map a non-success response to an error, preferring the provider's message.
async fn error_from_response(response: reqwest::Response) -> IdentityError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ClerkErrorBody>(&body)
        .ok()
        .and_then(|b| b.errors.into_iter().next())
        .map(|e| e.long_message.unwrap_or(e.message));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::error!(status = %status, "Identity provider rejected our credentials");
            IdentityError::Transport(format!("HTTP {}", status))
        }
        StatusCode::NOT_FOUND => IdentityError::NotFound(message.unwrap_or(body)),
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!("Identity provider rate limit hit (429)");
            IdentityError::Transport("Rate limited".to_string())
        }
        s if s.is_client_error() => {
            IdentityError::Rejected(message.unwrap_or_else(|| format!("HTTP {}", s)))
        }
        s => IdentityError::Transport(format!("HTTP {}: {}", s, body)),
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<(), IdentityError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(error_from_response(response).await)
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, IdentityError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| IdentityError::Transport(format!("Invalid response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_json() -> serde_json::Value {
        serde_json::json!({
            "id": "user_2abc",
            "first_name": "Ann",
            "last_name": "",
            "image_url": "https://img.example.com/ann.png",
            "primary_email_address_id": "idn_2",
            "email_addresses": [
                { "id": "idn_1", "email_address": "old@example.com",
                  "verification": { "status": "verified" } },
                { "id": "idn_2", "email_address": "ann@example.com",
                  "verification": { "status": "unverified" } }
            ]
        })
    }

    #[test]
    fn test_into_identity_uses_primary_email() {
        let user: ClerkUser = serde_json::from_value(user_json()).unwrap();
        assert!(user.needs_verification());

        let identity = user.into_identity();
        assert_eq!(identity.id, "user_2abc");
        assert_eq!(identity.primary_email.as_deref(), Some("ann@example.com"));
        assert_eq!(identity.first_name.as_deref(), Some("Ann"));
        assert_eq!(identity.last_name, None);
        assert_eq!(
            identity.image_url.as_deref(),
            Some("https://img.example.com/ann.png")
        );
    }

    #[test]
    fn test_user_without_emails() {
        let user: ClerkUser = serde_json::from_value(serde_json::json!({
            "id": "user_x",
            "first_name": null,
            "last_name": null,
            "image_url": null,
            "primary_email_address_id": null
        }))
        .unwrap();

        assert!(!user.needs_verification());
        assert_eq!(user.into_identity().primary_email, None);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ClerkClient::new("https://api.example.com/v1/".to_string(), "sk".to_string());
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    /// Serve a backend that knows one user and answers password checks
    /// with `verify_status`.
    async fn backend(verify_status: StatusCode) -> ClerkClient {
        use axum::{
            routing::{get, patch, post},
            Json, Router,
        };

        let app = Router::new()
            .route(
                "/users",
                get(|| async { Json(serde_json::json!([user_json()])) }),
            )
            .route(
                "/users/user_2abc/verify_password",
                post(move || async move {
                    (
                        verify_status,
                        Json(serde_json::json!({ "errors": [{ "message": "backend said no" }] })),
                    )
                }),
            )
            .route(
                "/users/user_2abc",
                patch(|| async { Json(user_json()) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        ClerkClient::new(format!("http://{addr}"), "sk_test".to_string())
    }

    #[tokio::test]
    async fn test_password_mismatch_is_invalid_credentials() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNPROCESSABLE_ENTITY] {
            let client = backend(status).await;
            let err = client.sign_in("ann@example.com", "wrong").await.unwrap_err();
            assert_eq!(err, IdentityError::InvalidCredentials, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_rejected_secret_key_is_not_a_wrong_password() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let client = backend(status).await;
            let err = client.sign_in("ann@example.com", "secret1").await.unwrap_err();
            assert!(
                matches!(err, IdentityError::Transport(_)),
                "status {status} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_a_wrong_password() {
        let client = backend(StatusCode::TOO_MANY_REQUESTS).await;

        let err = client.sign_in("ann@example.com", "secret1").await.unwrap_err();
        assert_eq!(err, IdentityError::Transport("Rate limited".to_string()));

        let err = client
            .change_password("user_2abc", "secret1", "secret2")
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::Transport("Rate limited".to_string()));
    }

    #[tokio::test]
    async fn test_change_password_with_wrong_current_password() {
        let client = backend(StatusCode::UNPROCESSABLE_ENTITY).await;
        let err = client
            .change_password("user_2abc", "wrong", "secret2")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IdentityError::Rejected("Current password is incorrect".to_string())
        );
    }
}
