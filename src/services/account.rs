// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account operations that sit beside the profile: sign-in, sign-up,
//! password changes, account deletion and profile image uploads.
//!
//! Every operation works against one [`Session`]; signing in or out moves
//! that session, and any [`ProfileSync`](crate::sync::ProfileSync) watching
//! it follows along.

use crate::db::{record_key, ProfileStore};
use crate::error::{AppError, Result};
use crate::identity::{split_name, IdentityProvider, Session, SignUpOutcome, SignUpRequest};
use crate::models::{ProfileImage, SessionIdentity};
use crate::sync::ProfileWriter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Default ceiling for uploaded profile images.
pub const DEFAULT_MAX_PROFILE_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInForm {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpForm {
    #[serde(default)]
    pub name: Option<String>,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordForm {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
}

/// One line of the sign-up password checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordRequirement {
    pub label: &'static str,
    pub met: bool,
}

/// Checklist shown under the sign-up password fields.
pub fn password_requirements(password: &str, confirm: &str) -> Vec<PasswordRequirement> {
    vec![
        PasswordRequirement {
            label: "At least 6 characters",
            met: password.chars().count() >= MIN_PASSWORD_LENGTH,
        },
        PasswordRequirement {
            label: "Passwords match",
            met: !password.is_empty() && password == confirm,
        },
    ]
}

/// Reject images the identity provider should never see.
pub fn validate_profile_image(image: &ProfileImage, max_bytes: usize) -> Result<()> {
    if !image.content_type.starts_with("image/") {
        return Err(AppError::BadRequest(format!(
            "Unsupported file type: {}",
            image.content_type
        )));
    }
    if image.bytes.is_empty() {
        return Err(AppError::BadRequest("Image is empty".to_string()));
    }
    if image.bytes.len() > max_bytes {
        return Err(AppError::BadRequest(format!(
            "Image must be smaller than {}",
            format_size(max_bytes)
        )));
    }
    Ok(())
}

/// Human-readable size for limits: whole MB, then KB, then bytes.
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{} KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}

pub struct AccountService {
    session: Session,
    store: Arc<dyn ProfileStore>,
    identity_provider: Arc<dyn IdentityProvider>,
}

impl AccountService {
    pub fn new(
        session: Session,
        store: Arc<dyn ProfileStore>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            session,
            store,
            identity_provider,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn sign_in(&self, form: &SignInForm) -> Result<SessionIdentity> {
        form.validate()?;

        let identity = self
            .identity_provider
            .sign_in(form.email.trim(), &form.password)
            .await?;
        self.session.sign_in(identity.clone());
        Ok(identity)
    }

    /// Create an account. The session is only signed in when the provider
    /// does not require email verification first.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<SignUpOutcome> {
        form.validate()?;

        let (first_name, last_name) = form.name.as_deref().map(split_name).unwrap_or_default();
        let outcome = self
            .identity_provider
            .sign_up(&SignUpRequest {
                email: form.email.trim().to_string(),
                password: form.password.clone(),
                first_name,
                last_name,
            })
            .await?;

        if !outcome.needs_verification {
            self.session.sign_in(outcome.identity.clone());
        }
        Ok(outcome)
    }

    pub fn sign_out(&self) {
        if let Some(identity) = self.session.current().identity() {
            tracing::info!(identity_id = %identity.id, "Signed out");
        }
        self.session.sign_out();
    }

    fn require_identity(&self) -> Result<SessionIdentity> {
        self.session
            .current()
            .identity()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }

    pub async fn change_password(&self, form: &ChangePasswordForm) -> Result<()> {
        form.validate()?;
        let identity = self.require_identity()?;

        self.identity_provider
            .change_password(&identity.id, &form.current_password, &form.new_password)
            .await?;
        Ok(())
    }

    /// Delete the profile record and end the session. The identity provider
    /// account is left in place.
    pub async fn delete_account(&self) -> Result<()> {
        let identity = self.require_identity()?;

        self.store.delete(&record_key(&identity.id)).await.map_err(|e| {
            tracing::error!(identity_id = %identity.id, error = %e, "Failed to delete profile");
            AppError::from(e)
        })?;

        tracing::info!(identity_id = %identity.id, "Account deleted");
        self.session.sign_out();
        Ok(())
    }

    /// Validate and upload `image` through `writer`, then refresh the session
    /// identity so the new hosted URL reaches any view. Returns that URL.
    pub async fn upload_profile_image(
        &self,
        writer: &ProfileWriter,
        image: ProfileImage,
        max_bytes: usize,
    ) -> Result<Option<String>> {
        validate_profile_image(&image, max_bytes)?;
        let identity = self.require_identity()?;

        writer.set_profile_image(&identity, image).await?;

        match self.identity_provider.fetch_identity(&identity.id).await? {
            Some(refreshed) => {
                let image_url = refreshed.image_url.clone();
                self.session.sign_in(refreshed);
                Ok(image_url)
            }
            None => {
                tracing::warn!(identity_id = %identity.id, "Identity vanished after image upload");
                Ok(None)
            }
        }
    }
}
