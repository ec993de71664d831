// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider seam: authentication, password management and
//! profile-image hosting are all delegated through [`IdentityProvider`].

pub mod clerk;
pub mod memory;
pub mod session;

pub use clerk::ClerkClient;
pub use memory::MemoryIdentityProvider;
pub use session::Session;

use crate::error::IdentityError;
use crate::models::{ProfileImage, SessionIdentity};
use async_trait::async_trait;

/// Account creation request passed through to the provider.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Result of a successful sign-up.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub identity: SessionIdentity,
    /// The provider wants the email address verified before first use.
    pub needs_verification: bool,
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify credentials and return the identity they belong to.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionIdentity, IdentityError>;

    /// Create an account.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, IdentityError>;

    /// Look up an identity by ID. `None` if the provider no longer knows it.
    async fn fetch_identity(&self, id: &str) -> Result<Option<SessionIdentity>, IdentityError>;

    /// Replace the password after verifying the current one.
    async fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Upload a new hosted profile image for the identity.
    async fn set_profile_image(&self, id: &str, image: ProfileImage) -> Result<(), IdentityError>;
}

/// Split a single "full name" field into first and last name.
pub fn split_name(name: &str) -> (Option<String>, Option<String>) {
    let name = name.trim();
    if name.is_empty() {
        return (None, None);
    }
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => {
            let rest = rest.trim();
            (
                Some(first.to_string()),
                (!rest.is_empty()).then(|| rest.to_string()),
            )
        }
        None => (Some(name.to_string()), None),
    }
}
