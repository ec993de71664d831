// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session identity as resolved by the identity provider.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// The currently authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionIdentity {
    /// Identity provider user ID (stable external key)
    pub id: String,
    pub primary_email: Option<String>,
    /// Hosted profile image URL
    pub image_url: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl SessionIdentity {
    /// A bare identity carrying only its ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            primary_email: None,
            image_url: None,
            first_name: None,
            last_name: None,
        }
    }

    /// "First Last", or whichever half is present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// What the identity provider currently knows about the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityState {
    /// Provider has not finished loading.
    #[default]
    Unresolved,
    SignedOut,
    SignedIn(SessionIdentity),
}

impl IdentityState {
    pub fn identity(&self) -> Option<&SessionIdentity> {
        match self {
            IdentityState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, IdentityState::Unresolved)
    }
}

/// An image file handed to the identity provider's image hosting.
#[derive(Debug, Clone)]
pub struct ProfileImage {
    pub file_name: String,
    /// MIME type, e.g. `image/png`
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let mut identity = SessionIdentity::new("user_1");
        assert_eq!(identity.full_name(), None);

        identity.first_name = Some("Ann".to_string());
        assert_eq!(identity.full_name().as_deref(), Some("Ann"));

        identity.last_name = Some("Lee".to_string());
        assert_eq!(identity.full_name().as_deref(), Some("Ann Lee"));

        identity.first_name = Some("  ".to_string());
        assert_eq!(identity.full_name().as_deref(), Some("Lee"));
    }

    #[test]
    fn test_identity_state_accessors() {
        assert!(!IdentityState::Unresolved.is_resolved());
        assert!(IdentityState::SignedOut.is_resolved());
        assert!(IdentityState::SignedOut.identity().is_none());

        let state = IdentityState::SignedIn(SessionIdentity::new("user_1"));
        assert_eq!(state.identity().map(|i| i.id.as_str()), Some("user_1"));
    }
}
