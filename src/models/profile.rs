// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile record model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::SessionIdentity;

/// Session length used when the caller does not pick one.
pub const DEFAULT_SESSION_MINUTES: u32 = 60;
/// Gap between sessions used when the caller does not pick one.
pub const DEFAULT_BUFFER_MINUTES: u32 = 15;

/// What a user does on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Role {
    Provider,
    Booker,
    Both,
}

impl Role {
    pub fn is_provider(self) -> bool {
        matches!(self, Role::Provider | Role::Both)
    }

    pub fn is_booker(self) -> bool {
        matches!(self, Role::Booker | Role::Both)
    }
}

/// User profile stored in Firestore.
///
/// Field names are camelCase so the documents stay readable by web clients
/// sharing the same collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    /// Identity provider user ID (also used as document ID)
    pub id: String,
    /// Primary email at creation time (empty if the provider had none)
    pub email: String,
    pub display_name: String,
    pub role: Role,
    /// IANA timezone name
    pub timezone: String,
    pub default_session_minutes: u32,
    pub buffer_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for first-time profile setup.
///
/// `id` and `email` are never part of the input: they come from the session.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    #[validate(length(min = 1, message = "Display name is required"))]
    pub display_name: String,
    pub role: Role,
    #[validate(length(min = 1, message = "Timezone is required"))]
    pub timezone: String,
    #[serde(default)]
    pub default_session_minutes: Option<u32>,
    #[serde(default)]
    pub buffer_minutes: Option<u32>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Profile {
    /// Build a complete record from setup input and the owning identity.
    ///
    /// Unset scheduling fields fall back to 60/15 minutes. Both timestamps
    /// are stamped with `now`.
    pub fn apply_defaults(
        identity: &SessionIdentity,
        input: NewProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.primary_email.clone().unwrap_or_default(),
            display_name: input.display_name,
            role: input.role,
            timezone: input.timezone,
            default_session_minutes: input
                .default_session_minutes
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_SESSION_MINUTES),
            buffer_minutes: input
                .buffer_minutes
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_BUFFER_MINUTES),
            bio: input.bio,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in memory (used by stores without native merge).
    pub fn merge(&mut self, patch: &ProfilePatch) {
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(display_name) = &patch.display_name {
            self.display_name = display_name.clone();
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(timezone) = &patch.timezone {
            self.timezone = timezone.clone();
        }
        if let Some(minutes) = patch.default_session_minutes {
            self.default_session_minutes = minutes;
        }
        if let Some(minutes) = patch.buffer_minutes {
            self.buffer_minutes = minutes;
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// Partial profile update. Only `Some` fields are written.
///
/// `id` and `createdAt` are not patchable. `updatedAt` is accepted on the wire
/// but always replaced with the write time before it reaches the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_session_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    /// Names of the fields this patch writes, as stored in Firestore.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.email.is_some() {
            paths.push("email");
        }
        if self.display_name.is_some() {
            paths.push("displayName");
        }
        if self.role.is_some() {
            paths.push("role");
        }
        if self.timezone.is_some() {
            paths.push("timezone");
        }
        if self.default_session_minutes.is_some() {
            paths.push("defaultSessionMinutes");
        }
        if self.buffer_minutes.is_some() {
            paths.push("bufferMinutes");
        }
        if self.bio.is_some() {
            paths.push("bio");
        }
        if self.updated_at.is_some() {
            paths.push("updatedAt");
        }
        paths
    }
}

/// True iff the profile exists and its role includes providing sessions.
pub fn is_provider_role(profile: Option<&Profile>) -> bool {
    profile.is_some_and(|p| p.role.is_provider())
}

/// True iff the profile exists and its role includes booking sessions.
pub fn is_booker_role(profile: Option<&Profile>) -> bool {
    profile.is_some_and(|p| p.role.is_booker())
}
