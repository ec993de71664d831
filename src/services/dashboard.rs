// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard summary derived from the session identity and profile view.

use crate::models::{Role, SessionIdentity};
use crate::sync::ViewState;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// What the dashboard header and account card show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DashboardSummary {
    pub initials: String,
    pub greeting: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub role: Option<Role>,
    pub needs_profile_setup: bool,
}

impl DashboardSummary {
    pub fn new(identity: &SessionIdentity, view: &ViewState) -> Self {
        let name = identity.full_name();
        let email = identity.primary_email.clone();

        Self {
            initials: initials(name.as_deref(), email.as_deref()),
            greeting: greeting(name.as_deref()),
            name,
            email,
            image_url: view.image_url.clone(),
            role: view.profile.as_ref().map(|p| p.role),
            needs_profile_setup: view.needs_profile_setup,
        }
    }
}

/// Avatar initials: first letter of up to two name words, else the first
/// letter of the email, else `?`.
pub fn initials(name: Option<&str>, email: Option<&str>) -> String {
    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        return name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect();
    }

    email
        .and_then(|e| e.chars().next())
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

pub fn greeting(name: Option<&str>) -> String {
    match name.and_then(|n| n.split_whitespace().next()) {
        Some(first) => format!("Welcome back, {}!", first),
        None => "Welcome back!".to_string(),
    }
}
