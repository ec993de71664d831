// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod identity;
pub mod profile;

pub use identity::{IdentityState, ProfileImage, SessionIdentity};
pub use profile::{NewProfile, Profile, ProfilePatch, Role};
