// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod dashboard;

pub use account::{AccountService, ChangePasswordForm, SignInForm, SignUpForm};
pub use dashboard::DashboardSummary;
