// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process identity provider for offline development and tests.
//!
//! Passwords are kept in plain text: this provider must never back a real
//! deployment.

use crate::error::IdentityError;
use crate::identity::{IdentityProvider, SignUpOutcome, SignUpRequest};
use crate::models::{ProfileImage, SessionIdentity};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct Account {
    identity: SessionIdentity,
    password: String,
}

#[derive(Default)]
struct Inner {
    accounts: DashMap<String, Account>,
    next_id: AtomicUsize,
    image_uploads: AtomicUsize,
    fail_uploads: AtomicBool,
}

/// Identity provider backed by a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    inner: Arc<Inner>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account directly.
    pub fn insert(&self, identity: SessionIdentity, password: &str) {
        self.inner.accounts.insert(
            identity.id.clone(),
            Account {
                identity,
                password: password.to_string(),
            },
        );
    }

    /// Number of successful image uploads so far.
    pub fn image_uploads(&self) -> usize {
        self.inner.image_uploads.load(Ordering::SeqCst)
    }

    /// Make image uploads fail with a transport error.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.inner.fail_uploads.store(fail, Ordering::SeqCst);
    }

    fn find_by_email(&self, email: &str) -> Option<String> {
        self.inner
            .accounts
            .iter()
            .find(|entry| {
                entry
                    .value()
                    .identity
                    .primary_email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|entry| entry.key().clone())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionIdentity, IdentityError> {
        let id = self
            .find_by_email(email)
            .ok_or(IdentityError::InvalidCredentials)?;
        let account = self
            .inner
            .accounts
            .get(&id)
            .ok_or(IdentityError::InvalidCredentials)?;

        if account.password != password {
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(account.identity.clone())
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, IdentityError> {
        if self.find_by_email(&request.email).is_some() {
            return Err(IdentityError::Rejected(
                "That email address is taken. Please try another.".to_string(),
            ));
        }

        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = SessionIdentity {
            id: format!("user_mem{n}"),
            primary_email: Some(request.email.clone()),
            image_url: None,
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
        };
        self.insert(identity.clone(), &request.password);

        Ok(SignUpOutcome {
            identity,
            needs_verification: false,
        })
    }

    async fn fetch_identity(&self, id: &str) -> Result<Option<SessionIdentity>, IdentityError> {
        Ok(self
            .inner
            .accounts
            .get(id)
            .map(|account| account.identity.clone()))
    }

    async fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let mut account = self
            .inner
            .accounts
            .get_mut(id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;

        if account.password != current_password {
            return Err(IdentityError::Rejected(
                "Current password is incorrect".to_string(),
            ));
        }
        account.password = new_password.to_string();
        Ok(())
    }

    async fn set_profile_image(&self, id: &str, image: ProfileImage) -> Result<(), IdentityError> {
        if self.inner.fail_uploads.load(Ordering::SeqCst) {
            return Err(IdentityError::Transport("image host unavailable".to_string()));
        }

        let mut account = self
            .inner
            .accounts
            .get_mut(id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;

        let n = self.inner.image_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        account.identity.image_url = Some(format!("memory://images/{}/{}/{}", id, n, image.file_name));
        Ok(())
    }
}
