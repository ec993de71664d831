// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Observable session state.
//!
//! A [`Session`] is the single writer of the current [`IdentityState`];
//! anything that needs to follow the signed-in user holds a receiver.

use crate::models::{IdentityState, SessionIdentity};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to the current session.
#[derive(Clone)]
pub struct Session {
    tx: Arc<watch::Sender<IdentityState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session whose identity has not been resolved yet.
    pub fn new() -> Self {
        Self::with_state(IdentityState::Unresolved)
    }

    /// A session already resolved to `identity`.
    pub fn signed_in(identity: SessionIdentity) -> Self {
        Self::with_state(IdentityState::SignedIn(identity))
    }

    fn with_state(state: IdentityState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> IdentityState {
        self.tx.borrow().clone()
    }

    /// Resolve to `identity`, or refresh it if the same user is signed in.
    pub fn sign_in(&self, identity: SessionIdentity) {
        tracing::debug!(identity_id = %identity.id, "Session signed in");
        self.tx.send_replace(IdentityState::SignedIn(identity));
    }

    pub fn sign_out(&self) {
        let previous = self.tx.send_replace(IdentityState::SignedOut);
        if let Some(identity) = previous.identity() {
            tracing::debug!(identity_id = %identity.id, "Session signed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receivers_observe_transitions() {
        let session = Session::new();
        let mut rx = session.subscribe();
        assert_eq!(*rx.borrow(), IdentityState::Unresolved);

        session.sign_in(SessionIdentity::new("user_1"));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().identity().map(|i| i.id.clone()),
            Some("user_1".to_string())
        );

        session.sign_out();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), IdentityState::SignedOut);
    }

    #[test]
    fn test_state_is_kept_without_receivers() {
        let session = Session::new();
        session.sign_in(SessionIdentity::new("user_1"));
        assert!(session.current().identity().is_some());
    }
}
