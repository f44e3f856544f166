//! Identity provider adapter contract.
//!
//! The authority needs two things from the provider: a one-shot lookup of
//! the persisted session at startup, and an ordered stream of session
//! changes (sign-in, sign-out, token refresh) for the life of the process.
//! Vendor SDKs and the HTTP adapter in [`crate::http`] implement
//! [`IdentityProvider`]; tests use the scripted mock in `sa-test-utils`.

use crate::errors::IdentityError;
use common::types::Session;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Kind of session change reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl AuthEvent {
    /// Returns the event as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn => "signed_in",
            AuthEvent::SignedOut => "signed_out",
            AuthEvent::TokenRefreshed => "token_refreshed",
            AuthEvent::UserUpdated => "user_updated",
        }
    }
}

/// One session-change notification.
///
/// `session` fully replaces the authority's current session; `None` means
/// signed out regardless of `event`.
#[derive(Debug, Clone)]
pub struct SessionChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl SessionChange {
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self {
            event: AuthEvent::SignedIn,
            session: Some(session),
        }
    }

    #[must_use]
    pub fn token_refreshed(session: Session) -> Self {
        Self {
            event: AuthEvent::TokenRefreshed,
            session: Some(session),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            event: AuthEvent::SignedOut,
            session: None,
        }
    }
}

/// Ordered stream of session changes for one subscriber.
#[derive(Debug)]
pub struct SessionChanges(mpsc::UnboundedReceiver<SessionChange>);

impl SessionChanges {
    /// Wrap a receiver whose sender is owned by the provider.
    #[must_use]
    pub fn from_receiver(receiver: mpsc::UnboundedReceiver<SessionChange>) -> Self {
        Self(receiver)
    }

    /// Next change, or `None` once the provider has gone away.
    pub async fn next(&mut self) -> Option<SessionChange> {
        self.0.recv().await
    }

    /// Change already delivered, without waiting.
    pub fn try_next(&mut self) -> Option<SessionChange> {
        self.0.try_recv().ok()
    }
}

/// Contract the authority consumes from the identity provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Restore the persisted session, if any.
    ///
    /// Called once at authority startup.
    async fn get_session(&self) -> Result<Option<Session>, IdentityError>;

    /// Register for session-change notifications.
    ///
    /// Changes emitted after this call are delivered in order.
    fn subscribe(&self) -> SessionChanges;
}

/// Fan-out of session changes to every live subscriber.
///
/// Each subscriber gets its own unbounded channel so delivery order is
/// preserved and a slow reader never drops notifications. Closed
/// subscribers are pruned on the next broadcast.
#[derive(Debug, Default)]
pub struct SessionBroadcaster {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionChange>>>,
}

impl SessionBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self) -> SessionChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        SessionChanges::from_receiver(rx)
    }

    /// Deliver `change` to all live subscribers, returning how many got it.
    pub fn broadcast(&self, change: &SessionChange) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        subscribers.len()
    }

    /// Drop every subscriber. Their streams end after draining.
    pub fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of live subscribers as of the last broadcast.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
