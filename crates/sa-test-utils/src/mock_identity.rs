//! Scripted identity provider.
//!
//! Restoration returns whatever the mock was built with, optionally held
//! until the test resolves it. Session changes are emitted by the test in
//! the order it chooses.
//!
//! # Example
//!
//! ```rust,ignore
//! use sa_test_utils::{session, MockIdentityProvider};
//!
//! let (identity, restore) = MockIdentityProvider::held();
//! // ... spawn the authority, emit changes, then:
//! restore.resolve(Ok(Some(session("u1"))));
//! ```

use common::types::Session;
use session_authority::errors::IdentityError;
use session_authority::identity::{
    IdentityProvider, SessionBroadcaster, SessionChange, SessionChanges,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type RestoreResult = Result<Option<Session>, IdentityError>;

enum RestoreScript {
    Ready(RestoreResult),
    Held(oneshot::Receiver<RestoreResult>),
}

struct Inner {
    restore: Mutex<Option<RestoreScript>>,
    broadcaster: SessionBroadcaster,
    restore_calls: AtomicUsize,
}

/// Mock identity provider for authority tests.
#[derive(Clone)]
pub struct MockIdentityProvider {
    inner: Arc<Inner>,
}

/// Resolves a held restoration.
#[derive(Debug)]
pub struct RestoreGate {
    tx: oneshot::Sender<RestoreResult>,
}

impl RestoreGate {
    /// Complete the held `get_session` call with `result`.
    pub fn resolve(self, result: RestoreResult) {
        let _ = self.tx.send(result);
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityProvider {
    fn with_script(script: RestoreScript) -> Self {
        Self {
            inner: Arc::new(Inner {
                restore: Mutex::new(Some(script)),
                broadcaster: SessionBroadcaster::new(),
                restore_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Restoration finds no session.
    pub fn new() -> Self {
        Self::with_script(RestoreScript::Ready(Ok(None)))
    }

    /// Restoration finds `session`.
    pub fn with_session(session: Session) -> Self {
        Self::with_script(RestoreScript::Ready(Ok(Some(session))))
    }

    /// Restoration fails with `error`.
    pub fn failing(error: IdentityError) -> Self {
        Self::with_script(RestoreScript::Ready(Err(error)))
    }

    /// Restoration waits until the returned gate is resolved.
    ///
    /// Dropping the gate resolves restoration with `IdentityError::Unavailable`.
    pub fn held() -> (Self, RestoreGate) {
        let (tx, rx) = oneshot::channel();
        (Self::with_script(RestoreScript::Held(rx)), RestoreGate { tx })
    }

    /// Deliver `change` to every subscriber. Returns how many received it.
    pub fn emit(&self, change: SessionChange) -> usize {
        self.inner.broadcaster.broadcast(&change)
    }

    pub fn sign_in(&self, session: Session) -> usize {
        self.emit(SessionChange::signed_in(session))
    }

    pub fn refresh(&self, session: Session) -> usize {
        self.emit(SessionChange::token_refreshed(session))
    }

    pub fn sign_out(&self) -> usize {
        self.emit(SessionChange::signed_out())
    }

    /// End every subscriber's change stream.
    pub fn close_subscriptions(&self) {
        self.inner.broadcaster.close();
    }

    /// Number of `get_session` calls so far.
    pub fn restore_calls(&self) -> usize {
        self.inner.restore_calls.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcaster.subscriber_count()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, IdentityError> {
        self.inner.restore_calls.fetch_add(1, Ordering::SeqCst);

        let script = self.inner.restore.lock().unwrap().take();
        match script {
            Some(RestoreScript::Ready(result)) => result,
            Some(RestoreScript::Held(rx)) => rx.await.unwrap_or_else(|_| {
                Err(IdentityError::Unavailable("restore gate dropped".to_string()))
            }),
            // Only the first call is scripted.
            None => Ok(None),
        }
    }

    fn subscribe(&self) -> SessionChanges {
        self.inner.broadcaster.subscribe()
    }
}
