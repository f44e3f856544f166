//! `SessionAuthority` - single owner of the signed-in session and profile.
//!
//! The actor:
//! - Restores the persisted session once at startup
//! - Applies session changes from the identity provider in delivery order
//! - Fetches the profile for every new subject and discards stale results
//! - Serves refresh and update requests from handles
//!
//! # Lifecycle
//!
//! 1. `spawn` subscribes to session changes, then restoration starts
//! 2. Runs until cancelled or every handle is dropped
//! 3. In-flight fetches finish on their own; their results are dropped

use crate::errors::{AuthorityError, IdentityError, ProfileStoreError};
use crate::identity::{IdentityProvider, SessionChange, SessionChanges};
use crate::observability::metrics::{self, AuthorityMetrics};
use crate::store::ProfileStore;

use super::messages::AuthorityMessage;
use super::state::{AuthState, ProfileState};

use common::profile::{Profile, ProfileUpdate};
use common::types::{Session, SubjectId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the authority mailbox.
const AUTHORITY_CHANNEL_BUFFER: usize = 64;

/// Handle to the `SessionAuthority`.
///
/// Accessors read the latest published snapshot and never block on the
/// actor. All state changes go through the actor's mailbox.
#[derive(Clone, Debug)]
pub struct SessionAuthorityHandle {
    sender: mpsc::Sender<AuthorityMessage>,
    state: watch::Receiver<AuthState>,
    cancel_token: CancellationToken,
    metrics: Arc<AuthorityMetrics>,
}

impl SessionAuthorityHandle {
    /// Current session, if signed in.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    /// Profile of the current subject, once loaded.
    #[must_use]
    pub fn current_profile(&self) -> Option<Profile> {
        self.state.borrow().profile().cloned()
    }

    #[must_use]
    pub fn profile_state(&self) -> ProfileState {
        self.state.borrow().profile_state().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Whether initial restoration has completed. Never goes back to false.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Copy of the full published state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<AuthorityMetrics> {
        &self.metrics
    }

    /// Wait until initial restoration has completed.
    pub async fn wait_until_ready(&self) -> Result<AuthState, AuthorityError> {
        self.wait_for(AuthState::is_ready).await
    }

    /// Wait until the authority is ready and no profile fetch is in flight.
    pub async fn wait_for_profile_settled(&self) -> Result<AuthState, AuthorityError> {
        self.wait_for(AuthState::is_settled).await
    }

    /// Wait for the first published state matching `predicate`.
    ///
    /// Returns immediately if the current state already matches.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&AuthState) -> bool,
    ) -> Result<AuthState, AuthorityError> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(predicate)
            .await
            .map_err(|e| AuthorityError::Internal(format!("state channel closed: {e}")))?
            .clone();
        Ok(matched)
    }

    /// Re-fetch the current subject's profile.
    ///
    /// Returns once the fetch has started; observe completion through
    /// [`Self::subscribe`] or [`Self::wait_for_profile_settled`].
    pub async fn refresh_profile(&self) -> Result<(), AuthorityError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AuthorityMessage::RefreshProfile { respond_to: tx })
            .await
            .map_err(|e| AuthorityError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AuthorityError::Internal(format!("response receive failed: {e}")))?
    }

    /// Write `update` to the current subject's profile.
    ///
    /// On success the stored profile replaces the published one. On failure
    /// the published state is left unchanged.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, AuthorityError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AuthorityMessage::UpdateProfile {
                update,
                respond_to: tx,
            })
            .await
            .map_err(|e| AuthorityError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AuthorityError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the authority actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `SessionAuthority` actor.
pub struct SessionAuthority {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    /// Message receiver.
    receiver: mpsc::Receiver<AuthorityMessage>,
    /// Weak so the mailbox closes once every handle is gone.
    mailbox: mpsc::WeakSender<AuthorityMessage>,
    /// `None` once the provider closed the stream.
    changes: Option<SessionChanges>,
    state: watch::Sender<AuthState>,
    /// Fetch generation. Completions carrying an older value are stale.
    epoch: u64,
    cancel_token: CancellationToken,
    metrics: Arc<AuthorityMetrics>,
}

impl SessionAuthority {
    /// Spawn the authority.
    ///
    /// Subscribes to session changes before returning, so no change emitted
    /// after this call is missed. Returns a handle and the task join handle.
    pub fn spawn(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        metrics: Arc<AuthorityMetrics>,
        cancel_token: CancellationToken,
    ) -> (SessionAuthorityHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(AUTHORITY_CHANNEL_BUFFER);
        let (state_tx, state_rx) = watch::channel(AuthState::Initializing);
        let changes = identity.subscribe();

        let actor = Self {
            identity,
            store,
            receiver,
            mailbox: sender.downgrade(),
            changes: Some(changes),
            state: state_tx,
            epoch: 0,
            cancel_token: cancel_token.clone(),
            metrics: Arc::clone(&metrics),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionAuthorityHandle {
            sender,
            state: state_rx,
            cancel_token,
            metrics,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sa.authority")]
    async fn run(mut self) {
        debug!(target: "sa.authority", "SessionAuthority started");

        self.spawn_restore();

        loop {
            // Changes wait in the subscription until restoration resolves.
            let ready = self.state.borrow().is_ready();

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sa.authority",
                        "SessionAuthority received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            debug!(
                                target: "sa.authority",
                                "All handles dropped, stopping SessionAuthority"
                            );
                            break;
                        }
                    }
                }

                change = next_change(&mut self.changes), if ready => {
                    match change {
                        Some(change) => self.apply_change(change),
                        None => {
                            warn!(
                                target: "sa.authority",
                                "Session change subscription closed, session is now fixed"
                            );
                            self.changes = None;
                        }
                    }
                }
            }
        }

        info!(
            target: "sa.authority",
            final_phase = self.state.borrow().phase(),
            "SessionAuthority stopped"
        );
    }

    fn handle_message(&mut self, message: AuthorityMessage) {
        match message {
            AuthorityMessage::Restored { result } => self.complete_restore(result),

            AuthorityMessage::FetchCompleted {
                epoch,
                subject,
                result,
                elapsed,
            } => self.complete_fetch(epoch, &subject, result, elapsed),

            AuthorityMessage::RefreshProfile { respond_to } => {
                let result = self.refresh();
                let _ = respond_to.send(result);
            }

            AuthorityMessage::UpdateProfile { update, respond_to } => {
                self.start_update(update, respond_to);
            }

            AuthorityMessage::UpdateCompleted {
                subject,
                result,
                respond_to,
            } => {
                let reply = self.complete_update(&subject, result);
                let _ = respond_to.send(reply);
            }
        }
    }

    fn spawn_restore(&self) {
        let identity = Arc::clone(&self.identity);
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let result = identity.get_session().await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender.send(AuthorityMessage::Restored { result }).await;
            }
        });
    }

    fn complete_restore(&mut self, result: Result<Option<Session>, IdentityError>) {
        if self.current().is_ready() {
            debug!(target: "sa.authority", "Ignoring duplicate restoration result");
            return;
        }

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    target: "sa.authority",
                    error = %e,
                    "Session restoration failed, continuing signed out"
                );
                None
            }
        };

        info!(
            target: "sa.authority",
            authenticated = session.is_some(),
            subject = session.as_ref().map(|s| s.subject().as_str()),
            "Session restoration complete"
        );

        self.apply_session(session);
    }

    fn apply_change(&mut self, change: SessionChange) {
        let event = change.event.as_str();
        self.metrics.record_session_change();
        metrics::record_session_change(event);

        debug!(
            target: "sa.authority",
            event,
            subject = change.session.as_ref().map(|s| s.subject().as_str()),
            "Applying session change"
        );

        self.apply_session(change.session);
    }

    /// Replace the current session and decide what happens to the profile.
    fn apply_session(&mut self, session: Option<Session>) {
        let current = self.current();

        let Some(session) = session else {
            if current.is_authenticated() {
                // Outstanding fetches belong to a session that no longer exists.
                self.epoch += 1;
            }
            self.publish(AuthState::Unauthenticated);
            return;
        };

        let kept = match current {
            AuthState::Authenticated {
                session: previous,
                profile: profile @ (ProfileState::Loaded(_) | ProfileState::Loading),
            } if previous.same_subject(&session) => Some((previous, profile)),
            _ => None,
        };

        match kept {
            Some((previous, profile)) => {
                debug!(
                    target: "sa.authority",
                    subject = %session.subject(),
                    profile = profile.as_str(),
                    credentials_changed = !previous.same_credentials(&session),
                    "Same subject, keeping profile"
                );
                self.publish(AuthState::Authenticated { session, profile });
            }
            None => {
                self.publish(AuthState::Authenticated {
                    session: session.clone(),
                    profile: ProfileState::Loading,
                });
                self.start_fetch(session);
            }
        }
    }

    fn start_fetch(&mut self, session: Session) {
        self.epoch += 1;
        let epoch = self.epoch;
        let subject = session.subject().clone();
        self.metrics.record_fetch_started();

        debug!(
            target: "sa.authority",
            subject = %subject,
            epoch,
            "Starting profile fetch"
        );

        let store = Arc::clone(&self.store);
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = store.fetch_profile(&session).await;
            let elapsed = started.elapsed();

            if let Some(sender) = mailbox.upgrade() {
                let _ = sender
                    .send(AuthorityMessage::FetchCompleted {
                        epoch,
                        subject,
                        result,
                        elapsed,
                    })
                    .await;
            }
        });
    }

    fn complete_fetch(
        &mut self,
        epoch: u64,
        subject: &SubjectId,
        result: Result<Profile, ProfileStoreError>,
        elapsed: Duration,
    ) {
        let current = self.current();
        let is_current = epoch == self.epoch
            && current.subject() == Some(subject)
            && current.profile_state().is_loading();

        if !is_current {
            debug!(
                target: "sa.authority",
                subject = %subject,
                epoch,
                current_epoch = self.epoch,
                "Discarding stale profile fetch"
            );
            self.metrics.record_stale_discarded();
            metrics::record_stale_response("fetch");
            return;
        }

        let AuthState::Authenticated { session, .. } = current else {
            return;
        };

        let result = result.and_then(|profile| {
            if &profile.id == subject {
                Ok(profile)
            } else {
                Err(ProfileStoreError::InvalidResponse(format!(
                    "profile {} returned for subject {subject}",
                    profile.id
                )))
            }
        });

        metrics::record_profile_fetch(result.as_ref().err(), elapsed);

        let profile = match result {
            Ok(profile) => {
                info!(
                    target: "sa.authority",
                    subject = %subject,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Profile loaded"
                );
                self.metrics.record_fetch_committed();
                ProfileState::Loaded(profile)
            }
            Err(e) => {
                warn!(
                    target: "sa.authority",
                    subject = %subject,
                    error = %e,
                    "Profile fetch failed"
                );
                ProfileState::FetchFailed(e)
            }
        };

        self.publish(AuthState::Authenticated { session, profile });
    }

    fn refresh(&mut self) -> Result<(), AuthorityError> {
        let session = self.require_session()?;

        self.publish(AuthState::Authenticated {
            session: session.clone(),
            profile: ProfileState::Loading,
        });
        self.start_fetch(session);
        Ok(())
    }

    fn start_update(
        &mut self,
        update: ProfileUpdate,
        respond_to: oneshot::Sender<Result<Profile, AuthorityError>>,
    ) {
        let session = match self.require_session() {
            Ok(session) => session,
            Err(e) => {
                let _ = respond_to.send(Err(e));
                return;
            }
        };

        if update.is_empty() {
            let _ = respond_to.send(Err(ProfileStoreError::EmptyUpdate.into()));
            return;
        }

        debug!(
            target: "sa.authority",
            subject = %session.subject(),
            "Starting profile update"
        );

        let store = Arc::clone(&self.store);
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let result = store.update_profile(&session, &update).await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender
                    .send(AuthorityMessage::UpdateCompleted {
                        subject: session.subject().clone(),
                        result,
                        respond_to,
                    })
                    .await;
            }
        });
    }

    fn complete_update(
        &mut self,
        subject: &SubjectId,
        result: Result<Profile, ProfileStoreError>,
    ) -> Result<Profile, AuthorityError> {
        let profile = result.map_err(|e| {
            warn!(
                target: "sa.authority",
                subject = %subject,
                error = %e,
                "Profile update failed"
            );
            AuthorityError::Store(e)
        })?;

        if &profile.id != subject {
            return Err(ProfileStoreError::InvalidResponse(format!(
                "profile {} returned for subject {subject}",
                profile.id
            ))
            .into());
        }

        let session = match self.current() {
            AuthState::Authenticated { session, .. } if session.subject() == subject => session,
            _ => {
                debug!(
                    target: "sa.authority",
                    subject = %subject,
                    "Discarding profile update for a previous session"
                );
                self.metrics.record_stale_discarded();
                metrics::record_stale_response("update");
                return Err(AuthorityError::SessionChanged);
            }
        };

        // The written profile supersedes any fetch still in flight.
        self.epoch += 1;
        self.metrics.record_update_committed();

        info!(target: "sa.authority", subject = %subject, "Profile updated");

        self.publish(AuthState::Authenticated {
            session,
            profile: ProfileState::Loaded(profile.clone()),
        });
        Ok(profile)
    }

    fn require_session(&self) -> Result<Session, AuthorityError> {
        match self.current() {
            AuthState::Initializing => Err(AuthorityError::NotReady),
            AuthState::Unauthenticated => Err(AuthorityError::NotAuthenticated),
            AuthState::Authenticated { session, .. } => Ok(session),
        }
    }

    fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    fn publish(&self, next: AuthState) {
        let to = next.phase();
        let profile = next.profile_state().as_str();
        let previous = self.state.send_replace(next);

        debug!(
            target: "sa.authority",
            from = previous.phase(),
            to,
            profile,
            "Published state"
        );
    }
}

/// Next change from the subscription; pending forever once it is gone.
async fn next_change(changes: &mut Option<SessionChanges>) -> Option<SessionChange> {
    match changes {
        Some(changes) => changes.next().await,
        None => std::future::pending().await,
    }
}
