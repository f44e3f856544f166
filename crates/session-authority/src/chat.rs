//! Chat presence follower.
//!
//! Keeps a chat client connected as the user whose profile the authority
//! has loaded. The follower only reads published [`AuthState`] snapshots;
//! it never writes authority state.
//!
//! # Reconciliation
//!
//! - Loaded profile for a new subject: disconnect the previous user, then
//!   connect the new one
//! - Profile loading or failed for the connected subject: stay connected
//! - No session: disconnect
//! - Subject changed while a connect was in flight: tear the fresh
//!   connection down and reconcile again
//!
//! Connection failures are logged and reported through [`ChatStatus`];
//! they never stop the follower.

use crate::authority::{AuthState, ProfileState};
use crate::errors::ChatError;
use crate::http::public_object_url;
use common::profile::Profile;
use common::types::SubjectId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// User identity presented to the chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: SubjectId,
    pub name: String,
    /// Public avatar URL.
    pub image: Option<String>,
}

/// Contract the follower consumes from the chat service SDK.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    async fn connect_user(&self, user: &ChatUser) -> Result<(), ChatError>;

    /// Disconnect the current user. No-op when nobody is connected.
    async fn disconnect_user(&self);
}

/// Connection status published by the follower.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChatStatus {
    #[default]
    Disconnected,
    Connecting(SubjectId),
    Connected(SubjectId),
    /// Last connect attempt for this user failed.
    Failed(SubjectId),
}

/// Where avatar references resolve to public URLs.
#[derive(Debug, Clone)]
pub struct AvatarSource {
    base_url: String,
    bucket: String,
}

impl AvatarSource {
    #[must_use]
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bucket: bucket.into(),
        }
    }

    /// Public URL for an avatar reference.
    #[must_use]
    pub fn url(&self, reference: &str) -> String {
        public_object_url(&self.base_url, &self.bucket, reference)
    }

    /// Chat identity for `profile`.
    #[must_use]
    pub fn chat_user(&self, profile: &Profile) -> ChatUser {
        ChatUser {
            id: profile.id.clone(),
            name: profile.display_name().to_string(),
            image: profile
                .avatar_url
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .map(|r| self.url(r)),
        }
    }
}

/// What the follower should do for a snapshot.
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Disconnect,
    Keep,
    Connect(ChatUser),
}

fn target_for(state: &AuthState, connected: Option<&SubjectId>, avatars: &AvatarSource) -> Target {
    let Some(subject) = state.subject() else {
        return Target::Disconnect;
    };

    match state.profile_state() {
        ProfileState::Loaded(profile) if connected == Some(&profile.id) => Target::Keep,
        ProfileState::Loaded(profile) => Target::Connect(avatars.chat_user(profile)),
        _ if connected == Some(subject) => Target::Keep,
        // Profile for a different subject is not known yet.
        _ => Target::Disconnect,
    }
}

/// Handle to a running `ChatPresence` follower.
#[derive(Clone, Debug)]
pub struct ChatPresenceHandle {
    status: watch::Receiver<ChatStatus>,
    cancel_token: CancellationToken,
}

impl ChatPresenceHandle {
    #[must_use]
    pub fn status(&self) -> ChatStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatStatus> {
        self.status.clone()
    }

    /// Wait for the first status matching `predicate`.
    ///
    /// Returns `None` if the follower stopped first.
    pub async fn wait_for(&self, predicate: impl FnMut(&ChatStatus) -> bool) -> Option<ChatStatus> {
        let mut status = self.status.clone();
        let matched = status.wait_for(predicate).await.ok()?.clone();
        Some(matched)
    }

    /// Stop the follower. A connected user is disconnected on the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// Follows authority snapshots and drives a [`ChatClient`].
pub struct ChatPresence {
    state: watch::Receiver<AuthState>,
    client: Arc<dyn ChatClient>,
    avatars: AvatarSource,
    status: watch::Sender<ChatStatus>,
    connected: Option<SubjectId>,
    cancel_token: CancellationToken,
}

impl ChatPresence {
    /// Spawn the follower.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        state: watch::Receiver<AuthState>,
        client: Arc<dyn ChatClient>,
        avatars: AvatarSource,
        cancel_token: CancellationToken,
    ) -> (ChatPresenceHandle, JoinHandle<()>) {
        let (status_tx, status_rx) = watch::channel(ChatStatus::Disconnected);

        let follower = Self {
            state,
            client,
            avatars,
            status: status_tx,
            connected: None,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(follower.run());

        let handle = ChatPresenceHandle {
            status: status_rx,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "sa.chat")]
    async fn run(mut self) {
        debug!(target: "sa.chat", "ChatPresence started");

        loop {
            let target = {
                let state = self.state.borrow_and_update();
                target_for(&state, self.connected.as_ref(), &self.avatars)
            };
            self.reconcile(target).await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "sa.chat", "ChatPresence received cancellation signal");
                    break;
                }

                changed = self.state.changed() => {
                    if changed.is_err() {
                        debug!(target: "sa.chat", "Authority stopped, stopping ChatPresence");
                        break;
                    }
                }
            }
        }

        if self.connected.is_some() {
            self.disconnect().await;
        }
    }

    async fn reconcile(&mut self, target: Target) {
        match target {
            Target::Keep => {}
            Target::Disconnect => {
                if self.connected.is_some() {
                    self.disconnect().await;
                } else if *self.status.borrow() != ChatStatus::Disconnected {
                    self.status.send_replace(ChatStatus::Disconnected);
                }
            }
            Target::Connect(user) => {
                if self.connected.is_some() {
                    self.disconnect().await;
                }
                self.connect(user).await;
            }
        }
    }

    async fn connect(&mut self, user: ChatUser) {
        self.status.send_replace(ChatStatus::Connecting(user.id.clone()));
        debug!(target: "sa.chat", user_id = %user.id, "Connecting chat user");

        let result = tokio::select! {
            () = self.cancel_token.cancelled() => {
                debug!(
                    target: "sa.chat",
                    user_id = %user.id,
                    "Cancelled during connect, tearing down"
                );
                self.client.disconnect_user().await;
                self.status.send_replace(ChatStatus::Disconnected);
                return;
            }
            result = self.client.connect_user(&user) => result,
        };
        let still_wanted = self.state.borrow().subject() == Some(&user.id);

        match result {
            Ok(()) if still_wanted => {
                info!(target: "sa.chat", user_id = %user.id, "Chat user connected");
                self.connected = Some(user.id.clone());
                self.status.send_replace(ChatStatus::Connected(user.id));
            }
            Ok(()) => {
                debug!(
                    target: "sa.chat",
                    user_id = %user.id,
                    "Subject changed during connect, tearing down"
                );
                self.client.disconnect_user().await;
                self.status.send_replace(ChatStatus::Disconnected);
            }
            Err(e) => {
                warn!(
                    target: "sa.chat",
                    user_id = %user.id,
                    error = %e,
                    "Chat connection failed"
                );
                self.status.send_replace(ChatStatus::Failed(user.id));
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(previous) = self.connected.take() {
            debug!(target: "sa.chat", user_id = %previous, "Disconnecting chat user");
        }
        self.client.disconnect_user().await;
        self.status.send_replace(ChatStatus::Disconnected);
    }
}
