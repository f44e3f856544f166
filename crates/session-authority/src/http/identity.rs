//! Identity provider backed by the hosted auth REST API.
//!
//! The adapter holds the local session (what a mobile SDK would keep in
//! secure storage) and broadcasts a [`SessionChange`] whenever it changes
//! through [`HttpIdentityProvider::sign_in_with_password`],
//! [`HttpIdentityProvider::refresh_session`] or
//! [`HttpIdentityProvider::sign_out`].
//!
//! # Security
//!
//! - Tokens and passwords never appear in logs
//! - The local session is cleared on sign-out even if the backend call fails
//!
//! # Ordering
//!
//! The held session is swapped and the change broadcast under one lock,
//! so subscribers see changes in the order the held session took them.
//!
//! # Restoration
//!
//! Persisted tokens are checked against `/auth/v1/user`. A rejected access
//! token is renewed with the refresh grant when a refresh token is held.
//! The tokens are only dropped once the backend has answered for them; a
//! transport failure or 5xx keeps them for the next attempt.

use super::{build_client, normalize_base_url, API_KEY_HEADER};
use crate::errors::IdentityError;
use crate::identity::{IdentityProvider, SessionBroadcaster, SessionChange, SessionChanges};
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{Session, SubjectId};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// User object returned by the auth API.
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
}

/// Token grant response from the auth API.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    /// Unix timestamp; preferred over `expires_in` when present.
    expires_at: Option<i64>,
    user: UserResponse,
}

/// Error body returned by the auth API.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

impl AuthErrorBody {
    fn message(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.error)
            .unwrap_or_else(|| "request rejected".to_string())
    }
}

/// Tokens persisted from an earlier run, consumed by `get_session`.
#[derive(Clone)]
struct PersistedTokens {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
}

/// HTTP client for the hosted auth API.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    anon_key: SecretString,
    persisted: Mutex<Option<PersistedTokens>>,
    current: Mutex<Option<Session>>,
    broadcaster: SessionBroadcaster,
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field("subscribers", &self.broadcaster.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl HttpIdentityProvider {
    /// Create a new provider.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        anon_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let client = build_client(timeout).map_err(|e| {
            warn!(target: "sa.identity.http", error = %e, "Failed to build HTTP client");
            IdentityError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            anon_key,
            persisted: Mutex::new(None),
            current: Mutex::new(None),
            broadcaster: SessionBroadcaster::new(),
        })
    }

    /// Seed the tokens that `get_session` will try to restore.
    #[must_use]
    pub fn with_persisted_tokens(
        self,
        access_token: SecretString,
        refresh_token: Option<SecretString>,
    ) -> Self {
        *self
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(PersistedTokens {
            access_token,
            refresh_token,
        });
        self
    }

    /// Session currently held by the adapter.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sign in with email and password and broadcast `SignedIn`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::Rejected` for bad credentials
    /// - `IdentityError::Unavailable` if the backend is unreachable or returns 5xx
    /// - `IdentityError::InvalidResponse` if the token response cannot be parsed
    #[instrument(skip_all)]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
        });

        let session = self.request_token("password", &body).await?;
        info!(
            target: "sa.identity.http",
            subject = %session.subject(),
            "Signed in with password"
        );

        self.commit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    /// Exchange the held refresh token for a new session and broadcast
    /// `TokenRefreshed`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::NoSession` if no refresh token is held, or the
    ///   session was replaced while the refresh was in flight
    /// - `IdentityError::Rejected` if the refresh token was revoked
    /// - `IdentityError::Unavailable` if the backend is unreachable or returns 5xx
    #[instrument(skip_all)]
    pub async fn refresh_session(&self) -> Result<Session, IdentityError> {
        let held = self.current_session().ok_or(IdentityError::NoSession)?;
        let refresh_token = held
            .refresh_token()
            .cloned()
            .ok_or(IdentityError::NoSession)?;

        let session = self.exchange_refresh_token(&refresh_token).await?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if !current
            .as_ref()
            .is_some_and(|now| now.same_credentials(&held))
        {
            debug!(
                target: "sa.identity.http",
                "Session changed during refresh, discarding refreshed tokens"
            );
            return Err(IdentityError::NoSession);
        }
        debug!(
            target: "sa.identity.http",
            subject = %session.subject(),
            "Session refreshed"
        );
        *current = Some(session.clone());
        self.broadcaster
            .broadcast(&SessionChange::token_refreshed(session.clone()));
        Ok(session)
    }

    /// Sign out and broadcast `SignedOut`.
    ///
    /// The local session is cleared and `SignedOut` is broadcast before the
    /// backend logout runs, so a failed logout still signs the user out
    /// locally; the failure is still returned.
    ///
    /// # Errors
    ///
    /// - `IdentityError::Unavailable` if the backend is unreachable or returns 5xx
    /// - `IdentityError::Rejected` if the backend refused the logout
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        self.persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let previous = self.commit(SessionChange::signed_out());

        let remote = match &previous {
            Some(session) => self.logout(session).await,
            None => Ok(()),
        };

        if let Err(e) = &remote {
            warn!(
                target: "sa.identity.http",
                error = %e,
                "Remote sign-out failed, local session cleared"
            );
        } else {
            info!(target: "sa.identity.http", "Signed out");
        }
        remote
    }

    async fn request_token(
        &self,
        grant_type: &str,
        body: &serde_json::Value,
    ) -> Result<Session, IdentityError> {
        let url = format!("{}/auth/v1/token", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("grant_type", grant_type)])
            .header(API_KEY_HEADER, self.anon_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        Self::parse_token_response(response).await
    }

    async fn exchange_refresh_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<Session, IdentityError> {
        let body = serde_json::json!({ "refresh_token": refresh_token.expose_secret() });
        self.request_token("refresh_token", &body).await
    }

    /// Renew persisted tokens whose access token was rejected.
    ///
    /// `Ok(None)` when no refresh token is held or the backend rejects it.
    async fn renew_persisted(
        &self,
        tokens: &PersistedTokens,
    ) -> Result<Option<Session>, IdentityError> {
        let Some(refresh_token) = &tokens.refresh_token else {
            debug!(
                target: "sa.identity.http",
                "Persisted access token rejected and no refresh token held"
            );
            return Ok(None);
        };

        match self.exchange_refresh_token(refresh_token).await {
            Ok(session) => {
                debug!(
                    target: "sa.identity.http",
                    subject = %session.subject(),
                    "Persisted session renewed with refresh token"
                );
                Ok(Some(session))
            }
            Err(IdentityError::Rejected(message)) => {
                debug!(
                    target: "sa.identity.http",
                    message = %message,
                    "Persisted refresh token rejected, treating as signed out"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn logout(&self, session: &Session) -> Result<(), IdentityError> {
        let url = format!("{}/auth/v1/logout", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.anon_key.expose_secret())
            .bearer_auth(session.access_token().expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn fetch_user(&self, tokens: &PersistedTokens) -> Result<Option<Session>, IdentityError> {
        let url = format!("{}/auth/v1/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.anon_key.expose_secret())
            .bearer_auth(tokens.access_token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(
                target: "sa.identity.http",
                status = %status,
                "Persisted access token rejected"
            );
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let user: UserResponse = response.json().await.map_err(|e| {
            warn!(target: "sa.identity.http", error = %e, "Failed to parse user response");
            IdentityError::InvalidResponse(format!("user response: {e}"))
        })?;

        let mut session = Session::new(subject_from(user.id)?, tokens.access_token.clone());
        if let Some(refresh_token) = &tokens.refresh_token {
            session = session.with_refresh_token(refresh_token.clone());
        }
        Ok(Some(session))
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<Session, IdentityError> {
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            warn!(target: "sa.identity.http", error = %e, "Failed to parse token response");
            IdentityError::InvalidResponse(format!("token response: {e}"))
        })?;

        let mut session = Session::new(
            subject_from(token.user.id)?,
            SecretString::from(token.access_token),
        );
        if let Some(refresh_token) = token.refresh_token {
            session = session.with_refresh_token(SecretString::from(refresh_token));
        }
        if let Some(expires_at) = expiry(token.expires_at, token.expires_in) {
            session = session.with_expires_at(expires_at);
        }
        Ok(session)
    }

    /// Hold `change.session` and broadcast `change`. Returns the session
    /// held before.
    fn commit(&self, change: SessionChange) -> Option<Session> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *current, change.session.clone());
        self.broadcaster.broadcast(&change);
        previous
    }
}

#[async_trait::async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip_all)]
    async fn get_session(&self) -> Result<Option<Session>, IdentityError> {
        if let Some(session) = self.current_session() {
            return Ok(Some(session));
        }

        let tokens = self
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(tokens) = tokens else {
            debug!(target: "sa.identity.http", "No persisted session");
            return Ok(None);
        };

        // Errors return early and keep the tokens for the next attempt.
        let restored = match self.fetch_user(&tokens).await? {
            Some(session) => Some(session),
            None => self.renew_persisted(&tokens).await?,
        };
        self.persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(restored) = restored else {
            debug!(target: "sa.identity.http", "Persisted session no longer valid");
            return Ok(None);
        };

        // A sign-in that finished while restoring wins.
        let session = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(restored)
            .clone();
        info!(
            target: "sa.identity.http",
            subject = %session.subject(),
            "Restored persisted session"
        );
        Ok(Some(session))
    }

    fn subscribe(&self) -> SessionChanges {
        self.broadcaster.subscribe()
    }
}

fn subject_from(id: String) -> Result<SubjectId, IdentityError> {
    SubjectId::new(id).map_err(|e| IdentityError::InvalidResponse(e.to_string()))
}

fn expiry(expires_at: Option<i64>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    match (expires_at, expires_in) {
        (Some(at), _) => DateTime::from_timestamp(at, 0),
        (None, Some(secs)) => {
            chrono::Duration::try_seconds(secs).and_then(|ttl| Utc::now().checked_add_signed(ttl))
        }
        (None, None) => None,
    }
}

fn transport_error(e: reqwest::Error) -> IdentityError {
    warn!(target: "sa.identity.http", error = %e, "Auth request failed");
    IdentityError::Unavailable(format!("auth request failed: {e}"))
}

/// Map a non-success auth response to an error.
async fn status_error(response: reqwest::Response) -> IdentityError {
    let status = response.status();

    if status.is_server_error() {
        warn!(target: "sa.identity.http", status = %status, "Auth API returned server error");
        return IdentityError::Unavailable(format!("auth API returned {status}"));
    }

    let body: AuthErrorBody = response.json().await.unwrap_or_default();
    let message = body.message();
    debug!(
        target: "sa.identity.http",
        status = %status,
        message = %message,
        "Auth API rejected request"
    );
    IdentityError::Rejected(message)
}
