//! Identity and session types shared by the authority and its adapters.

use crate::error::CommonError;
use crate::secret::{ExposeSecret, SecretString};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of the authenticated principal.
///
/// Opaque to this crate; the identity provider decides its format (the
/// hosted backend issues UUID strings). Construction rejects empty or
/// whitespace-only values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Create a subject id.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::InvalidSubject` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, CommonError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CommonError::InvalidSubject(value));
        }
        Ok(Self(value))
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

/// Credential bundle issued by the identity provider.
///
/// Tokens are held as `SecretString`, so the derived `Debug` is redacted.
#[derive(Debug, Clone)]
pub struct Session {
    subject: SubjectId,
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session for `subject` carrying `access_token`.
    #[must_use]
    pub fn new(subject: SubjectId, access_token: SecretString) -> Self {
        Self {
            subject,
            access_token,
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: SecretString) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Attach the expiry reported by the provider.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The authenticated principal.
    #[must_use]
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Bearer token for calls made on behalf of this session.
    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the provider-reported expiry has passed at `now`.
    ///
    /// Sessions without an expiry never expire locally.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Whether both sessions belong to the same principal.
    #[must_use]
    pub fn same_subject(&self, other: &Session) -> bool {
        self.subject == other.subject
    }

    /// Whether both sessions carry the same subject and tokens.
    #[must_use]
    pub fn same_credentials(&self, other: &Session) -> bool {
        let refresh_matches = match (&self.refresh_token, &other.refresh_token) {
            (Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
            (None, None) => true,
            _ => false,
        };
        self.same_subject(other)
            && self.access_token.expose_secret() == other.access_token.expose_secret()
            && refresh_matches
    }
}
