//! Session authority error types.
//!
//! Accessors on the authority handle never fail; these types surface from
//! request methods (`refresh_profile`, `update_profile`) and from the
//! collaborator adapters.

use thiserror::Error;

/// Errors returned by the identity provider adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Provider could not be reached or returned a server error.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials were rejected (bad password, revoked refresh token).
    #[error("Credentials rejected: {0}")]
    Rejected(String),

    /// Provider response could not be parsed.
    #[error("Invalid identity response: {0}")]
    InvalidResponse(String),

    /// Operation needs a session but none is held.
    #[error("No active session")]
    NoSession,

    /// Adapter misconfiguration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors returned by the profile store adapter.
///
/// `Clone` because a fetch failure is kept in the published state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// No profile record exists for the subject.
    #[error("Profile not found: {0}")]
    NotFound(String),

    /// Store refused the session's credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network failure or server-side error.
    #[error("Profile store unavailable: {0}")]
    Unavailable(String),

    /// Store response could not be parsed.
    #[error("Invalid profile response: {0}")]
    InvalidResponse(String),

    /// Update carried no fields.
    #[error("Profile update has no fields")]
    EmptyUpdate,

    /// Adapter misconfiguration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors returned by the post and like store adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostStoreError {
    /// Referenced post or like does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store refused the session's credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Write collided with an existing row (duplicate like).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network failure or server-side error.
    #[error("Post store unavailable: {0}")]
    Unavailable(String),

    /// Store response could not be parsed.
    #[error("Invalid post store response: {0}")]
    InvalidResponse(String),

    /// Adapter misconfiguration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors returned by `Feed` operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Initial session restoration has not completed.
    #[error("Session authority is not ready")]
    NotReady,

    /// Operation requires a signed-in user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// New post was rejected before reaching the store.
    #[error("Invalid post: {0}")]
    InvalidPost(String),

    /// Post or like store rejected the request.
    #[error("Post store error: {0}")]
    Store(#[from] PostStoreError),
}

/// Errors returned by `SessionAuthorityHandle` request methods.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// Initial session restoration has not completed.
    #[error("Session authority is not ready")]
    NotReady,

    /// Request requires a signed-in user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The signed-in subject changed while the request was in flight.
    #[error("Session changed before the request completed")]
    SessionChanged,

    /// Profile store rejected the request.
    #[error("Profile store error: {0}")]
    Store(#[from] ProfileStoreError),

    /// Actor mailbox closed or reply dropped.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors returned by the chat client adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Chat service refused or failed the connection.
    #[error("Chat connection failed: {0}")]
    ConnectionFailed(String),
}
