//! Common error types for Moves domain values.

use thiserror::Error;

/// Errors raised when constructing validated domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Subject identifiers must be non-empty.
    #[error("Invalid subject id: {0}")]
    InvalidSubject(String),

    /// Gallery slots are numbered `0..PHOTO_SLOTS`.
    #[error("Invalid photo slot: {0}")]
    InvalidPhotoSlot(usize),

    /// New post failed validation.
    #[error("Invalid post: {0}")]
    InvalidPost(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
