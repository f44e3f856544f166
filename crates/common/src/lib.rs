//! Common types shared across the Moves session and profile crates.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for identity and session types
pub mod types;

/// Module for profile records and the photo gallery
pub mod profile;

/// Module for move posts, likes and match candidates
pub mod post;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
