//! Moves Session Authority Library
//!
//! Single source of truth for "who is signed in" and "what is their
//! profile". Consumers read one consistent snapshot instead of tracking
//! identity-provider events and profile fetches themselves:
//!
//! - Restores the persisted session once at startup and reports readiness
//! - Follows sign-in, sign-out and token refresh notifications in order
//! - Loads the profile for each new subject and never publishes a profile
//!   that belongs to a previous session
//! - Writes profile updates through the store
//! - Runs feed, like and match queries as the signed-in user
//!
//! # Architecture
//!
//! ```text
//! IdentityProvider ─┐
//!                   ├─▶ SessionAuthority (actor) ──watch<AuthState>──┬─▶ handles
//! ProfileStore ─────┘                                                └─▶ ChatPresence
//! ```
//!
//! # Modules
//!
//! - [`authority`] - Session authority actor, handle and published state
//! - [`identity`] - Identity provider contract and change fan-out
//! - [`store`] - Profile store contract
//! - [`posts`] - Post and like store contracts
//! - [`feed`] - Feed, likes and matches for the signed-in user
//! - [`http`] - Adapters for the hosted auth and row APIs
//! - [`chat`] - Chat presence follower
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Metrics

#![warn(clippy::pedantic)]

pub mod authority;
pub mod chat;
pub mod config;
pub mod errors;
pub mod feed;
pub mod http;
pub mod identity;
pub mod observability;
pub mod posts;
pub mod store;

pub use authority::{AuthState, ProfileState, SessionAuthority, SessionAuthorityHandle};
pub use errors::{
    AuthorityError, ChatError, FeedError, IdentityError, PostStoreError, ProfileStoreError,
};
pub use feed::Feed;
