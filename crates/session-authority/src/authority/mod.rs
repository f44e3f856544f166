//! Session authority actor.
//!
//! ```text
//! IdentityProvider ──SessionChange──▶ SessionAuthority ──watch<AuthState>──▶ handles
//!                                       │        ▲
//!                          fetch/update ▼        │ completions (same mailbox)
//!                                    ProfileStore
//! ```
//!
//! The actor is the only writer of session and profile state. Handles read
//! the latest [`AuthState`] snapshot without touching the actor, and send
//! requests through its mailbox.
//!
//! # State machine
//!
//! `Initializing` → `Unauthenticated` | `Authenticated { session, profile }`
//! where `profile` is `Loading`, `Loaded` or `FetchFailed`.
//!
//! - Restoration resolves once and leaves `Initializing`. Change
//!   notifications queue until then and are applied in order afterwards.
//! - A change to no session drops the profile immediately.
//! - A change to a new subject starts a fetch; a change for the current
//!   subject only replaces the session unless the last fetch failed.
//! - Every fetch captures an epoch. The epoch moves on every fetch start,
//!   sign-out and committed update, and a completion whose epoch or
//!   subject no longer matches is discarded.
//!
//! # Modules
//!
//! - [`actor`] - `SessionAuthority` and `SessionAuthorityHandle`
//! - [`state`] - `AuthState` and `ProfileState`
//! - `messages` - mailbox message types

pub mod actor;
mod messages;
pub mod state;

pub use actor::{SessionAuthority, SessionAuthorityHandle};
pub use state::{AuthState, ProfileState};
