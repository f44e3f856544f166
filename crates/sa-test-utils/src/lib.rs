//! # Session Authority Test Utilities
//!
//! Mocks and fixtures for driving the session authority without a backend.
//!
//! ## Modules
//!
//! - `mock_identity` - Scripted identity provider with manual change emission
//! - `mock_store` - In-memory profile store with failures and held fetches
//! - `mock_posts` - In-memory post and like store with write counts
//! - `mock_chat` - Recording chat client
//! - `gate` - One-shot release used to hold a mock call in flight
//! - `fixtures` - Subjects, sessions and profiles
//! - `eventual` - Polling assertions and state recording
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sa_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let identity = MockIdentityProvider::with_session(session("u1"));
//!     let store = MockProfileStore::new().with_profile(profile("u1"));
//!     let gate = store.hold_next_fetch(&subject("u1"));
//!
//!     // Spawn the authority, observe `Loading`, then:
//!     gate.release();
//! }
//! ```

pub mod eventual;
pub mod fixtures;
pub mod gate;
pub mod mock_chat;
pub mod mock_identity;
pub mod mock_posts;
pub mod mock_store;

// Re-export commonly used items
pub use eventual::*;
pub use fixtures::*;
pub use gate::*;
pub use mock_chat::*;
pub use mock_identity::*;
pub use mock_posts::*;
pub use mock_store::*;
