//! Profile store adapter contract.

use crate::errors::ProfileStoreError;
use common::profile::{Profile, ProfileUpdate};
use common::types::Session;

/// Contract the authority consumes from the profile store.
///
/// Both calls are keyed by `session.subject()`. The session is passed in
/// full so adapters can authorize the request with the caller's token
/// (row-level security on the hosted store).
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Point lookup of the profile for `session.subject()`.
    ///
    /// Returns `ProfileStoreError::NotFound` when no record exists.
    async fn fetch_profile(&self, session: &Session) -> Result<Profile, ProfileStoreError>;

    /// Apply `update` to the subject's profile and return the stored result.
    ///
    /// Returns `ProfileStoreError::EmptyUpdate` if `update` writes nothing.
    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProfileStoreError>;
}
