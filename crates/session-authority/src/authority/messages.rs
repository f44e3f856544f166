//! Mailbox messages for the session authority actor.
//!
//! Requests from handles carry a `oneshot` reply channel. Completions of
//! work the actor spawned (restoration, fetches, updates) come back through
//! the same mailbox so every state write happens in one ordered loop.

use crate::errors::{AuthorityError, IdentityError, ProfileStoreError};
use common::profile::{Profile, ProfileUpdate};
use common::types::{Session, SubjectId};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug)]
pub(crate) enum AuthorityMessage {
    /// Re-fetch the current subject's profile.
    RefreshProfile {
        respond_to: oneshot::Sender<Result<(), AuthorityError>>,
    },

    /// Write a profile update through the store.
    UpdateProfile {
        update: ProfileUpdate,
        respond_to: oneshot::Sender<Result<Profile, AuthorityError>>,
    },

    /// Initial `get_session()` resolved.
    Restored {
        result: Result<Option<Session>, IdentityError>,
    },

    /// A profile fetch finished.
    FetchCompleted {
        epoch: u64,
        subject: SubjectId,
        result: Result<Profile, ProfileStoreError>,
        elapsed: Duration,
    },

    /// A profile update finished at the store.
    UpdateCompleted {
        subject: SubjectId,
        result: Result<Profile, ProfileStoreError>,
        respond_to: oneshot::Sender<Result<Profile, AuthorityError>>,
    },
}
