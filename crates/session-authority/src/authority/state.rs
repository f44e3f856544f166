//! Published authority state.
//!
//! The profile lives inside the `Authenticated` variant, so a snapshot can
//! only hold a profile while it also holds the session the profile belongs
//! to. Dropping to `Unauthenticated` drops the profile with it.

use crate::errors::ProfileStoreError;
use common::profile::Profile;
use common::types::{Session, SubjectId};

/// Profile sub-state of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    /// No session, so no profile.
    Absent,
    /// Fetch in flight for the current subject.
    Loading,
    Loaded(Profile),
    /// Last fetch for the current subject failed. Recoverable.
    FetchFailed(ProfileStoreError),
}

impl ProfileState {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, ProfileState::Loading)
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            ProfileState::Loaded(profile) => Some(profile),
            _ => None,
        }
    }

    /// Returns the state as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProfileState::Absent => "absent",
            ProfileState::Loading => "loading",
            ProfileState::Loaded(_) => "loaded",
            ProfileState::FetchFailed(_) => "fetch_failed",
        }
    }
}

/// Snapshot of who is signed in and what their profile is.
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    /// Initial session restoration has not resolved.
    #[default]
    Initializing,
    /// Restoration resolved (or a later change arrived) with no session.
    Unauthenticated,
    Authenticated {
        session: Session,
        profile: ProfileState,
    },
}

impl AuthState {
    /// Whether initial restoration has completed, whatever its outcome.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !matches!(self, AuthState::Initializing)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn subject(&self) -> Option<&SubjectId> {
        self.session().map(Session::subject)
    }

    /// Profile sub-state; `Absent` whenever there is no session.
    #[must_use]
    pub fn profile_state(&self) -> &ProfileState {
        match self {
            AuthState::Authenticated { profile, .. } => profile,
            _ => &ProfileState::Absent,
        }
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile_state().profile()
    }

    /// Ready and not waiting on a profile fetch.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_ready() && !self.profile_state().is_loading()
    }

    /// Returns the phase as a string for logs.
    #[must_use]
    pub const fn phase(&self) -> &'static str {
        match self {
            AuthState::Initializing => "initializing",
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated { .. } => "authenticated",
        }
    }
}
