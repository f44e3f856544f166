//! In-memory profile store.
//!
//! Results are computed when a call completes, not when it starts, so a
//! test can hold a fetch, change the stored data, and release it.
//!
//! # Example
//!
//! ```rust,ignore
//! use sa_test_utils::{profile, subject, MockProfileStore};
//!
//! let store = MockProfileStore::new().with_profile(profile("u1"));
//! let gate = store.hold_next_fetch(&subject("u1"));
//! // ... fetch is now in flight until:
//! gate.release();
//! ```

use crate::gate::{Gate, GateWaiter};
use common::profile::{Profile, ProfileUpdate};
use common::types::{Session, SubjectId};
use session_authority::errors::ProfileStoreError;
use session_authority::store::ProfileStore;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    profiles: HashMap<SubjectId, Profile>,
    fetch_failures: HashMap<SubjectId, ProfileStoreError>,
    update_failure: Option<ProfileStoreError>,
    fetch_gates: HashMap<SubjectId, VecDeque<GateWaiter>>,
    update_gates: VecDeque<GateWaiter>,
    fetch_calls: Vec<SubjectId>,
    update_calls: Vec<(SubjectId, ProfileUpdate)>,
}

/// Mock profile store for authority tests.
#[derive(Clone, Default)]
pub struct MockProfileStore {
    inner: Arc<Mutex<Inner>>,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::insert_profile`].
    #[must_use]
    pub fn with_profile(self, profile: Profile) -> Self {
        self.insert_profile(profile);
        self
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.inner
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id.clone(), profile);
    }

    /// Every fetch for `subject` fails with `error` until cleared.
    pub fn fail_fetch(&self, subject: &SubjectId, error: ProfileStoreError) {
        self.inner
            .lock()
            .unwrap()
            .fetch_failures
            .insert(subject.clone(), error);
    }

    pub fn clear_fetch_failure(&self, subject: &SubjectId) {
        self.inner.lock().unwrap().fetch_failures.remove(subject);
    }

    /// Every update fails with `error` until cleared.
    pub fn fail_update(&self, error: ProfileStoreError) {
        self.inner.lock().unwrap().update_failure = Some(error);
    }

    pub fn clear_update_failure(&self) {
        self.inner.lock().unwrap().update_failure = None;
    }

    /// Hold the next fetch for `subject` until the gate is released.
    pub fn hold_next_fetch(&self, subject: &SubjectId) -> Gate {
        let (gate, waiter) = Gate::new();
        self.inner
            .lock()
            .unwrap()
            .fetch_gates
            .entry(subject.clone())
            .or_default()
            .push_back(waiter);
        gate
    }

    /// Hold the next update until the gate is released.
    pub fn hold_next_update(&self) -> Gate {
        let (gate, waiter) = Gate::new();
        self.inner.lock().unwrap().update_gates.push_back(waiter);
        gate
    }

    /// Subjects of all fetches started so far, in order.
    pub fn fetch_calls(&self) -> Vec<SubjectId> {
        self.inner.lock().unwrap().fetch_calls.clone()
    }

    pub fn fetch_count(&self, subject: &SubjectId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .fetch_calls
            .iter()
            .filter(|s| *s == subject)
            .count()
    }

    pub fn update_calls(&self) -> Vec<(SubjectId, ProfileUpdate)> {
        self.inner.lock().unwrap().update_calls.clone()
    }

    pub fn stored_profile(&self, subject: &SubjectId) -> Option<Profile> {
        self.inner.lock().unwrap().profiles.get(subject).cloned()
    }
}

#[async_trait::async_trait]
impl ProfileStore for MockProfileStore {
    async fn fetch_profile(&self, session: &Session) -> Result<Profile, ProfileStoreError> {
        let subject = session.subject().clone();
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.fetch_calls.push(subject.clone());
            inner
                .fetch_gates
                .get_mut(&subject)
                .and_then(VecDeque::pop_front)
        };

        if let Some(gate) = gate {
            gate.wait().await;
        }

        let inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fetch_failures.get(&subject) {
            return Err(error.clone());
        }
        inner
            .profiles
            .get(&subject)
            .cloned()
            .ok_or_else(|| ProfileStoreError::NotFound(subject.to_string()))
    }

    async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProfileStoreError> {
        let subject = session.subject().clone();
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.update_calls.push((subject.clone(), update.clone()));
            inner.update_gates.pop_front()
        };

        if let Some(gate) = gate {
            gate.wait().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = &inner.update_failure {
            return Err(error.clone());
        }
        if update.is_empty() {
            return Err(ProfileStoreError::EmptyUpdate);
        }

        let current = inner
            .profiles
            .get(&subject)
            .cloned()
            .ok_or_else(|| ProfileStoreError::NotFound(subject.to_string()))?;
        let updated = update.apply_to(&current);
        inner.profiles.insert(subject, updated.clone());
        Ok(updated)
    }
}
