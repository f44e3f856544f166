//! Metrics definitions for the session authority.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sa_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `event`: 4 values (`AuthEvent::as_str`)
//! - `outcome`: 3 values (success, not_found, error)
//! - `kind`: 2 values (fetch, update)
//! - `action`: 2 values (liked, unliked)
//!
//! No recorder is installed here; the embedding application decides
//! whether to export. Without one the facade calls are no-ops.
//!
//! `AuthorityMetrics` keeps the same counts in process so callers and
//! tests can read them without a recorder.

use crate::errors::ProfileStoreError;
use metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Record a session-change notification applied by the authority.
///
/// Metric: `sa_session_changes_total`
/// Labels: `event`
pub fn record_session_change(event: &'static str) {
    counter!("sa_session_changes_total", "event" => event).increment(1);
}

/// Record a committed profile fetch and its duration.
///
/// `error` is `None` for a successful fetch.
///
/// Metric: `sa_profile_fetch_total`, `sa_profile_fetch_duration_seconds`
/// Labels: `outcome`
pub fn record_profile_fetch(error: Option<&ProfileStoreError>, duration: Duration) {
    let outcome = match error {
        None => "success",
        Some(ProfileStoreError::NotFound(_)) => "not_found",
        Some(_) => "error",
    };

    histogram!("sa_profile_fetch_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
    counter!("sa_profile_fetch_total", "outcome" => outcome).increment(1);
}

/// Record a completion discarded by the stale-response guard.
///
/// Metric: `sa_stale_responses_total`
/// Labels: `kind`
pub fn record_stale_response(kind: &'static str) {
    counter!("sa_stale_responses_total", "kind" => kind).increment(1);
}

/// Record a like written or removed through the feed.
///
/// Metric: `sa_like_changes_total`
/// Labels: `action`
pub fn record_like_change(action: &'static str) {
    counter!("sa_like_changes_total", "action" => action).increment(1);
}

/// Record a post created through the feed.
///
/// Metric: `sa_posts_created_total`
pub fn record_post_created() {
    counter!("sa_posts_created_total").increment(1);
}

/// In-process authority counters.
#[derive(Debug, Default)]
pub struct AuthorityMetrics {
    session_changes: AtomicU64,
    fetches_started: AtomicU64,
    fetches_committed: AtomicU64,
    stale_discarded: AtomicU64,
    updates_committed: AtomicU64,
}

impl AuthorityMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_session_change(&self) {
        self.session_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_committed(&self) {
        self.fetches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_committed(&self) {
        self.updates_committed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn fetches_started(&self) -> u64 {
        self.fetches_started.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> AuthorityMetricsSnapshot {
        AuthorityMetricsSnapshot {
            session_changes: self.session_changes.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_committed: self.fetches_committed.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            updates_committed: self.updates_committed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of `AuthorityMetrics` at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityMetricsSnapshot {
    pub session_changes: u64,
    pub fetches_started: u64,
    pub fetches_committed: u64,
    pub stale_discarded: u64,
    pub updates_committed: u64,
}
