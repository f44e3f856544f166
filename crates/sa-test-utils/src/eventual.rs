//! Polling assertions and state recording.
//!
//! The authority publishes through a watch channel, which only keeps the
//! latest value. Tests wait for a condition with a deadline instead of
//! sleeping for a fixed time.

use session_authority::{AuthState, SessionAuthorityHandle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Deadline for every wait helper.
pub const EVENTUAL_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds. Panics after [`EVENTUAL_TIMEOUT`].
pub async fn assert_eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + EVENTUAL_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait for the first published state matching `predicate`.
pub async fn wait_for_state(
    handle: &SessionAuthorityHandle,
    what: &str,
    predicate: impl FnMut(&AuthState) -> bool,
) -> AuthState {
    tokio::time::timeout(EVENTUAL_TIMEOUT, handle.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("authority stopped while waiting")
}

/// Collects every snapshot a receiver observes.
///
/// A watch receiver can skip intermediate values, so the log holds what a
/// consumer could actually have seen, not every publish.
pub struct StateLog {
    states: Arc<Mutex<Vec<AuthState>>>,
    task: JoinHandle<()>,
}

impl StateLog {
    /// Start recording from `receiver`, including its current value.
    pub fn record(mut receiver: watch::Receiver<AuthState>) -> Self {
        let states = Arc::new(Mutex::new(vec![receiver.borrow_and_update().clone()]));
        let sink = Arc::clone(&states);

        let task = tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let state = receiver.borrow_and_update().clone();
                sink.lock().unwrap().push(state);
            }
        });

        Self { states, task }
    }

    pub fn states(&self) -> Vec<AuthState> {
        self.states.lock().unwrap().clone()
    }
}

impl Drop for StateLog {
    fn drop(&mut self) {
        self.task.abort();
    }
}
