//! Recording chat client.

use crate::gate::{Gate, GateWaiter};
use common::types::SubjectId;
use session_authority::chat::{ChatClient, ChatUser};
use session_authority::errors::ChatError;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// One call made against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    Connect(ChatUser),
    Disconnect,
}

#[derive(Default)]
struct Inner {
    calls: Vec<ChatCall>,
    failing: HashSet<SubjectId>,
    connect_gates: VecDeque<GateWaiter>,
    connected: Option<SubjectId>,
}

/// Mock chat client for presence tests.
#[derive(Clone, Default)]
pub struct MockChatClient {
    inner: Arc<Mutex<Inner>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects for `subject` fail until cleared.
    pub fn fail_for(&self, subject: &SubjectId) {
        self.inner.lock().unwrap().failing.insert(subject.clone());
    }

    pub fn clear_failure(&self, subject: &SubjectId) {
        self.inner.lock().unwrap().failing.remove(subject);
    }

    /// Hold the next connect until the gate is released.
    pub fn hold_next_connect(&self) -> Gate {
        let (gate, waiter) = Gate::new();
        self.inner.lock().unwrap().connect_gates.push_back(waiter);
        gate
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// User the mock currently considers connected.
    pub fn connected(&self) -> Option<SubjectId> {
        self.inner.lock().unwrap().connected.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| matches!(c, ChatCall::Connect(_)))
            .count()
    }
}

#[async_trait::async_trait]
impl ChatClient for MockChatClient {
    async fn connect_user(&self, user: &ChatUser) -> Result<(), ChatError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(ChatCall::Connect(user.clone()));
            inner.connect_gates.pop_front()
        };

        if let Some(gate) = gate {
            gate.wait().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(&user.id) {
            return Err(ChatError::ConnectionFailed(format!(
                "mock refused {}",
                user.id
            )));
        }
        inner.connected = Some(user.id.clone());
        Ok(())
    }

    async fn disconnect_user(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ChatCall::Disconnect);
        inner.connected = None;
    }
}
