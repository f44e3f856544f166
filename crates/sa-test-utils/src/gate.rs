//! Hold a mock call in flight until the test releases it.

use tokio::sync::oneshot;

/// Release side of a held mock call.
///
/// Dropping the gate without calling [`Gate::release`] also lets the call
/// proceed.
#[derive(Debug)]
pub struct Gate {
    tx: oneshot::Sender<()>,
}

/// Wait side, owned by the mock.
#[derive(Debug)]
pub struct GateWaiter {
    rx: oneshot::Receiver<()>,
}

impl Gate {
    /// Create a linked gate and waiter.
    pub fn new() -> (Self, GateWaiter) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, GateWaiter { rx })
    }

    /// Let the held call continue.
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

impl GateWaiter {
    /// Wait until the gate is released or dropped.
    pub async fn wait(self) {
        let _ = self.rx.await;
    }
}
