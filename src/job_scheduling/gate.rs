//! Open/closed gate the dispatcher waits on

use tokio::sync::watch;

/// Binary signal, initially open
///
/// `wait` returns as soon as the gate is observed open. The state lives in
/// a `watch` channel, so a waiter that subscribes after a `close` still
/// sees the next `open` and can never miss it.
#[derive(Debug)]
pub struct Gate {
    state: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(true);
        Self { state }
    }

    /// Release all current and future waiters until the next `close`
    pub fn open(&self) {
        self.state.send_if_modified(|open| !std::mem::replace(open, true));
    }

    /// Make subsequent waiters block until the next `open`
    pub fn close(&self) {
        self.state.send_if_modified(|open| std::mem::replace(open, false));
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the gate is open
    pub async fn wait(&self) {
        let mut receiver = self.state.subscribe();
        // The sender is owned by `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
