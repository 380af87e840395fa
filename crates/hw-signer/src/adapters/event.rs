//! One-shot broadcast event.
//!
//! Fires at most once. Every waiter, whether it started waiting before or
//! after the event fired, is released; firing again is a no-op.

use tokio::sync::watch;

#[derive(Debug)]
pub struct OneShotEvent {
    fired: watch::Sender<bool>,
}

impl Default for OneShotEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl OneShotEvent {
    pub fn new() -> Self {
        let (fired, _) = watch::channel(false);
        Self { fired }
    }

    /// Fire the event. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        !self.fired.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.fired.borrow()
    }

    /// Wait until the event has fired.
    pub async fn wait(&self) {
        let mut rx = self.fired.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
