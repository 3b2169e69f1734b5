//! Operator-controlled switch that holds back new generation

use tokio::sync::watch;

/// Shared latch: while paused, [`wait`](PauseGate::wait) blocks until
/// [`unpause`](PauseGate::unpause). There is no timeout.
pub struct PauseGate {
    paused: watch::Sender<bool>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    /// Install the latch. Returns `false` if it was already installed.
    pub fn pause(&self) -> bool {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    /// Release the latch. Returns `false` if it was not installed.
    pub fn unpause(&self) -> bool {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Resolve once the gate is open
    pub async fn wait(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_pause_is_idempotent() {
        let gate = PauseGate::new();
        assert!(!gate.is_paused());
        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(gate.is_paused());
        assert!(gate.unpause());
        assert!(!gate.unpause());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_unpaused() {
        let gate = Arc::new(PauseGate::new());
        gate.wait().await;

        gate.pause();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        gate.unpause();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
