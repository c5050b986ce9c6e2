//! One-shot lifecycle signals
//!
//! Every entity (module, suite, test) carries a "run started" and a
//! "run completed" signal. A signal resolves at most once: firing it again is
//! a no-op, and an observer that subscribes after it fired still sees it
//! resolved. Built on `tokio::sync::watch`, which keeps the last value around
//! for late receivers.

use std::sync::Arc;
use tokio::sync::watch;

/// Single-resolution latch, cheap to clone
#[derive(Clone, Debug)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve the signal. Returns `true` only for the call that resolved it.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal has fired; returns immediately if it already has
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// The start/complete signal pair of one run of an entity
#[derive(Clone, Debug, Default)]
pub struct Lifecycle {
    pub started: Signal,
    pub completed: Signal,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fire_is_idempotent() {
        let signal = Signal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_late_observer_sees_fired_state() {
        let signal = Signal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("late waiter should resolve immediately");
    }

    #[tokio::test]
    async fn test_waiter_resolves_when_fired() {
        let signal = Signal::new();
        let observer = signal.clone();
        let waiter = tokio::spawn(async move { observer.wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.fire();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[test]
    fn test_clones_share_state() {
        let lifecycle = Lifecycle::new();
        let observed = lifecycle.clone();
        lifecycle.started.fire();
        assert!(observed.started.is_fired());
        assert!(!observed.completed.is_fired());
    }
}
