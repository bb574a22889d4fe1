//! Cooperative shutdown signal shared by the control loop and the timed
//! holds inside it.
//!
//! Operator interrupt flips the flag; every cancellable wait in the loop
//! observes it, so a signal arriving mid-water still reaches the hydraulic
//! release path promptly instead of after the full dose.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Create a connected trigger/observer pair.
pub fn channel() -> (Trigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (Trigger { tx: Arc::new(tx) }, Shutdown { rx })
}

/// Sending half. Cloneable so the signal task and any fatal-error path can
/// each hold one; triggering twice is harmless.
#[derive(Clone)]
pub struct Trigger {
    tx: Arc<watch::Sender<bool>>,
}

impl Trigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half, polled at cycle boundaries and awaited inside holds.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for `dur`. Returns `true` if the full duration elapsed, `false`
    /// if the shutdown signal cut the wait short.
    pub async fn sleep(&mut self, dur: Duration) -> bool {
        if self.is_signalled() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(dur) => true,
            () = self.signalled() => false,
        }
    }

    /// Resolves once the flag flips. Pends forever if the trigger side is
    /// dropped without firing, which keeps plain sleeps working in tests.
    pub async fn signalled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn starts_unsignalled() {
        let (_trigger, shutdown) = channel();
        assert!(!shutdown.is_signalled());
    }

    #[test]
    fn trigger_flips_flag() {
        let (trigger, shutdown) = channel();
        trigger.trigger();
        assert!(shutdown.is_signalled());
    }

    #[tokio::test]
    async fn sleep_runs_to_completion_without_signal() {
        let (_trigger, mut shutdown) = channel();
        assert!(shutdown.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn sleep_returns_immediately_when_already_signalled() {
        let (trigger, mut shutdown) = channel();
        trigger.trigger();

        let start = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_concurrent_trigger() {
        let (trigger, mut shutdown) = channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let start = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn clones_observe_the_same_signal() {
        let (trigger, shutdown) = channel();
        let mut clone = shutdown.clone();
        trigger.trigger();
        assert!(clone.is_signalled());
        assert!(!clone.sleep(Duration::from_secs(30)).await);
    }
}
