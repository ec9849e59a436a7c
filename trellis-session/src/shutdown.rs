//! Cooperative cancellation token shared by the gate and every pipeline task.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::Notify;

/// Interrupt signal propagated to every spawned task. Cloned handles share
/// one flag; a single trigger reaches all of them.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    /// A signal that is only triggered programmatically.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// A signal wired to the process ctrl-c handler.
    #[must_use]
    pub fn hooked_to_ctrl_c() -> Self {
        let signal = Self::new();
        let hooked = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                hooked.trigger();
            }
        });
        signal
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning `false` when interrupted first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }

    /// Resolve once the signal has been triggered; immediately if it already
    /// was. Registers interest before re-checking the flag so a concurrent
    /// trigger cannot be missed.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.triggered() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_unblocks_sleep() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(60)).await });
        tokio::task::yield_now().await;
        signal.trigger();
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_after_trigger() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.cancelled().await;
    }
}
