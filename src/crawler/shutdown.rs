//! Cooperative cancellation
//!
//! A [`Shutdown`] handle is held by whoever decides to stop (the Ctrl-C
//! handler in the binary, or a test); any number of [`ShutdownSignal`]s
//! observe it.

use tokio::sync::watch;

/// Raises the shutdown signal
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

/// Observes the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, ShutdownSignal { receiver })
    }

    /// Requests shutdown; idempotent
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        // Dropping the sender leaves the value at `false` forever.
        drop(sender);
        Self { receiver }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown has been requested
    ///
    /// Never resolves if the [`Shutdown`] handle was dropped without triggering.
    pub async fn triggered(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_is_observed() {
        let (shutdown, mut signal) = Shutdown::new();
        assert!(!signal.is_triggered());

        shutdown.trigger();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let mut signal = ShutdownSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.triggered()).await;
        assert!(result.is_err());
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscribers_see_trigger() {
        let (shutdown, _signal) = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.signal().is_triggered());
    }
}
