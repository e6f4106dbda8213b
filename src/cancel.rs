//! Cooperative cancellation for the provisioning loop.
//!
//! A [`CancelHandle`] flips a watch channel (typically from a Ctrl+C
//! listener); the loop observes it through [`CancelSignal`] at the top of each
//! attempt and while sleeping.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// Raised when the operator interrupted the run.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("cancelled by operator")]
pub struct Cancelled;

/// Sending half; cancels every cloned [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half observed by the scheduler and poller.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a connected handle/signal pair.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_handle, signal) = cancel_pair();
        signal
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fails fast when cancellation has already been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when the handle has fired.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Resolves once cancellation is requested. Never resolves when the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when cancellation is requested before or during
    /// the sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.cancelled() => Err(Cancelled),
        }
    }
}
