//! Deadlines and cooperative cancellation for dials and requests.
//!
//! A [`Deadline`] combines an optional expiry instant with a cancellation
//! signal. Cloning a deadline shares the signal, so one [`Canceller`] stops
//! every operation derived from it.

use crate::base::neterror::NetError;
use std::future::{pending, Future};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

/// Fires the cancellation signal of the deadlines it was created with.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::never()
    }
}

impl Deadline {
    /// A deadline that never expires and cannot be cancelled.
    pub fn never() -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self { at: None, cancel }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn at(at: Instant) -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self {
            at: Some(at),
            cancel,
        }
    }

    /// Attach a fresh cancellation signal, returning its trigger.
    pub fn cancellable(self) -> (Self, Canceller) {
        let (tx, cancel) = watch::channel(false);
        (Self { at: self.at, cancel }, Canceller { tx })
    }

    /// A deadline no later than `self` and no later than `timeout` from now,
    /// sharing the same cancellation signal.
    pub fn tightened(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let at = match self.at {
            Some(at) if at < candidate => at,
            _ => candidate,
        };
        Self {
            at: Some(at),
            cancel: self.cancel.clone(),
        }
    }

    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Resolves once the deadline passes or the signal fires, yielding the
    /// matching error (`TimedOut` or `Aborted`).
    pub async fn expired(&self) -> NetError {
        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            loop {
                if *cancel.borrow_and_update() {
                    return;
                }
                if cancel.changed().await.is_err() {
                    // Sender gone without firing; nothing can cancel us now.
                    pending::<()>().await;
                }
            }
        };
        let timer = async {
            match self.at {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => NetError::Aborted,
            _ = timer => NetError::TimedOut,
        }
    }

    /// Run `fut` to completion unless the deadline fires first. The future
    /// is dropped on expiry, releasing whatever it owns.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        if self.is_cancelled() {
            return Err(NetError::Aborted);
        }
        tokio::select! {
            biased;
            err = self.expired() => Err(err),
            res = fut => res,
        }
    }
}
