//! Single-purpose cancellable timers.
//!
//! A `ResettableTimer` holds at most one armed handle. Scheduling always
//! cancels the previous handle first, and dropping the timer cancels it
//! outright — a torn-down session can never be hit by a late fire.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct ResettableTimer {
    handle: Option<JoinHandle<()>>,
}

impl ResettableTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Arm the timer: run `on_fire` after `delay` unless cancelled or
    /// rescheduled first.
    pub fn schedule<F>(&mut self, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        }));
    }

    /// Disarm without firing. Safe to call when not armed.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a fire is still pending.
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ResettableTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
