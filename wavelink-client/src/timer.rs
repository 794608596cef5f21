//! Cancellable one-shot timers
//!
//! The transport runs three of these: reconnect, ping and token refresh.
//! Arming replaces any pending timer; cancelling reports whether a live
//! timer was actually cancelled, which is what decides whether a heartbeat
//! deserves a pong.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A slot holding at most one pending timer.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer: after `delay`, run `task`. A previously armed timer is
    /// aborted first.
    pub fn arm<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Cancel the pending timer. Returns `true` only if a timer was still
    /// pending, i.e. it had not fired yet.
    pub fn cancel(&self) -> bool {
        let mut slot = self.handle.lock().unwrap();
        match slot.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a timer is currently pending.
    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
