//! Single-shot timer
//!
//! Holds at most one pending task. Arming cancels whatever was pending, and
//! every arm or cancel bumps a generation counter so a callback that was
//! already in flight can tell it has been superseded.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Timer {
    handle: Option<JoinHandle<()>>,
    fire_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for `at`, replacing any pending fire.
    ///
    /// The callback receives the generation it was armed with. Must be
    /// called from within a Tokio runtime.
    pub fn arm<F, Fut>(&mut self, at: DateTime<Utc>, callback: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let generation = self.generation;
        let delay = (at - Utc::now()).to_std().unwrap_or_default();

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(generation).await;
        }));
        self.fire_at = Some(at);

        debug!(generation, fire_at = %at, "timer armed");
        generation
    }

    /// Drop the pending fire, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        self.fire_at = None;

        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                debug!(generation = self.generation, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Called by a firing callback: detach its own task so later cancels
    /// cannot abort the work it is about to do.
    ///
    /// Returns false if the timer was re-armed or cancelled since `generation`.
    pub fn release(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        self.fire_at = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.fire_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
