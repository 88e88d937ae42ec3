//! Quiescence barrier for background work.
//!
//! Every unit of work that may still schedule events (a packet handed to a
//! node inbox, a running consensus round) holds a [`WorkGuard`]. The kernel
//! waits for the outstanding count to reach zero instead of sleeping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Counts outstanding background work.
#[derive(Debug, Clone, Default)]
pub struct Quiescence {
    inner: Arc<Inner>,
}

impl Quiescence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of work; it completes when the guard drops.
    pub fn begin(&self) -> WorkGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        WorkGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Resolves once no work is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent final drop is not missed
            let notified = self.inner.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one unit of outstanding work.
#[derive(Debug)]
pub struct WorkGuard {
    inner: Arc<Inner>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
