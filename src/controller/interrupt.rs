//! Interrupt delivery: a shared flag plus an optional pending waiter.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Value stored in the flag when an interrupt is pending.
pub const SIGINT: u8 = 2;

/// Flag byte the interpreter polls at its check points.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicU8>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(SIGINT, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst) != 0
    }

    /// Clear the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.0.swap(0, Ordering::SeqCst) != 0
    }
}

/// A pending asynchronous wait the interpreter registers while running.
pub trait AsyncWaiter: Send + Sync {
    fn is_done(&self) -> bool;
    fn cancel(&self);
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// How an [`InterruptWaiter`] settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Cancelled,
}

/// Standard waiter: settles once, either completed by the interpreter or
/// cancelled by an interrupt.
#[derive(Debug, Clone)]
pub struct InterruptWaiter {
    state: Arc<AtomicU8>,
    notify: Arc<Notify>,
}

impl Default for InterruptWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptWaiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Mark the guarded work as finished. No effect once settled.
    pub fn complete(&self) {
        self.settle(COMPLETED);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    fn settle(&self, outcome: u8) -> bool {
        let settled = self
            .state
            .compare_exchange(PENDING, outcome, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if settled {
            self.notify.notify_waiters();
        }
        settled
    }

    fn outcome(&self) -> Option<WaitOutcome> {
        match self.state.load(Ordering::SeqCst) {
            COMPLETED => Some(WaitOutcome::Completed),
            CANCELLED => Some(WaitOutcome::Cancelled),
            _ => None,
        }
    }

    /// Wait until the waiter settles.
    pub async fn wait(&self) -> WaitOutcome {
        loop {
            // Register before checking so a settle in between is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Resolves only if the waiter is cancelled.
    pub async fn cancelled(&self) {
        if self.wait().await == WaitOutcome::Completed {
            std::future::pending::<()>().await;
        }
    }
}

impl AsyncWaiter for InterruptWaiter {
    fn is_done(&self) -> bool {
        self.outcome().is_some()
    }

    fn cancel(&self) {
        self.settle(CANCELLED);
    }
}

/// Which path an interrupt took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptDelivery {
    /// Nothing was running.
    Ignored,
    /// A pending waiter was cancelled.
    Waiter,
    /// The flag was raised for the next check point.
    Flag,
}

/// The shared flag and the waiter slot, owned by the session.
#[derive(Default)]
pub struct InterruptChannel {
    flag: InterruptFlag,
    waiter: Mutex<Option<Arc<dyn AsyncWaiter>>>,
}

impl InterruptChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&self) -> InterruptFlag {
        self.flag.clone()
    }

    pub fn set_waiter(&self, waiter: Option<Arc<dyn AsyncWaiter>>) {
        *self.waiter.lock() = waiter;
    }

    /// Cancel the pending waiter if it is still pending, else raise the flag.
    pub fn deliver(&self) -> InterruptDelivery {
        let waiter = self.waiter.lock().clone();
        match waiter {
            Some(waiter) if !waiter.is_done() => {
                waiter.cancel();
                InterruptDelivery::Waiter
            }
            _ => {
                self.flag.raise();
                InterruptDelivery::Flag
            }
        }
    }
}
