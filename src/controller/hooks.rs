use std::sync::{Arc, Weak};

use crate::fs::FsMirror;

use super::interrupt::AsyncWaiter;
use super::lifecycle::{SessionIntent, SessionState};
use super::session::Inner;

/// Interpreter-side binding to its session.
///
/// Handed to the interpreter once, at session construction. Every call is
/// a no-op after the session is disposed or dropped.
#[derive(Clone)]
pub struct SessionHooks {
    inner: Weak<Inner>,
}

impl SessionHooks {
    pub(super) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }

    fn live(&self) -> Option<Arc<Inner>> {
        self.inner
            .upgrade()
            .filter(|inner| inner.state() != SessionState::Disposed)
    }

    /// Current terminal width, for tools that format to it.
    pub fn terminal_columns(&self) -> u16 {
        self.live()
            .map(|inner| inner.terminal_columns())
            .unwrap_or(super::session::DEFAULT_COLUMNS)
    }

    pub fn filesystem(&self) -> Option<FsMirror> {
        self.live().map(|inner| inner.filesystem.clone())
    }

    pub async fn sync_fs_from_backing(&self) {
        if let Some(inner) = self.live() {
            inner.filesystem.sync_fs_from_backing().await;
        }
    }

    pub async fn sync_fs_to_backing(&self) {
        if let Some(inner) = self.live() {
            inner.filesystem.sync_fs_to_backing().await;
        }
    }

    /// A top-level unit is about to run.
    pub fn signal_execution_start(&self) {
        if let Some(inner) = self.live() {
            if inner.dispatch(SessionIntent::ExecutionStarted) == SessionState::Running {
                inner.interrupts.flag().take();
            }
            inner.notify_start();
        }
    }

    /// The top-level unit finished, however it ended.
    pub fn signal_execution_end(&self) {
        if let Some(inner) = self.live() {
            inner.dispatch(SessionIntent::ExecutionEnded);
            inner.notify_end();
        }
    }

    /// Register (or clear) the wait an interrupt should cancel.
    pub fn set_interrupt_waiter(&self, waiter: Option<Arc<dyn AsyncWaiter>>) {
        if let Some(inner) = self.live() {
            inner.interrupts.set_waiter(waiter);
        }
    }
}
