//! Host-side handle to the build worker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::fs::FileTree;

use super::command::CommandRegistry;
use super::protocol::{BuilderMessage, HostMessage, Packages};
use super::worker;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("The builder is busy")]
    Busy,

    #[error("{0}")]
    Fault(String),

    #[error("The build worker is gone")]
    Disconnected,

    #[error("Unexpected '{0}' message from the build worker")]
    Unexpected(&'static str),

    #[error("Failed to start the build worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Outcome of a build that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub code: i32,
    pub files: FileTree,
}

/// Single-flight client of the build worker.
///
/// The builder reports busy until the worker's package list has arrived
/// and while a build is outstanding; `build` fails fast with
/// [`BuildError::Busy`] in both cases.
pub struct Builder {
    requests: std_mpsc::Sender<HostMessage>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<BuilderMessage>>,
    busy: AtomicBool,
    // Builds whose caller went away before the terminal message arrived.
    abandoned: AtomicUsize,
    packages: OnceCell<Packages>,
    _worker: thread::JoinHandle<()>,
}

impl Builder {
    pub fn spawn(registry: CommandRegistry) -> Result<Self, BuildError> {
        let channels = worker::spawn(registry).map_err(BuildError::Spawn)?;
        Ok(Self {
            requests: channels.requests,
            events: tokio::sync::Mutex::new(channels.events),
            busy: AtomicBool::new(true),
            abandoned: AtomicUsize::new(0),
            packages: OnceCell::new(),
            _worker: channels.thread,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Wait for the worker's package list. Resolves immediately once known.
    pub async fn packages(&self) -> Result<Packages, BuildError> {
        self.packages
            .get_or_try_init(|| async {
                let mut events = self.events.lock().await;
                let message = events.recv().await.ok_or(BuildError::Disconnected)?;
                match message {
                    BuilderMessage::Packages { packages } => {
                        self.busy.store(false, Ordering::Release);
                        debug!(?packages, "builder ready");
                        Ok(packages)
                    }
                    BuilderMessage::Error { error } => Err(BuildError::Fault(error)),
                    other => Err(BuildError::Unexpected(other.kind())),
                }
            })
            .await
            .cloned()
    }

    /// Run `script_name` from `files` and stream output lines to
    /// `on_output` as they arrive.
    pub async fn build(
        &self,
        files: FileTree,
        script_name: &str,
        mut on_output: impl FnMut(&[u8]) + Send,
    ) -> Result<BuildResult, BuildError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BuildError::Busy);
        }
        let request_id = Uuid::new_v4();
        let in_flight = AtomicBool::new(false);
        let _reset = scopeguard::guard((), |_| {
            if in_flight.load(Ordering::Acquire) {
                self.abandoned.fetch_add(1, Ordering::AcqRel);
            }
            self.busy.store(false, Ordering::Release);
        });

        let mut events = self.events.lock().await;
        self.discard_abandoned(&mut events).await?;

        debug!(%request_id, script = script_name, files = files.len(), "build requested");
        self.requests
            .send(HostMessage::Build {
                files,
                script_name: script_name.to_string(),
            })
            .map_err(|_| BuildError::Disconnected)?;
        in_flight.store(true, Ordering::Release);

        loop {
            let Some(message) = events.recv().await else {
                in_flight.store(false, Ordering::Release);
                return Err(BuildError::Disconnected);
            };
            match message {
                BuilderMessage::Output { bytes } => on_output(&bytes),
                BuilderMessage::Result { code, files } => {
                    in_flight.store(false, Ordering::Release);
                    debug!(%request_id, code, "build result");
                    return Ok(BuildResult { code, files });
                }
                BuilderMessage::Error { error } => {
                    in_flight.store(false, Ordering::Release);
                    debug!(%request_id, %error, "build error");
                    return Err(BuildError::Fault(error));
                }
                BuilderMessage::Packages { .. } => {
                    trace!("ignoring late packages message");
                }
            }
        }
    }

    async fn discard_abandoned(
        &self,
        events: &mut mpsc::UnboundedReceiver<BuilderMessage>,
    ) -> Result<(), BuildError> {
        while self.abandoned.load(Ordering::Acquire) > 0 {
            let message = events.recv().await.ok_or(BuildError::Disconnected)?;
            trace!(kind = message.kind(), "discarding message of abandoned build");
            if message.is_terminal() {
                self.abandoned.fetch_sub(1, Ordering::AcqRel);
            }
        }
        Ok(())
    }
}

/// Decorator that waits for its turn instead of failing with `Busy`.
pub struct QueuedBuilder {
    inner: Arc<Builder>,
    turn: tokio::sync::Mutex<()>,
}

impl QueuedBuilder {
    pub fn new(inner: Arc<Builder>) -> Self {
        Self {
            inner,
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn packages(&self) -> Result<Packages, BuildError> {
        self.inner.packages().await
    }

    pub async fn build(
        &self,
        files: FileTree,
        script_name: &str,
        on_output: impl FnMut(&[u8]) + Send,
    ) -> Result<BuildResult, BuildError> {
        let _turn = self.turn.lock().await;
        self.inner.packages().await?;
        self.inner.build(files, script_name, on_output).await
    }
}
