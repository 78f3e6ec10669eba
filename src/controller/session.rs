//! Session controller: terminal ⇄ interpreter wiring and cancellation.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fs::{FileTreeNode, FsError, FsMirror, PathPredicate, Subscription};
use crate::machine::Reducer;

use super::hooks::SessionHooks;
use super::interpreter::{Interpreter, InterpreterError, OutputSink};
use super::interrupt::{InterruptChannel, InterruptDelivery};
use super::lifecycle::{SessionIntent, SessionReducer, SessionState};
use super::terminal::{TerminalInput, TerminalIo};

pub(super) const DEFAULT_COLUMNS: u16 = 80;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot {operation} while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Standard input was redirected to descriptor {fd}, expected 0")]
    StdinDescriptor { fd: u32 },

    #[error(transparent)]
    Interpreter(#[from] InterpreterError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Installed {
    package_manager: bool,
    locators: HashSet<String>,
}

pub(super) struct Inner {
    id: Uuid,
    interpreter: Arc<dyn Interpreter>,
    pub(super) filesystem: FsMirror,
    pub(super) interrupts: InterruptChannel,
    state: Mutex<SessionState>,
    terminal: Mutex<Option<Arc<dyn TerminalIo>>>,
    on_start: Mutex<Option<Callback>>,
    on_end: Mutex<Option<Callback>>,
    installed: tokio::sync::Mutex<Installed>,
    unit: tokio::sync::Mutex<()>,
    watches: Mutex<Vec<Subscription>>,
}

impl Inner {
    pub(super) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(super) fn dispatch(&self, intent: SessionIntent) -> SessionState {
        let mut state = self.state.lock();
        let next = SessionReducer::reduce(*state, intent);
        if next != *state {
            debug!(session = %self.id, from = ?*state, to = ?next, ?intent, "session state");
        }
        *state = next;
        next
    }

    pub(super) fn terminal_columns(&self) -> u16 {
        self.terminal
            .lock()
            .as_ref()
            .map(|terminal| terminal.columns())
            .unwrap_or(DEFAULT_COLUMNS)
    }

    pub(super) fn notify_start(&self) {
        let callback = self.on_start.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub(super) fn notify_end(&self) {
        let callback = self.on_end.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn require_usable(&self, operation: &'static str) -> Result<(), SessionError> {
        let state = self.state();
        if state.is_usable() {
            Ok(())
        } else {
            Err(SessionError::InvalidState { operation, state })
        }
    }
}

/// Owns one interpreter session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Bind `interpreter` to a new session. The interpreter receives its
    /// hooks and the interrupt flag here.
    pub fn new(interpreter: Arc<dyn Interpreter>, filesystem: FsMirror) -> Self {
        let inner = Arc::new(Inner {
            id: Uuid::new_v4(),
            interpreter,
            filesystem,
            interrupts: InterruptChannel::new(),
            state: Mutex::new(SessionState::default()),
            terminal: Mutex::new(None),
            on_start: Mutex::new(None),
            on_end: Mutex::new(None),
            installed: tokio::sync::Mutex::new(Installed::default()),
            unit: tokio::sync::Mutex::new(()),
            watches: Mutex::new(Vec::new()),
        });
        inner
            .interpreter
            .set_interrupt_flag(inner.interrupts.flag());
        inner
            .interpreter
            .attach(SessionHooks::new(Arc::downgrade(&inner)));
        info!(session = %inner.id, "session created");
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn hooks(&self) -> SessionHooks {
        SessionHooks::new(Arc::downgrade(&self.inner))
    }

    pub fn filesystem(&self) -> &FsMirror {
        &self.inner.filesystem
    }

    /// Route stdout/stderr to the terminal and stdin from it.
    ///
    /// Fails with [`SessionError::StdinDescriptor`] if the interpreter did
    /// not put the new stdin on descriptor 0.
    pub fn setup_input_output(&self, terminal: Arc<dyn TerminalIo>) -> Result<(), SessionError> {
        let state = self.inner.state();
        if state == SessionState::Disposed {
            return Err(SessionError::InvalidState {
                operation: "set up input/output",
                state,
            });
        }

        let writer = Arc::clone(&terminal);
        let sink: OutputSink = Arc::new(move |bytes: &[u8]| writer.write(bytes));
        self.inner.interpreter.set_stdout(Arc::clone(&sink));
        self.inner.interpreter.set_stderr(sink);

        let fd = self
            .inner
            .interpreter
            .redirect_stdin(Arc::new(TerminalInput(Arc::clone(&terminal))))?;
        if fd != 0 {
            return Err(SessionError::StdinDescriptor { fd });
        }

        *self.inner.terminal.lock() = Some(terminal);
        self.inner.dispatch(SessionIntent::ConfigureIo);
        Ok(())
    }

    /// Stop the running unit: cancel its pending wait if there is one,
    /// otherwise raise the interrupt flag. Does nothing unless running.
    pub fn interrupt(&self) -> InterruptDelivery {
        if self.inner.state() != SessionState::Running {
            debug!(session = %self.inner.id, "interrupt ignored; nothing running");
            return InterruptDelivery::Ignored;
        }
        let delivery = self.inner.interrupts.deliver();
        debug!(session = %self.inner.id, ?delivery, "interrupt delivered");
        delivery
    }

    /// Replace the callback run before each top-level unit.
    pub fn on_execution_start(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_start.lock() = Some(Arc::new(callback));
    }

    /// Replace the callback run after each top-level unit.
    pub fn on_execution_end(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_end.lock() = Some(Arc::new(callback));
    }

    /// Install a package once; repeated locators are skipped.
    pub async fn install(&self, locator: &str) -> Result<(), SessionError> {
        self.inner.require_usable("install packages")?;
        self.inner.dispatch(SessionIntent::Engage);

        let mut installed = self.inner.installed.lock().await;
        if installed.locators.contains(locator) {
            debug!(locator, "already installed");
            return Ok(());
        }
        if !installed.package_manager {
            self.inner.interpreter.load_package_manager().await?;
            installed.package_manager = true;
        }
        self.inner.interpreter.install_package(locator).await?;
        installed.locators.insert(locator.to_string());
        info!(locator, "package installed");
        Ok(())
    }

    /// Run source in the interpreter and wait for it to finish.
    ///
    /// Units run one at a time; a second call waits for the first.
    pub async fn run_code(&self, source: &str) -> Result<Option<String>, SessionError> {
        self.inner.require_usable("run code")?;
        let _unit = self.inner.unit.lock().await;
        self.inner.require_usable("run code")?;
        self.inner.dispatch(SessionIntent::Engage);
        Ok(self.inner.interpreter.run(source).await?)
    }

    /// Call `callback` with a fresh snapshot of `root` after each debounced
    /// change below it. The subscription ends with the session.
    pub fn watch_tree(
        &self,
        root: &str,
        callback: impl Fn(Vec<FileTreeNode>) + Send + Sync + 'static,
    ) -> Result<(), SessionError> {
        let state = self.inner.state();
        if state == SessionState::Disposed {
            return Err(SessionError::InvalidState {
                operation: "watch the file tree",
                state,
            });
        }
        let root = crate::fs::path::normalize(root)?;
        let filesystem = self.inner.filesystem.clone();
        let watched = root.clone();
        let subscription = self.inner.filesystem.subscribe_to_updates(
            PathPredicate::under(root),
            move || match filesystem.read_tree(&watched) {
                Ok(nodes) => callback(nodes),
                Err(err) => warn!(root = %watched, error = %err, "failed to read tree"),
            },
        );
        self.inner.watches.lock().push(subscription);
        Ok(())
    }

    /// End the session. Hooks go inert and watches are removed.
    pub fn dispose(&self) {
        if self.inner.state() == SessionState::Disposed {
            return;
        }
        self.inner.dispatch(SessionIntent::Dispose);
        for subscription in self.inner.watches.lock().drain(..) {
            subscription.dispose();
        }
        self.inner.interrupts.set_waiter(None);
        self.inner.on_start.lock().take();
        self.inner.on_end.lock().take();
        self.inner.terminal.lock().take();
        info!(session = %self.inner.id, "session disposed");
    }
}
