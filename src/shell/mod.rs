//! `ToolShell`: a line-oriented command interpreter for a session.
//!
//! `run("repl")` prompts for commands on stdin until `exit`, end of input,
//! or too many consecutive failures. Any other source is run one line per
//! command.

mod commands;
pub mod words;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::builder::BuildError;
use crate::controller::{
    InputDevice, Interpreter, InterpreterError, InterruptFlag, InterruptWaiter, OutputSink,
    SessionHooks,
};
use crate::fs::FsError;
use crate::toolchain::Toolchain;

use self::words::SplitError;

const PROMPT: &[u8] = b"\n> glasgow ";
const GIVE_UP: &[u8] = b"\nToo many errors, giving up.";

#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// Consecutive failures before the repl gives up.
    pub max_failures: u32,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self { max_failures: 3 }
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("{0}")]
    Usage(String),

    #[error("{0}: command not found")]
    UnknownCommand(String),

    #[error("no toolchain is loaded")]
    NoToolchain,

    #[error("shell is not attached to a session")]
    Detached,

    #[error("package manager is not loaded")]
    NoPackageManager,

    #[error("build exited with code {code}")]
    ExitStatus { code: i32 },

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl ShellError {
    fn kind(&self) -> &'static str {
        match self {
            ShellError::Interrupted => "KeyboardInterrupt",
            ShellError::Split(_) => "SyntaxError",
            ShellError::Usage(_) => "UsageError",
            ShellError::UnknownCommand(_) => "CommandNotFound",
            ShellError::NoToolchain | ShellError::Detached | ShellError::NoPackageManager => {
                "RuntimeError"
            }
            ShellError::ExitStatus { .. } => "SystemExit",
            ShellError::Fs(_) => "OSError",
            ShellError::Build(_) => "BuildError",
        }
    }
}

impl From<ShellError> for InterpreterError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Interrupted => InterpreterError::Interrupted,
            other => InterpreterError::raised(other.kind(), other.to_string()),
        }
    }
}

/// Outcome of one successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// Open descriptor slots; 0..=2 start open.
#[derive(Debug)]
struct Descriptors(Vec<bool>);

impl Descriptors {
    /// Close stdin and open a new stream on the lowest free slot.
    fn reopen_stdin(&mut self) -> u32 {
        self.0[0] = false;
        let slot = match self.0.iter().position(|open| !open) {
            Some(slot) => slot,
            None => {
                self.0.push(false);
                self.0.len() - 1
            }
        };
        self.0[slot] = true;
        slot as u32
    }
}

pub struct ToolShell {
    options: ShellOptions,
    toolchain: Option<Arc<Toolchain>>,
    hooks: Mutex<Option<SessionHooks>>,
    flag: Mutex<InterruptFlag>,
    stdout: Mutex<Option<OutputSink>>,
    stderr: Mutex<Option<OutputSink>>,
    stdin: Mutex<Option<Arc<dyn InputDevice>>>,
    descriptors: Mutex<Descriptors>,
    line: tokio::sync::Mutex<Vec<u8>>,
    package_manager: AtomicBool,
    installed: Mutex<Vec<String>>,
}

impl ToolShell {
    pub fn new(options: ShellOptions, toolchain: Option<Arc<Toolchain>>) -> Self {
        Self {
            options,
            toolchain,
            hooks: Mutex::new(None),
            flag: Mutex::new(InterruptFlag::new()),
            stdout: Mutex::new(None),
            stderr: Mutex::new(None),
            stdin: Mutex::new(None),
            descriptors: Mutex::new(Descriptors(vec![true; 3])),
            line: tokio::sync::Mutex::new(Vec::new()),
            package_manager: AtomicBool::new(false),
            installed: Mutex::new(Vec::new()),
        }
    }

    /// Locators installed so far, in install order.
    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().clone()
    }

    fn hooks(&self) -> Result<SessionHooks, ShellError> {
        self.hooks.lock().clone().ok_or(ShellError::Detached)
    }

    pub(crate) fn interrupt_flag(&self) -> InterruptFlag {
        self.flag.lock().clone()
    }

    pub(crate) fn toolchain(&self) -> Result<&Toolchain, ShellError> {
        self.toolchain.as_deref().ok_or(ShellError::NoToolchain)
    }

    pub(crate) fn write_stdout(&self, bytes: &[u8]) {
        let sink = self.stdout.lock().clone();
        match sink {
            Some(sink) => {
                sink(bytes);
            }
            None => debug!(len = bytes.len(), "stdout not connected; dropped"),
        }
    }

    pub(crate) fn write_stderr(&self, bytes: &[u8]) {
        let sink = self.stderr.lock().clone();
        match sink {
            Some(sink) => {
                sink(bytes);
            }
            None => debug!(len = bytes.len(), "stderr not connected; dropped"),
        }
    }

    /// Next line from stdin without its newline; `None` at end of input.
    async fn read_line(&self) -> Option<String> {
        let device = self.stdin.lock().clone()?;
        let mut line = self.line.lock().await;
        loop {
            if let Some(newline) = line.iter().position(|&b| b == b'\n') {
                let rest = line.split_off(newline + 1);
                let mut complete = std::mem::replace(&mut *line, rest);
                complete.pop();
                return Some(String::from_utf8_lossy(&complete).into_owned());
            }
            let chunk = device.read().await;
            if chunk.is_empty() {
                if line.is_empty() {
                    return None;
                }
                let complete = std::mem::take(&mut *line);
                return Some(String::from_utf8_lossy(&complete).into_owned());
            }
            line.extend_from_slice(&chunk);
        }
    }

    /// Race `work` against an interrupt of the registered waiter.
    async fn guarded(
        &self,
        hooks: &SessionHooks,
        work: impl Future<Output = Result<Flow, ShellError>> + Send,
    ) -> Result<Flow, ShellError> {
        let waiter = InterruptWaiter::new();
        hooks.set_interrupt_waiter(Some(Arc::new(waiter.clone())));
        let outcome = tokio::select! {
            result = work => result,
            _ = waiter.cancelled() => Err(ShellError::Interrupted),
        };
        waiter.complete();
        hooks.set_interrupt_waiter(None);
        outcome
    }

    /// Split and run one command line as a top-level unit.
    async fn execute_line(&self, hooks: &SessionHooks, line: &str) -> Result<Flow, ShellError> {
        let words = words::split(line)?;
        if words.is_empty() {
            return Ok(Flow::Continue);
        }
        debug!(command = %words[0], args = words.len() - 1, "shell command");

        hooks.sync_fs_from_backing().await;
        hooks.signal_execution_start();
        let result = self.guarded(hooks, self.dispatch(hooks, &words)).await;
        hooks.signal_execution_end();
        hooks.sync_fs_to_backing().await;
        result
    }

    async fn repl(&self, hooks: &SessionHooks) {
        let mut failures = 0;
        while failures < self.options.max_failures {
            self.write_stdout(PROMPT);
            let Some(line) = self.read_line().await else {
                debug!("stdin closed; leaving repl");
                return;
            };
            match self.execute_line(hooks, &line).await {
                Ok(Flow::Continue) => failures = 0,
                Ok(Flow::Exit) => return,
                Err(ShellError::Interrupted) => self.write_stdout(b"\n"),
                Err(err) => {
                    warn!(error = %err, "shell command failed");
                    let report = format!("\n\x1b[1;31m{}: {}\n\x1b[0m", err.kind(), err);
                    self.write_stderr(report.as_bytes());
                    failures += 1;
                }
            }
        }
        self.write_stderr(GIVE_UP);
    }
}

#[async_trait]
impl Interpreter for ToolShell {
    fn attach(&self, hooks: SessionHooks) {
        *self.hooks.lock() = Some(hooks);
    }

    fn set_interrupt_flag(&self, flag: InterruptFlag) {
        *self.flag.lock() = flag;
    }

    fn set_stdout(&self, sink: OutputSink) {
        *self.stdout.lock() = Some(sink);
    }

    fn set_stderr(&self, sink: OutputSink) {
        *self.stderr.lock() = Some(sink);
    }

    fn redirect_stdin(&self, device: Arc<dyn InputDevice>) -> Result<u32, InterpreterError> {
        let fd = self.descriptors.lock().reopen_stdin();
        *self.stdin.lock() = Some(device);
        Ok(fd)
    }

    async fn load_package_manager(&self) -> Result<(), InterpreterError> {
        self.package_manager.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn install_package(&self, locator: &str) -> Result<(), InterpreterError> {
        if !self.package_manager.load(Ordering::SeqCst) {
            return Err(ShellError::NoPackageManager.into());
        }
        self.installed.lock().push(locator.to_string());
        Ok(())
    }

    async fn run(&self, source: &str) -> Result<Option<String>, InterpreterError> {
        let hooks = self.hooks()?;
        if source.trim() == "repl" {
            self.repl(&hooks).await;
            return Ok(None);
        }
        for line in source.lines() {
            if self.execute_line(&hooks, line).await? == Flow::Exit {
                break;
            }
        }
        Ok(None)
    }
}
