//! The boundary between the session and the embedded interpreter.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::hooks::SessionHooks;
use super::interrupt::InterruptFlag;

/// Where the interpreter writes a standard stream. Returns bytes accepted.
pub type OutputSink = Arc<dyn Fn(&[u8]) -> usize + Send + Sync>;

/// Conditions raised by the interpreter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpreterError {
    /// Execution stopped because of an interrupt.
    #[error("KeyboardInterrupt")]
    Interrupted,

    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },
}

impl InterpreterError {
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Asynchronous input stream installed as the interpreter's stdin.
#[async_trait]
pub trait InputDevice: Send + Sync {
    /// Next chunk of input; empty at end of input.
    async fn read(&self) -> Vec<u8>;
}

/// An embedded interpreter driven by a session.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Bind the session's hooks. Called once, at session construction.
    fn attach(&self, hooks: SessionHooks);

    /// Install the flag polled at synchronous check points.
    fn set_interrupt_flag(&self, flag: InterruptFlag);

    fn set_stdout(&self, sink: OutputSink);

    fn set_stderr(&self, sink: OutputSink);

    /// Replace stdin. Returns the descriptor number the new stream got.
    fn redirect_stdin(&self, device: Arc<dyn InputDevice>) -> Result<u32, InterpreterError>;

    async fn load_package_manager(&self) -> Result<(), InterpreterError>;

    async fn install_package(&self, locator: &str) -> Result<(), InterpreterError>;

    /// Run `source` as one submission; returns the printed result, if any.
    async fn run(&self, source: &str) -> Result<Option<String>, InterpreterError>;
}
