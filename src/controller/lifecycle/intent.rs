use crate::machine::Intent;

/// Events dispatched to the session lifecycle reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIntent {
    /// Standard streams were redirected to the terminal.
    ConfigureIo,

    /// The session first used the interpreter (install or run).
    Engage,

    /// The interpreter began a top-level unit.
    ExecutionStarted,

    /// The interpreter finished a top-level unit.
    ExecutionEnded,

    Dispose,
}

impl Intent for SessionIntent {}
