//! Session controller.
//!
//! Bridges a terminal to an embedded interpreter's standard streams and
//! owns cancellation. Two interrupt paths exist:
//!
//! - if the interpreter registered a pending async wait, the interrupt
//!   cancels it (takes effect at the next scheduler turn);
//! - otherwise the shared flag is raised and the interpreter stops at its
//!   next check point.

mod gate;
mod hooks;
mod interpreter;
mod interrupt;
mod lifecycle;
mod session;
mod terminal;

pub use gate::ExecutionGate;
pub use hooks::SessionHooks;
pub use interpreter::{InputDevice, Interpreter, InterpreterError, OutputSink};
pub use interrupt::{
    AsyncWaiter, InterruptChannel, InterruptDelivery, InterruptFlag, InterruptWaiter,
    WaitOutcome, SIGINT,
};
pub use lifecycle::{SessionIntent, SessionReducer, SessionState};
pub use session::{SessionController, SessionError};
pub use terminal::TerminalIo;
