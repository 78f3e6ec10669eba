//! Pseudo-terminal bridge.
//!
//! Decouples whatever renders the terminal from the program consuming its
//! byte stream. The master side takes keystrokes and renders output; the
//! slave side reads lines and writes output. A line discipline in between
//! handles echo, line editing and `^C`.

mod bridge;
mod discipline;
pub mod host;
mod resize;

pub use bridge::{open, PtyMaster, PtyOutput, PtySize, PtySlave};
pub use discipline::{Signal, Termios};
pub use resize::ResizeWatcher;
