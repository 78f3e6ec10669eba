//! A terminal-hosted hardware toolchain session: an interpreter wired to a
//! pseudo-terminal, a mirrored virtual filesystem, and an isolated build
//! worker.

pub mod builder;
pub mod config;
pub mod controller;
pub mod encoding;
pub mod fs;
pub mod logging;
pub mod machine;
pub mod pty;
pub mod shell;
pub mod toolchain;
