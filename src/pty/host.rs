//! Wiring between the host terminal and the bridge.

use std::error::Error;
use std::io::{self, Read};
use std::thread;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size as terminal_size};

use super::bridge::{PtyMaster, PtySize};

/// Host terminal size, or `fallback_cols` × 24 when it cannot be queried.
pub fn host_size(fallback_cols: u16) -> PtySize {
    match terminal_size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => PtySize { cols, rows },
        _ => PtySize {
            cols: fallback_cols,
            rows: 24,
        },
    }
}

/// Forward host stdin into the bridge on a background thread. The thread
/// ends the session when stdin closes.
pub fn spawn_stdin_forwarder(master: PtyMaster) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-forwarder".to_string())
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buffer = [0u8; 1024];
            loop {
                match stdin.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(count) => master.feed_input(&buffer[..count]),
                }
            }
            master.end_session();
        })
}

/// Raw mode for the lifetime of the guard.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}
