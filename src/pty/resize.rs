//! Host terminal resize forwarding.

use std::error::Error;

use super::bridge::{PtyMaster, PtySize};

/// Follows host terminal resizes (SIGWINCH) into the bridge.
///
/// Only sizes that differ from the bridge's current one are forwarded.
pub struct ResizeWatcher {
    #[cfg(unix)]
    signals: signal_hook::iterator::Handle,
    #[cfg(unix)]
    worker: std::thread::JoinHandle<()>,
}

fn forward(master: &PtyMaster, size: PtySize) -> bool {
    if master.size() == size {
        return false;
    }
    master.resize(size);
    true
}

#[cfg(unix)]
impl ResizeWatcher {
    pub fn start(master: PtyMaster) -> Result<Option<Self>, Box<dyn Error>> {
        use signal_hook::consts::signal::SIGWINCH;
        use signal_hook::iterator::Signals;

        let mut pending = Signals::new([SIGWINCH])?;
        let signals = pending.handle();
        let worker = std::thread::Builder::new()
            .name("resize-watcher".to_string())
            .spawn(move || {
                for _ in pending.forever() {
                    if let Ok((cols, rows)) = crossterm::terminal::size() {
                        if forward(&master, PtySize { cols, rows }) {
                            tracing::debug!(cols, rows, "host terminal resized");
                        }
                    }
                }
            })?;
        Ok(Some(Self { signals, worker }))
    }

    pub fn stop(self) {
        self.signals.close();
        let _ = self.worker.join();
    }
}

#[cfg(not(unix))]
impl ResizeWatcher {
    pub fn start(_master: PtyMaster) -> Result<Option<Self>, Box<dyn Error>> {
        Ok(None)
    }

    pub fn stop(self) {}
}
