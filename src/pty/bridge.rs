//! In-process pseudo-terminal pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use super::discipline::{LineDiscipline, Signal, Termios};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtySize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

struct Shared {
    discipline: Mutex<LineDiscipline>,
    readable: Notify,
    output: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    size: Mutex<PtySize>,
    handlers: Mutex<Vec<SignalHandler>>,
    closed: AtomicBool,
}

impl Shared {
    fn emit(&self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        if let Some(sender) = self.output.lock().as_ref() {
            if sender.send(bytes).is_err() {
                trace!("terminal output receiver dropped");
            }
        }
    }
}

/// Open a connected pair. The returned [`PtyOutput`] yields everything the
/// terminal should render: echo and program output, in order.
pub fn open(size: PtySize) -> (PtyMaster, PtySlave, PtyOutput) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        discipline: Mutex::new(LineDiscipline::default()),
        readable: Notify::new(),
        output: Mutex::new(Some(sender)),
        size: Mutex::new(size),
        handlers: Mutex::new(Vec::new()),
        closed: AtomicBool::new(false),
    });
    (
        PtyMaster {
            shared: Arc::clone(&shared),
        },
        PtySlave { shared },
        PtyOutput { receiver },
    )
}

/// Terminal side: keystrokes in, size changes, session end.
#[derive(Clone)]
pub struct PtyMaster {
    shared: Arc<Shared>,
}

impl PtyMaster {
    /// Feed keystrokes through the line discipline.
    pub fn feed_input(&self, bytes: &[u8]) {
        let effects = self.shared.discipline.lock().input(bytes);
        self.shared.emit(effects.echo);
        if effects.readable {
            self.shared.readable.notify_one();
        }
        if !effects.signals.is_empty() {
            let handlers: Vec<SignalHandler> = self.shared.handlers.lock().clone();
            for signal in effects.signals {
                debug!(?signal, handlers = handlers.len(), "terminal signal");
                for handler in &handlers {
                    handler(signal);
                }
            }
        }
    }

    pub fn resize(&self, size: PtySize) {
        *self.shared.size.lock() = size;
    }

    pub fn size(&self) -> PtySize {
        *self.shared.size.lock()
    }

    /// Close the output stream and wake any reader with end of input.
    pub fn end_session(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.output.lock().take();
        self.shared.readable.notify_one();
    }
}

/// Program side: reads lines, writes output, receives signals.
#[derive(Clone)]
pub struct PtySlave {
    shared: Arc<Shared>,
}

impl PtySlave {
    /// Wait until input is readable and drain it. An empty vector means end
    /// of input (`^D` on an empty line, or the session ended).
    pub async fn read(&self) -> Vec<u8> {
        loop {
            let notified = self.shared.readable.notified();
            if let Some(bytes) = self.shared.discipline.lock().take_readable() {
                return bytes;
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return Vec::new();
            }
            notified.await;
        }
    }

    /// Write program output. Returns the number of bytes accepted.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let processed = self.shared.discipline.lock().output(bytes);
        self.shared.emit(processed);
        bytes.len()
    }

    pub fn on_signal(&self, handler: impl Fn(Signal) + Send + Sync + 'static) {
        self.shared.handlers.lock().push(Arc::new(handler));
    }

    pub fn columns(&self) -> u16 {
        self.shared.size.lock().cols
    }

    pub fn termios(&self) -> Termios {
        self.shared.discipline.lock().termios
    }

    pub fn set_termios(&self, termios: Termios) {
        self.shared.discipline.lock().termios = termios;
    }
}

/// Receiver of bytes to render.
pub struct PtyOutput {
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl PtyOutput {
    /// Next chunk, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.try_recv().ok()
    }
}
