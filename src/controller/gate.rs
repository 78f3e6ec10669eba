use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct GateInner {
    delay: Duration,
    enabled: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<Listener>>,
}

impl GateInner {
    fn set(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) == enabled {
            return;
        }
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(enabled);
        }
    }
}

/// Debounced "stop" affordance.
///
/// Enabled only once a unit has been running for `delay`, and disabled
/// as soon as it ends, so very short commands never flash a stop control.
#[derive(Clone)]
pub struct ExecutionGate {
    inner: Arc<GateInner>,
}

impl ExecutionGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(GateInner {
                delay,
                enabled: AtomicBool::new(false),
                pending: Mutex::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Called with the new value each time the gate flips.
    pub fn on_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        *self.inner.listener.lock() = Some(Arc::new(listener));
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Must be called from within a tokio runtime.
    pub fn execution_started(&self) {
        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.set(true);
        });
        if let Some(previous) = self.inner.pending.lock().replace(timer) {
            previous.abort();
        }
    }

    pub fn execution_ended(&self) {
        if let Some(timer) = self.inner.pending.lock().take() {
            timer.abort();
        }
        self.inner.set(false);
    }
}
