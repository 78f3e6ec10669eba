//! Change subscriptions with per-tick debouncing.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::path;
use super::tree::FsEvent;

/// Decides which paths a subscription cares about.
#[derive(Clone)]
pub struct PathPredicate(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl PathPredicate {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Matches `prefix` itself and anything below it.
    pub fn under(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |candidate| path::is_within(candidate, &prefix))
    }

    pub fn matches(&self, path: &str) -> bool {
        (self.0)(path)
    }
}

impl fmt::Debug for PathPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PathPredicate")
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    id: u64,
    predicate: PathPredicate,
    callback: Callback,
    scheduled: AtomicBool,
    active: AtomicBool,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Arc<Entry>>>,
}

impl SubscriptionRegistry {
    pub fn subscribe(
        self: &Arc<Self>,
        predicate: PathPredicate,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(Arc::new(Entry {
            id,
            predicate,
            callback: Arc::new(callback),
            scheduled: AtomicBool::new(false),
            active: AtomicBool::new(true),
        }));
        Subscription {
            registry: Arc::downgrade(self),
            id,
            disposed: AtomicBool::new(false),
        }
    }

    /// Schedule every subscription matched by at least one event.
    pub fn dispatch(&self, events: &[FsEvent]) {
        if events.is_empty() {
            return;
        }
        let matched: Vec<Arc<Entry>> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| {
                events
                    .iter()
                    .any(|event| event.paths().any(|p| entry.predicate.matches(p)))
            })
            .cloned()
            .collect();
        for entry in matched {
            schedule(entry);
        }
    }

    fn remove(&self, id: u64) {
        let mut entries = self.entries.lock();
        if let Some(index) = entries.iter().position(|entry| entry.id == id) {
            let entry = entries.remove(index);
            entry.active.store(false, Ordering::SeqCst);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Delivery is deferred to the next turn of the runtime; events arriving
/// before then are folded into that single notification. Without a runtime
/// the callback runs inline.
fn schedule(entry: Arc<Entry>) {
    if entry.scheduled.swap(true, Ordering::SeqCst) {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::task::yield_now().await;
                deliver(&entry);
            });
        }
        Err(_) => deliver(&entry),
    }
}

fn deliver(entry: &Entry) {
    entry.scheduled.store(false, Ordering::SeqCst);
    if entry.active.load(Ordering::SeqCst) {
        (entry.callback)();
    } else {
        trace!(id = entry.id, "dropping notification for disposed subscription");
    }
}

/// Disposer for a registered subscription.
///
/// Dropping it does not unsubscribe; call [`Subscription::dispose`].
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    id: u64,
    disposed: AtomicBool,
}

impl Subscription {
    /// Unregister. Calling this more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
