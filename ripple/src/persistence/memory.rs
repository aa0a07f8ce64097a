use crate::collection::Document;
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::persistence::{ChangeCallback, Changes, LoadResult, PersistenceAdapter};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Persistence adapter keeping the last saved snapshot in memory.
///
/// Besides being a working adapter it lets tests simulate failures, slow
/// saves and external changes.
///
/// ```rust
/// use ripple::doc;
/// use ripple::persistence::{Changes, LoadResult, MemoryAdapter, PersistenceAdapter};
///
/// let adapter = MemoryAdapter::new("memory");
/// adapter.save(&[doc! { id: "1" }], &Changes::new()).unwrap();
/// assert_eq!(adapter.load().unwrap(), LoadResult::Items(vec![doc! { id: "1" }]));
/// ```
#[derive(Clone)]
pub struct MemoryAdapter {
    inner: Arc<MemoryAdapterInner>,
}

struct MemoryAdapterInner {
    name: String,
    snapshot: RwLock<Vec<Document>>,
    saved: Mutex<Vec<Changes>>,
    queued_loads: Mutex<VecDeque<LoadResult>>,
    callbacks: RwLock<Vec<ChangeCallback>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    load_count: AtomicUsize,
    save_delay: RwLock<Option<Duration>>,
}

impl MemoryAdapter {
    pub fn new(name: &str) -> Self {
        Self::with_items(name, Vec::new())
    }

    /// Creates an adapter whose backend already holds `items`.
    pub fn with_items(name: &str, items: Vec<Document>) -> Self {
        MemoryAdapter {
            inner: Arc::new(MemoryAdapterInner {
                name: name.to_string(),
                snapshot: RwLock::new(items),
                saved: Mutex::new(Vec::new()),
                queued_loads: Mutex::new(VecDeque::new()),
                callbacks: RwLock::new(Vec::new()),
                fail_saves: AtomicBool::new(false),
                fail_loads: AtomicBool::new(false),
                load_count: AtomicUsize::new(0),
                save_delay: RwLock::new(None),
            }),
        }
    }

    /// The last saved state.
    pub fn snapshot(&self) -> Vec<Document> {
        self.inner.snapshot.read().clone()
    }

    /// Replaces the backend state without notifying, as another writer would.
    pub fn set_snapshot(&self, items: Vec<Document>) {
        *self.inner.snapshot.write() = items;
    }

    /// Every delta passed to a successful `save`, oldest first.
    pub fn saved_changes(&self) -> Vec<Changes> {
        self.inner.saved.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.inner.saved.lock().len()
    }

    pub fn load_count(&self) -> usize {
        self.inner.load_count.load(Ordering::SeqCst)
    }

    /// Makes the next `load` return `result` instead of the snapshot.
    pub fn queue_load(&self, result: LoadResult) {
        self.inner.queued_loads.lock().push_back(result);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.inner.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Makes every `save` block for `delay` before storing.
    pub fn set_save_delay(&self, delay: Option<Duration>) {
        *self.inner.save_delay.write() = delay;
    }

    /// Invokes every registered change callback.
    pub fn trigger_change(&self) {
        let callbacks = self.inner.callbacks.read().clone();
        for callback in callbacks {
            callback();
        }
    }

    fn failure(&self, action: &str) -> RippleError {
        log::error!("Memory adapter {} simulated {} failure", self.inner.name, action);
        RippleError::new(
            &format!("Simulated {} failure in adapter {}", action, self.inner.name),
            ErrorKind::AdapterError(self.inner.name.clone()),
        )
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn register(&self, on_change: ChangeCallback) -> RippleResult<()> {
        self.inner.callbacks.write().push(on_change);
        Ok(())
    }

    fn save(&self, items: &[Document], changes: &Changes) -> RippleResult<()> {
        let delay = *self.inner.save_delay.read();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(self.failure("save"));
        }

        *self.inner.snapshot.write() = items.to_vec();
        self.inner.saved.lock().push(changes.clone());
        log::debug!("Memory adapter {} saved {} documents", self.inner.name, items.len());
        Ok(())
    }

    fn load(&self) -> RippleResult<LoadResult> {
        self.inner.load_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_loads.load(Ordering::SeqCst) {
            return Err(self.failure("load"));
        }
        if let Some(queued) = self.inner.queued_loads.lock().pop_front() {
            return Ok(queued);
        }
        Ok(LoadResult::Items(self.snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn save_then_load_round_trips() {
        let adapter = MemoryAdapter::new("m");
        let mut changes = Changes::new();
        changes.record_added(doc! { id: "1" });
        adapter.save(&[doc! { id: "1" }], &changes).unwrap();

        assert_eq!(adapter.save_count(), 1);
        assert_eq!(adapter.saved_changes(), vec![changes]);
        assert_eq!(adapter.load().unwrap(), LoadResult::Items(vec![doc! { id: "1" }]));
        assert_eq!(adapter.load_count(), 1);
    }

    #[test]
    fn simulated_failures() {
        let adapter = MemoryAdapter::new("m");
        adapter.fail_saves(true);
        adapter.fail_loads(true);
        let err = adapter.save(&[], &Changes::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AdapterError("m".to_string()));
        assert!(adapter.load().is_err());
        assert_eq!(adapter.save_count(), 0);
    }

    #[test]
    fn queued_load_is_returned_once() {
        let adapter = MemoryAdapter::with_items("m", vec![doc! { id: "s" }]);
        let mut changes = Changes::new();
        changes.record_removed(doc! { id: "x" });
        adapter.queue_load(LoadResult::Changes(changes.clone()));

        assert_eq!(adapter.load().unwrap(), LoadResult::Changes(changes));
        assert_eq!(adapter.load().unwrap(), LoadResult::Items(vec![doc! { id: "s" }]));
    }

    #[test]
    fn trigger_change_calls_callbacks() {
        let adapter = MemoryAdapter::new("m");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        adapter
            .register(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        adapter.trigger_change();
        adapter.trigger_change();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
