use crate::collection::Document;
use crate::common::{RippleEventBus, SYNC_WORKER_PREFIX};
use crate::errors::RippleResult;
use crate::persistence::{
    attribute_error, ChangeCallback, Changes, LoadResult, PersistenceAdapter, PersistenceEventInfo,
    PersistenceEventListener,
};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

/// The in-memory side the synchronizer reads from and merges into.
pub(crate) trait SyncTarget: Send + Sync {
    /// All current documents, in insertion order.
    fn snapshot(&self) -> Vec<Document>;

    /// Merges loaded remote state. Must consult
    /// [Synchronizer::pending_ids] while holding the write lock and must not
    /// record the merge as a local change.
    fn merge_loaded(&self, result: LoadResult) -> RippleResult<()>;
}

/// Drives one [PersistenceAdapter] from a background worker thread.
#[derive(Clone)]
pub(crate) struct Synchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    adapter: Arc<dyn PersistenceAdapter>,
    collection: String,
    state: Mutex<SyncState>,
    wakeup: Condvar,
    ready: AtomicBool,
    event_bus: RippleEventBus<PersistenceEventInfo, PersistenceEventListener>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct SyncState {
    pending: Changes,
    /// Set after a failed save: the pending delta waits for the next write.
    held: bool,
    load_requested: bool,
    shutdown: bool,
}

enum Job {
    Load,
    Save(Changes),
    Stop,
}

impl Synchronizer {
    pub(crate) fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        collection: &str,
        event_bus: RippleEventBus<PersistenceEventInfo, PersistenceEventListener>,
    ) -> Self {
        Synchronizer {
            inner: Arc::new(SyncInner {
                adapter,
                collection: collection.to_string(),
                state: Mutex::new(SyncState::default()),
                wakeup: Condvar::new(),
                ready: AtomicBool::new(false),
                event_bus,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Registers for external changes and starts the worker, which loads
    /// first.
    pub(crate) fn start(&self, target: Weak<dyn SyncTarget>) -> RippleResult<()> {
        let weak = Arc::downgrade(&self.inner);
        let on_change: ChangeCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                log::debug!("Adapter {} reported an external change", inner.adapter.name());
                inner.request_load();
            }
        });
        if let Err(e) = self.inner.adapter.register(on_change) {
            let error = attribute_error(self.inner.adapter.name(), "register", e);
            log::warn!("{}", error);
            self.inner.publish(PersistenceEventInfo::error(self.inner.adapter.name(), error));
        }

        self.inner.state.lock().load_requested = true;
        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-{}", SYNC_WORKER_PREFIX, self.inner.collection))
            .spawn(move || inner.run(target))?;
        *self.inner.worker.lock() = Some(handle);
        Ok(())
    }

    /// Folds a committed write batch into the pending delta and wakes the
    /// worker. Called with the collection write lock held.
    pub(crate) fn enqueue(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        state.pending.merge(changes);
        state.held = false;
        self.inner.wakeup.notify_one();
    }

    /// Ids with un-flushed local writes.
    pub(crate) fn pending_ids(&self) -> HashSet<String> {
        self.inner.state.lock().pending.ids()
    }

    pub(crate) fn request_load(&self) {
        self.inner.request_load();
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Stops the worker after it drained pending work, giving a held delta
    /// one final attempt.
    pub(crate) fn close(&self) {
        self.signal_shutdown();
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Synchronizer worker of {} panicked", self.inner.collection);
            }
        }
    }

    /// Asks the worker to stop without waiting for it.
    pub(crate) fn signal_shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        state.held = false;
        self.inner.wakeup.notify_one();
    }
}

impl SyncInner {
    fn request_load(&self) {
        let mut state = self.state.lock();
        state.load_requested = true;
        self.wakeup.notify_one();
    }

    fn publish(&self, event: PersistenceEventInfo) {
        let kind = event.event_type().kind();
        if let Err(e) = self.event_bus.publish(kind, event) {
            log::warn!("Failed to publish {} event: {}", kind, e);
        }
    }

    fn next_job(&self) -> Job {
        let mut state = self.state.lock();
        loop {
            if state.load_requested {
                state.load_requested = false;
                return Job::Load;
            }
            if !state.pending.is_empty() && !state.held {
                return Job::Save(state.pending.take());
            }
            if state.shutdown {
                return Job::Stop;
            }
            self.wakeup.wait(&mut state);
        }
    }

    fn run(&self, target: Weak<dyn SyncTarget>) {
        log::debug!("Synchronizer worker of {} started", self.collection);
        loop {
            let job = self.next_job();
            let Some(target) = target.upgrade() else {
                log::debug!("Collection {} dropped, stopping synchronizer", self.collection);
                break;
            };
            match job {
                Job::Load => self.load(target.as_ref()),
                Job::Save(changes) => self.save(target.as_ref(), changes),
                Job::Stop => break,
            }
        }
        log::debug!("Synchronizer worker of {} stopped", self.collection);
    }

    fn load(&self, target: &dyn SyncTarget) {
        let name = self.adapter.name();
        let merged = self
            .adapter
            .load()
            .map_err(|e| attribute_error(name, "load", e))
            .and_then(|result| target.merge_loaded(result));
        match merged {
            Ok(_) => log::debug!("Loaded {} from adapter {}", self.collection, name),
            Err(e) => {
                log::warn!("Loading {} from adapter {} failed: {}", self.collection, name, e);
                self.publish(PersistenceEventInfo::error(name, e));
            }
        }

        if !self.ready.swap(true, Ordering::AcqRel) {
            self.publish(PersistenceEventInfo::init(name));
        }
    }

    fn save(&self, target: &dyn SyncTarget, changes: Changes) {
        let name = self.adapter.name();
        let items = target.snapshot();
        match self.adapter.save(&items, &changes) {
            Ok(_) => {
                log::debug!("Saved {} changes of {} to adapter {}", changes.len(), self.collection, name);
                self.publish(PersistenceEventInfo::transmitted(name, changes));
            }
            Err(e) => {
                let error = attribute_error(name, "save", e);
                log::warn!("Saving {} to adapter {} failed: {}", self.collection, name, error);
                {
                    let mut state = self.state.lock();
                    let newer = state.pending.take();
                    let mut retry = changes;
                    state.held = newer.is_empty();
                    retry.merge(newer);
                    state.pending = retry;
                }
                self.publish(PersistenceEventInfo::error(name, error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::persistence::MemoryAdapter;
    use parking_lot::RwLock;
    use std::time::Duration;
    use test_retry::retry;

    #[derive(Default)]
    struct Target {
        documents: RwLock<Vec<Document>>,
        merged: Mutex<Vec<LoadResult>>,
    }

    impl SyncTarget for Target {
        fn snapshot(&self) -> Vec<Document> {
            self.documents.read().clone()
        }

        fn merge_loaded(&self, result: LoadResult) -> RippleResult<()> {
            self.merged.lock().push(result);
            Ok(())
        }
    }

    fn wait_until(condition: impl Fn() -> bool) {
        awaitility::at_most(Duration::from_secs(5)).until(condition);
    }

    fn start(adapter: &MemoryAdapter) -> (Synchronizer, Arc<Target>) {
        let target = Arc::new(Target::default());
        let synchronizer = Synchronizer::new(Arc::new(adapter.clone()), "test", RippleEventBus::new());
        let weak: Weak<dyn SyncTarget> = Arc::downgrade(&(target.clone() as Arc<dyn SyncTarget>));
        synchronizer.start(weak).unwrap();
        (synchronizer, target)
    }

    fn added(id: &str) -> Changes {
        let mut changes = Changes::new();
        changes.record_added(doc! { id: id });
        changes
    }

    #[test]
    fn loads_on_start_and_becomes_ready() {
        let adapter = MemoryAdapter::with_items("m", vec![doc! { id: "1" }]);
        let (synchronizer, target) = start(&adapter);
        wait_until(|| synchronizer.is_ready());
        assert_eq!(*target.merged.lock(), vec![LoadResult::Items(vec![doc! { id: "1" }])]);
        synchronizer.close();
    }

    #[test]
    fn saves_pending_changes() {
        let adapter = MemoryAdapter::new("m");
        let (synchronizer, target) = start(&adapter);
        *target.documents.write() = vec![doc! { id: "a" }];
        synchronizer.enqueue(added("a"));
        wait_until(|| adapter.save_count() == 1);
        assert_eq!(adapter.snapshot(), vec![doc! { id: "a" }]);
        assert!(synchronizer.pending_ids().is_empty());
        synchronizer.close();
    }

    #[test]
    #[retry]
    fn failed_save_waits_for_next_write() {
        let adapter = MemoryAdapter::new("m");
        adapter.fail_saves(true);
        let (synchronizer, _target) = start(&adapter);
        synchronizer.enqueue(added("a"));
        wait_until(|| synchronizer.pending_ids().contains("a") && synchronizer.inner.state.lock().held);

        adapter.fail_saves(false);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(adapter.save_count(), 0);

        synchronizer.enqueue(added("b"));
        wait_until(|| adapter.save_count() == 1);
        assert_eq!(adapter.saved_changes()[0].len(), 2);
        synchronizer.close();
    }

    #[test]
    fn close_flushes_held_delta() {
        let adapter = MemoryAdapter::new("m");
        adapter.fail_saves(true);
        let (synchronizer, _target) = start(&adapter);
        synchronizer.enqueue(added("a"));
        wait_until(|| synchronizer.inner.state.lock().held);

        adapter.fail_saves(false);
        synchronizer.close();
        assert_eq!(adapter.save_count(), 1);
    }
}
