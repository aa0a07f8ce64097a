use crate::collection::{Collection, Document, FindOptions};
use crate::errors::RippleResult;
use crate::filter::Selector;
use crate::reactivity::LiveQuery;
use parking_lot::Mutex;
use std::sync::Arc;

/// Lifecycle of a [Cursor].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Not read inside a reactive scope yet.
    Created,
    /// Holds a dependency and is notified on relevant writes.
    Observing,
    /// No longer notified.
    Disposed,
}

/// A lazy, possibly reactive query over a [Collection].
///
/// Nothing is evaluated until [fetch](Cursor::fetch) or
/// [count](Cursor::count). When the collection has a reactivity adapter and
/// the read happens inside a reactive scope, the first read acquires a
/// dependency and every read calls `depend()` on it. The cursor stops being
/// notified when the adapter's disposal callback fires, on
/// [dispose](Cursor::dispose), or when it is dropped.
pub struct Cursor {
    collection: Collection,
    selector: Selector,
    options: FindOptions,
    tracking: Mutex<Tracking>,
}

struct Tracking {
    state: CursorState,
    query: Option<Arc<LiveQuery>>,
    /// Whether the adapter will call back when the computation is torn down.
    disposable: bool,
}

impl Cursor {
    pub(crate) fn new(collection: Collection, selector: Selector, options: FindOptions) -> Self {
        Cursor {
            collection,
            selector,
            options,
            tracking: Mutex::new(Tracking {
                state: CursorState::Created,
                query: None,
                disposable: false,
            }),
        }
    }

    /// Evaluates the query and returns the resulting documents.
    pub fn fetch(&self) -> RippleResult<Vec<Document>> {
        self.track();
        self.collection.query(&self.selector, &self.options)
    }

    /// Number of documents [fetch](Cursor::fetch) would return.
    pub fn count(&self) -> RippleResult<usize> {
        self.track();
        self.collection.count(&self.selector, &self.options)
    }

    pub fn state(&self) -> CursorState {
        let mut tracking = self.tracking.lock();
        if let Some(query) = &tracking.query {
            if query.is_disposed() {
                tracking.state = CursorState::Disposed;
            }
        }
        tracking.state
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn options(&self) -> &FindOptions {
        &self.options
    }

    /// Stops notifications. Reads keep working but are no longer tracked.
    pub fn dispose(&self) {
        let query = {
            let mut tracking = self.tracking.lock();
            tracking.state = CursorState::Disposed;
            tracking.query.take()
        };
        if let Some(query) = query {
            query.dispose();
            self.collection.registry().unregister(query.id());
        }
    }

    /// Hands the live query over to the registry, which keeps it until its
    /// next notification or disposal.
    pub(crate) fn detach(self) {
        let (query, disposable) = {
            let mut tracking = self.tracking.lock();
            (tracking.query.take(), tracking.disposable)
        };
        if let Some(query) = query {
            self.collection.registry().retain(query, disposable);
        }
    }

    fn track(&self) {
        let Some(adapter) = self.collection.config().reactivity() else {
            return;
        };
        if !adapter.is_in_scope() {
            return;
        }

        let query = {
            let mut tracking = self.tracking.lock();
            if tracking.state == CursorState::Disposed {
                return;
            }
            match tracking.query.clone() {
                Some(query) if query.is_disposed() => {
                    tracking.state = CursorState::Disposed;
                    return;
                }
                Some(query) => query,
                None => {
                    let registry = self.collection.registry();
                    let query = registry.register(self.selector.clone(), adapter.create());
                    let weak = Arc::downgrade(&query);
                    tracking.disposable = adapter.on_dispose(Box::new(move || {
                        if let Some(query) = weak.upgrade() {
                            query.dispose();
                            registry.unregister(query.id());
                        }
                    }));
                    tracking.query = Some(query.clone());
                    tracking.state = CursorState::Observing;
                    query
                }
            }
        };
        query.depend();
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionBuilder;
    use crate::doc;
    use crate::filter::field;
    use crate::reactivity::{Dependency, ReactivityAdapter};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        depends: AtomicUsize,
        notifies: AtomicUsize,
    }

    impl Dependency for Counter {
        fn depend(&self) {
            self.depends.fetch_add(1, Ordering::SeqCst);
        }

        fn notify(&self) {
            self.notifies.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Runtime {
        counter: Arc<Counter>,
        in_scope: AtomicBool,
        disposers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl ReactivityAdapter for Runtime {
        fn create(&self) -> Arc<dyn Dependency> {
            self.counter.clone()
        }

        fn is_in_scope(&self) -> bool {
            self.in_scope.load(Ordering::SeqCst)
        }

        fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) -> bool {
            self.disposers.lock().push(callback);
            true
        }
    }

    impl Runtime {
        fn tear_down(&self) {
            let disposers: Vec<_> = self.disposers.lock().drain(..).collect();
            for dispose in disposers {
                dispose();
            }
        }
    }

    fn collection(runtime: Arc<Runtime>) -> Collection {
        CollectionBuilder::new().reactivity(runtime).open().unwrap()
    }

    #[test]
    fn state_machine() {
        let runtime = Arc::new(Runtime::default());
        let todos = collection(runtime.clone());
        let cursor = todos.find(field("done").eq(false)).unwrap();
        assert_eq!(cursor.state(), CursorState::Created);

        cursor.fetch().unwrap();
        assert_eq!(cursor.state(), CursorState::Created);

        runtime.in_scope.store(true, Ordering::SeqCst);
        cursor.fetch().unwrap();
        cursor.count().unwrap();
        assert_eq!(cursor.state(), CursorState::Observing);
        assert_eq!(runtime.counter.depends.load(Ordering::SeqCst), 2);

        runtime.tear_down();
        assert_eq!(cursor.state(), CursorState::Disposed);
        todos.insert(doc! { done: false }).unwrap();
        assert_eq!(runtime.counter.notifies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispose_and_drop_stop_notifications() {
        let runtime = Arc::new(Runtime::default());
        runtime.in_scope.store(true, Ordering::SeqCst);
        let todos = collection(runtime.clone());

        let cursor = todos.find(field("n").gt(0)).unwrap();
        cursor.fetch().unwrap();
        todos.insert(doc! { n: 1 }).unwrap();
        assert_eq!(runtime.counter.notifies.load(Ordering::SeqCst), 1);

        cursor.dispose();
        assert_eq!(cursor.state(), CursorState::Disposed);
        todos.insert(doc! { n: 2 }).unwrap();
        assert_eq!(runtime.counter.notifies.load(Ordering::SeqCst), 1);

        let cursor = todos.find(field("n").gt(0)).unwrap();
        cursor.count().unwrap();
        drop(cursor);
        todos.insert(doc! { n: 3 }).unwrap();
        assert_eq!(runtime.counter.notifies.load(Ordering::SeqCst), 1);
        assert_eq!(todos.registry().len(), 0);
    }
}
