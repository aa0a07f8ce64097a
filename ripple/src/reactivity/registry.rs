use crate::collection::Document;
use crate::filter::{matches, Selector};
use crate::reactivity::Dependency;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type QueryId = u64;

/// A query observed by a reactive computation.
pub(crate) struct LiveQuery {
    id: QueryId,
    selector: Selector,
    dependency: Arc<dyn Dependency>,
    disposed: AtomicBool,
}

impl LiveQuery {
    pub(crate) fn id(&self) -> QueryId {
        self.id
    }

    pub(crate) fn depend(&self) {
        if !self.is_disposed() {
            self.dependency.depend();
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_affected_by<'a>(&self, documents: impl IntoIterator<Item = &'a Document>) -> bool {
        documents.into_iter().any(|doc| matches(doc, &self.selector))
    }
}

/// Tracks the live queries of one collection and routes writes to them.
///
/// Only weak references are kept; a query dropped by its cursor simply stops
/// being notified and is pruned on the next pass.
#[derive(Clone, Default)]
pub(crate) struct QueryRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    queries: HashMap<QueryId, Weak<LiveQuery>>,
    /// Queries kept alive without a cursor until their next notification.
    retained: HashMap<QueryId, Arc<LiveQuery>>,
    next_id: QueryId,
}

impl QueryRegistry {
    pub(crate) fn new() -> Self {
        QueryRegistry::default()
    }

    pub(crate) fn register(&self, selector: Selector, dependency: Arc<dyn Dependency>) -> Arc<LiveQuery> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let query = Arc::new(LiveQuery {
            id: inner.next_id,
            selector,
            dependency,
            disposed: AtomicBool::new(false),
        });
        inner.queries.insert(query.id, Arc::downgrade(&query));
        query
    }

    pub(crate) fn unregister(&self, id: QueryId) {
        let mut inner = self.inner.lock();
        inner.queries.remove(&id);
        inner.retained.remove(&id);
    }

    /// Keeps `query` alive after its cursor is gone, until it is notified
    /// once or disposed.
    ///
    /// Without a disposal hook nothing would ever release it, so it instead
    /// supersedes any retained query with the same selector.
    pub(crate) fn retain(&self, query: Arc<LiveQuery>, disposable: bool) {
        if query.is_disposed() {
            return;
        }
        let mut inner = self.inner.lock();
        if !disposable {
            let superseded: Vec<QueryId> = inner
                .retained
                .values()
                .filter(|retained| retained.selector == query.selector)
                .map(|retained| retained.id)
                .collect();
            for id in superseded {
                if let Some(old) = inner.retained.remove(&id) {
                    old.dispose();
                }
                inner.queries.remove(&id);
            }
        }
        inner.retained.insert(query.id, query);
    }

    #[cfg(test)]
    pub(crate) fn retained_len(&self) -> usize {
        self.inner.lock().retained.len()
    }

    /// Number of live queries still able to receive notifications.
    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .queries
            .values()
            .filter_map(Weak::upgrade)
            .filter(|query| !query.is_disposed())
            .count()
    }

    /// Returns every live query that `documents` (the old and new states of
    /// one write batch) could affect, each at most once.
    pub(crate) fn affected(&self, documents: &[Document]) -> Vec<Arc<LiveQuery>> {
        let mut inner = self.inner.lock();
        inner.retained.retain(|_, query| !query.is_disposed());
        inner.queries.retain(|_, weak| match weak.upgrade() {
            Some(query) => !query.is_disposed(),
            None => false,
        });

        let mut affected: Vec<Arc<LiveQuery>> = inner
            .queries
            .values()
            .filter_map(Weak::upgrade)
            .filter(|query| query.is_affected_by(documents))
            .collect();
        affected.sort_by_key(|query| query.id);
        for query in &affected {
            inner.retained.remove(&query.id);
        }
        affected
    }

    /// Calls `notify()` on every affected query. Must run without holding
    /// the collection lock since dependents may read the collection.
    pub(crate) fn notify(&self, documents: &[Document]) {
        let affected = self.affected(documents);
        if !affected.is_empty() {
            log::debug!("Notifying {} live queries", affected.len());
        }
        for query in affected {
            query.dependency.notify();
        }
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        for query in inner.queries.values().filter_map(Weak::upgrade) {
            query.dispose();
        }
        inner.queries.clear();
        inner.retained.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::filter::field;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingDependency {
        depends: AtomicUsize,
        notifies: AtomicUsize,
    }

    impl Dependency for CountingDependency {
        fn depend(&self) {
            self.depends.fetch_add(1, Ordering::SeqCst);
        }

        fn notify(&self) {
            self.notifies.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn notifies_affected_queries_once() {
        let registry = QueryRegistry::new();
        let open = Arc::new(CountingDependency::default());
        let closed = Arc::new(CountingDependency::default());
        let _q1 = registry.register(field("status").eq("open"), open.clone());
        let _q2 = registry.register(field("status").eq("closed"), closed.clone());

        registry.notify(&[doc! { id: "1", status: "open" }, doc! { id: "2", status: "open" }]);
        assert_eq!(open.notifies.load(Ordering::SeqCst), 1);
        assert_eq!(closed.notifies.load(Ordering::SeqCst), 0);

        // old state open, new state closed: both are affected
        registry.notify(&[doc! { id: "1", status: "open" }, doc! { id: "1", status: "closed" }]);
        assert_eq!(open.notifies.load(Ordering::SeqCst), 2);
        assert_eq!(closed.notifies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_and_disposed_queries_are_pruned() {
        let registry = QueryRegistry::new();
        let dependency = Arc::new(CountingDependency::default());
        let query = registry.register(field("a").eq(1), dependency.clone());
        let other = registry.register(field("a").eq(1), dependency.clone());
        assert_eq!(registry.len(), 2);

        drop(query);
        other.dispose();
        other.depend();
        registry.notify(&[doc! { a: 1 }]);
        assert_eq!(dependency.notifies.load(Ordering::SeqCst), 0);
        assert_eq!(dependency.depends.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn retained_query_is_released_after_one_notification() {
        let registry = QueryRegistry::new();
        let dependency = Arc::new(CountingDependency::default());
        let query = registry.register(field("a").eq(1), dependency.clone());
        registry.retain(query, true);

        registry.notify(&[doc! { a: 1 }]);
        registry.notify(&[doc! { a: 1 }]);
        assert_eq!(dependency.notifies.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn retention_without_disposal_hook_is_bounded_by_selector() {
        let registry = QueryRegistry::new();
        let first = Arc::new(CountingDependency::default());
        let query = registry.register(field("a").eq(1), first.clone());
        registry.retain(query, false);
        for _ in 0..100 {
            let query = registry.register(field("a").eq(1), Arc::new(CountingDependency::default()));
            registry.retain(query, false);
        }
        let other = registry.register(field("b").eq(1), Arc::new(CountingDependency::default()));
        registry.retain(other, false);
        assert_eq!(registry.retained_len(), 2);
        assert_eq!(registry.len(), 2);

        let latest = Arc::new(CountingDependency::default());
        let query = registry.register(field("a").eq(1), latest.clone());
        registry.retain(query, false);
        registry.notify(&[doc! { a: 1 }]);
        assert_eq!(first.notifies.load(Ordering::SeqCst), 0);
        assert_eq!(latest.notifies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retention_with_disposal_hook_keeps_every_query() {
        let registry = QueryRegistry::new();
        let dependencies: Vec<_> = (0..3).map(|_| Arc::new(CountingDependency::default())).collect();
        for dependency in &dependencies {
            let query = registry.register(field("a").eq(1), dependency.clone());
            registry.retain(query, true);
        }
        assert_eq!(registry.retained_len(), 3);
        registry.notify(&[doc! { a: 1 }]);
        assert!(dependencies.iter().all(|d| d.notifies.load(Ordering::SeqCst) == 1));
        assert_eq!(registry.retained_len(), 0);
    }

    #[test]
    fn clear_disposes_everything() {
        let registry = QueryRegistry::new();
        let query = registry.register(field("a").eq(1), Arc::new(CountingDependency::default()));
        registry.clear();
        assert!(query.is_disposed());
        assert_eq!(registry.len(), 0);
    }
}
