use crate::collection::Document;
use crate::common::{get_path, FieldPath, RippleEventBus, SubscriberRef};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::persistence::{
    attribute_error, ChangeCallback, Changes, LoadResult, PersistenceAdapter, PersistenceEventInfo,
    PersistenceEventListener, PersistenceEvents,
};
use indexmap::IndexMap;
use std::sync::Arc;

const COMBINED_ADAPTER_NAME: &str = "combined";

/// Picks the document that wins when several adapters load the same id.
pub trait ConflictResolver: Send + Sync {
    /// `candidates` pairs each adapter position with the document it loaded,
    /// in adapter order. Never empty.
    fn resolve(&self, id: &str, candidates: &[(usize, Document)]) -> Document;
}

/// Last-write-wins resolution.
///
/// When a timestamp field is configured, the candidate with the greatest
/// value there wins and candidates lacking it lose. Ties, or no timestamp
/// field, fall back to the winner order: a list of adapter positions where
/// later entries beat earlier ones. Without an explicit order, later adapters
/// win.
#[derive(Debug, Clone, Default)]
pub struct LastWriteWins {
    timestamp_field: Option<FieldPath>,
    winner_order: Option<Vec<usize>>,
}

impl LastWriteWins {
    pub fn new() -> Self {
        LastWriteWins::default()
    }

    pub fn timestamp_field(mut self, field: &str) -> Self {
        self.timestamp_field = Some(FieldPath::parse(field));
        self
    }

    pub fn winner_order(mut self, order: Vec<usize>) -> Self {
        self.winner_order = Some(order);
        self
    }

    fn rank(&self, adapter: usize) -> usize {
        match &self.winner_order {
            Some(order) => order.iter().position(|p| *p == adapter).map(|p| p + 1).unwrap_or(0),
            None => adapter + 1,
        }
    }
}

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, _id: &str, candidates: &[(usize, Document)]) -> Document {
        let winner = candidates.iter().max_by(|(a_pos, a_doc), (b_pos, b_doc)| {
            let by_time = match &self.timestamp_field {
                Some(field) => get_path(a_doc, field).cmp(&get_path(b_doc, field)),
                None => std::cmp::Ordering::Equal,
            };
            by_time.then_with(|| self.rank(*a_pos).cmp(&self.rank(*b_pos)))
        });
        winner.map(|(_, doc)| doc.clone()).unwrap_or_default()
    }
}

/// Fans writes out to several adapters and merges what they load.
///
/// A failing adapter does not stop the others: its error is published as a
/// [PersistenceEvents::AdapterError] event to this adapter's own listeners,
/// and the operation only fails when every adapter failed.
///
/// ```rust
/// use std::sync::Arc;
/// use ripple::doc;
/// use ripple::persistence::{CombinedAdapter, LoadResult, MemoryAdapter, PersistenceAdapter};
///
/// let local = MemoryAdapter::with_items("local", vec![doc! { id: "1", v: "local" }]);
/// let remote = MemoryAdapter::with_items("remote", vec![doc! { id: "1", v: "remote" }]);
/// let combined = CombinedAdapter::new(vec![Arc::new(local), Arc::new(remote)]);
///
/// let LoadResult::Items(items) = combined.load().unwrap() else { panic!() };
/// assert_eq!(items, vec![doc! { id: "1", v: "remote" }]);
/// ```
pub struct CombinedAdapter {
    adapters: Vec<Arc<dyn PersistenceAdapter>>,
    resolver: Arc<dyn ConflictResolver>,
    event_bus: RippleEventBus<PersistenceEventInfo, PersistenceEventListener>,
}

impl CombinedAdapter {
    pub fn new(adapters: Vec<Arc<dyn PersistenceAdapter>>) -> Self {
        CombinedAdapter {
            adapters,
            resolver: Arc::new(LastWriteWins::new()),
            event_bus: RippleEventBus::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn PersistenceAdapter>] {
        &self.adapters
    }

    /// Subscribes to per-adapter error events.
    pub fn subscribe(&self, listener: PersistenceEventListener) -> RippleResult<SubscriberRef> {
        self.event_bus.register(PersistenceEvents::AdapterError.kind(), listener)
    }

    pub fn unsubscribe(&self, subscriber: SubscriberRef) -> RippleResult<()> {
        self.event_bus.deregister(subscriber)
    }

    /// Runs `action` on every adapter, reporting failures, and fails only
    /// when all of them failed.
    fn fan_out<T>(
        &self,
        action: &str,
        mut run: impl FnMut(&dyn PersistenceAdapter) -> RippleResult<T>,
    ) -> RippleResult<Vec<(usize, T)>> {
        let mut results = Vec::new();
        let mut last_error = None;
        for (position, adapter) in self.adapters.iter().enumerate() {
            match run(adapter.as_ref()) {
                Ok(value) => results.push((position, value)),
                Err(e) => {
                    let error = attribute_error(adapter.name(), action, e);
                    log::warn!("Adapter {} failed to {}: {}", adapter.name(), action, error);
                    let event = PersistenceEventInfo::adapter_error(adapter.name(), error.clone());
                    if let Err(e) = self.event_bus.publish(PersistenceEvents::AdapterError.kind(), event) {
                        log::warn!("Failed to publish adapter error event: {}", e);
                    }
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(cause) if results.is_empty() => {
                log::error!("Every combined adapter failed to {}", action);
                Err(RippleError::new_with_cause(
                    &format!("Every combined adapter failed to {}", action),
                    ErrorKind::AdapterError(COMBINED_ADAPTER_NAME.to_string()),
                    cause,
                ))
            }
            _ => Ok(results),
        }
    }

    fn merge_loads(&self, loads: Vec<(usize, LoadResult)>) -> LoadResult {
        let all_items = loads.iter().all(|(_, r)| matches!(r, LoadResult::Items(_)));
        let mut candidates: IndexMap<String, Vec<(usize, Document)>> = IndexMap::new();
        let mut removed: IndexMap<String, Document> = IndexMap::new();

        for (position, result) in loads {
            let (documents, deleted) = match result {
                LoadResult::Items(items) => (items, Vec::new()),
                LoadResult::Changes(changes) => {
                    let documents = changes
                        .added()
                        .into_iter()
                        .chain(changes.modified())
                        .cloned()
                        .collect();
                    (documents, changes.removed().into_iter().cloned().collect())
                }
            };
            for document in documents {
                if let Some(id) = document.id().map(|id| id.to_string()) {
                    candidates.entry(id).or_default().push((position, document));
                }
            }
            for document in deleted {
                if let Some(id) = document.id().map(|id| id.to_string()) {
                    removed.insert(id, document);
                }
            }
        }

        let winners = candidates
            .iter()
            .map(|(id, docs)| self.resolver.resolve(id, docs));
        if all_items {
            return LoadResult::Items(winners.collect());
        }

        let mut changes = Changes::new();
        for document in winners {
            changes.record_modified(document);
        }
        for (id, document) in removed {
            if !candidates.contains_key(&id) {
                changes.record_removed(document);
            }
        }
        LoadResult::Changes(changes)
    }
}

impl PersistenceAdapter for CombinedAdapter {
    fn name(&self) -> &str {
        COMBINED_ADAPTER_NAME
    }

    fn register(&self, on_change: ChangeCallback) -> RippleResult<()> {
        self.fan_out("register", |adapter| adapter.register(on_change.clone()))?;
        Ok(())
    }

    fn save(&self, items: &[Document], changes: &Changes) -> RippleResult<()> {
        self.fan_out("save", |adapter| adapter.save(items, changes))?;
        Ok(())
    }

    fn load(&self) -> RippleResult<LoadResult> {
        let loads = self.fan_out("load", |adapter| adapter.load())?;
        Ok(self.merge_loads(loads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::persistence::MemoryAdapter;
    use parking_lot::Mutex;

    fn adapters() -> (MemoryAdapter, MemoryAdapter) {
        (
            MemoryAdapter::with_items("a", vec![doc! { id: "1", v: "a", ts: 5 }, doc! { id: "2", v: "a" }]),
            MemoryAdapter::with_items("b", vec![doc! { id: "1", v: "b", ts: 3 }, doc! { id: "3", v: "b" }]),
        )
    }

    fn items(result: LoadResult) -> Vec<Document> {
        match result {
            LoadResult::Items(items) => items,
            LoadResult::Changes(_) => panic!("expected items"),
        }
    }

    #[test]
    fn later_adapter_wins_by_default() {
        let (a, b) = adapters();
        let combined = CombinedAdapter::new(vec![Arc::new(a), Arc::new(b)]);
        let loaded = items(combined.load().unwrap());
        assert_eq!(
            loaded,
            vec![
                doc! { id: "1", v: "b", ts: 3 },
                doc! { id: "2", v: "a" },
                doc! { id: "3", v: "b" },
            ]
        );
    }

    #[test]
    fn timestamp_and_winner_order() {
        let (a, b) = adapters();
        let combined = CombinedAdapter::new(vec![Arc::new(a.clone()), Arc::new(b.clone())])
            .with_resolver(Arc::new(LastWriteWins::new().timestamp_field("ts")));
        let loaded = items(combined.load().unwrap());
        assert_eq!(loaded[0], doc! { id: "1", v: "a", ts: 5 });

        let combined = CombinedAdapter::new(vec![Arc::new(a), Arc::new(b)])
            .with_resolver(Arc::new(LastWriteWins::new().winner_order(vec![1, 0])));
        let loaded = items(combined.load().unwrap());
        assert_eq!(loaded[0], doc! { id: "1", v: "a", ts: 5 });
    }

    #[test]
    fn partial_failure_reports_and_continues() {
        let (a, b) = adapters();
        a.fail_saves(true);
        let combined = CombinedAdapter::new(vec![Arc::new(a.clone()), Arc::new(b.clone())]);

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        combined
            .subscribe(PersistenceEventListener::new(move |event: PersistenceEventInfo| {
                sink.lock().push(event.adapter().to_string());
                Ok(())
            }))
            .unwrap();

        combined.save(&[doc! { id: "9" }], &Changes::new()).unwrap();
        assert_eq!(*errors.lock(), vec!["a".to_string()]);
        assert_eq!(b.snapshot(), vec![doc! { id: "9" }]);

        b.fail_saves(true);
        let err = combined.save(&[], &Changes::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AdapterError("combined".to_string()));
        assert_eq!(errors.lock().len(), 3);
    }

    #[test]
    fn change_results_merge_into_changes() {
        let (a, b) = adapters();
        let mut delta = Changes::new();
        delta.record_removed(doc! { id: "2" });
        delta.record_removed(doc! { id: "7" });
        a.queue_load(LoadResult::Changes(delta));

        let combined = CombinedAdapter::new(vec![Arc::new(a), Arc::new(b)]);
        let LoadResult::Changes(changes) = combined.load().unwrap() else {
            panic!("expected changes");
        };
        assert_eq!(changes.removed_ids(), vec!["2", "7"]);
        assert_eq!(changes.modified().len(), 2);
    }
}
