use crate::collection::{
    CollectionConfig, CollectionEventInfo, CollectionEventListener, CollectionEvents, Cursor, Document, FindOptions,
    UpdateOptions,
};
use crate::common::{RippleEventBus, SubscriberRef, Value, DOC_ID};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::filter::{matches, positional_index, Selector};
use crate::index::IndexSet;
use crate::modifier::{apply_modifier, Modifier};
use crate::persistence::{
    Changes, LoadResult, PersistenceEventInfo, PersistenceEventListener, PersistenceEvents, SyncTarget, Synchronizer,
};
use crate::reactivity::QueryRegistry;
use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// An in-memory collection of schemaless documents.
///
/// Reads and writes are synchronous. Documents and indexes sit behind one
/// lock, so observers never see a half-applied write. After a write commits,
/// collection events are published and then the affected live queries are
/// notified, each at most once per write.
///
/// Cloning is cheap; clones share the same collection.
///
/// ```rust
/// use ripple::collection::CollectionBuilder;
/// use ripple::doc;
/// use ripple::filter::field;
/// use ripple::modifier::Modifier;
///
/// let todos = CollectionBuilder::new().name("todos").index("status").open().unwrap();
/// let id = todos.insert(doc! { title: "write docs", status: "open" }).unwrap();
///
/// todos.update(&field("status").eq("open"), &Modifier::new().set("status", "done")).unwrap();
///
/// let done = todos.find(field("status").eq("done")).unwrap().fetch().unwrap();
/// assert_eq!(done[0].id(), Some(id.as_str()));
/// ```
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

pub(crate) struct CollectionInner {
    config: CollectionConfig,
    name: String,
    state: RwLock<CollectionState>,
    event_bus: RippleEventBus<CollectionEventInfo, CollectionEventListener>,
    persistence_bus: RippleEventBus<PersistenceEventInfo, PersistenceEventListener>,
    registry: QueryRegistry,
    synchronizer: Option<Synchronizer>,
    closed: AtomicBool,
}

#[derive(Default)]
struct CollectionState {
    documents: IndexMap<String, Document>,
    indexes: IndexSet,
}

/// One document-level change of a write batch.
enum Write {
    Insert(Document),
    Replace(Document, Document),
    Delete(Document),
}

impl Collection {
    pub(crate) fn open(config: CollectionConfig) -> RippleResult<Collection> {
        config.freeze();
        let name = config.name();

        let mut indexes = IndexSet::new();
        for field in config.index_fields() {
            indexes.create(&field, std::iter::empty())?;
        }

        let persistence_bus = RippleEventBus::new();
        let synchronizer = config
            .persistence()
            .map(|adapter| Synchronizer::new(adapter, &name, persistence_bus.clone()));

        let inner = Arc::new(CollectionInner {
            config,
            name,
            state: RwLock::new(CollectionState {
                documents: IndexMap::new(),
                indexes,
            }),
            event_bus: RippleEventBus::new(),
            persistence_bus,
            registry: QueryRegistry::new(),
            synchronizer,
            closed: AtomicBool::new(false),
        });

        if let Some(synchronizer) = &inner.synchronizer {
            let target: Weak<CollectionInner> = Arc::downgrade(&inner);
            let target: Weak<dyn SyncTarget> = target;
            synchronizer.start(target)?;
        }
        log::debug!("Opened collection {}", inner.name);
        Ok(Collection { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.inner.config
    }

    pub(crate) fn registry(&self) -> QueryRegistry {
        self.inner.registry.clone()
    }

    /// Inserts `document`, assigning a UUID v4 id when it has none, and
    /// returns the id.
    pub fn insert(&self, document: Document) -> RippleResult<String> {
        let ids = self.insert_many(vec![document])?;
        ids.into_iter().next().ok_or_else(|| {
            log::error!("Insert produced no id");
            RippleError::new("Insert produced no id", ErrorKind::InternalError)
        })
    }

    /// Inserts every document or none. Fails with `DuplicateId` if an id is
    /// already present or repeats within the batch.
    pub fn insert_many(&self, documents: Vec<Document>) -> RippleResult<Vec<String>> {
        self.inner.write(|state| {
            let mut batch_ids = HashSet::new();
            let mut writes = Vec::with_capacity(documents.len());
            let mut ids = Vec::with_capacity(documents.len());

            for document in documents {
                let document = prepare_insert(document)?;
                let id = document.id().unwrap_or_default().to_string();
                if state.documents.contains_key(&id) || !batch_ids.insert(id.clone()) {
                    log::error!("Document with id {} already exists", id);
                    return Err(RippleError::new(
                        &format!("Document with id '{}' already exists", id),
                        ErrorKind::DuplicateId,
                    ));
                }
                writes.push(Write::Insert(document));
                ids.push(id);
            }
            Ok((writes, ids))
        })
    }

    /// Applies `modifier` to every matching document and returns the number
    /// of matches.
    pub fn update(&self, selector: &Selector, modifier: &Modifier) -> RippleResult<usize> {
        self.update_with_options(selector, modifier, UpdateOptions::default())
    }

    /// Applies `modifier` to the first match in insertion order.
    pub fn update_one(&self, selector: &Selector, modifier: &Modifier) -> RippleResult<usize> {
        self.update_with_options(selector, modifier, UpdateOptions::new(false, true))
    }

    pub fn update_with_options(
        &self,
        selector: &Selector,
        modifier: &Modifier,
        options: UpdateOptions,
    ) -> RippleResult<usize> {
        self.check_selector(selector)?;
        self.inner.write(|state| {
            let mut targets = state.resolve(selector);
            if options.is_just_once() {
                targets.truncate(1);
            }

            if targets.is_empty() {
                if !options.is_insert_if_absent() {
                    return Ok((Vec::new(), 0));
                }
                let seed = selector.literal_equalities()?;
                let document = prepare_insert(apply_modifier(&seed, modifier, None)?)?;
                let id = document.id().unwrap_or_default();
                if state.documents.contains_key(id) {
                    log::error!("Upserted document id {} already exists", id);
                    return Err(RippleError::new(
                        &format!("Document with id '{}' already exists", id),
                        ErrorKind::DuplicateId,
                    ));
                }
                return Ok((vec![Write::Insert(document)], 1));
            }

            let mut writes = Vec::new();
            for document in &targets {
                let position = positional_index(document, selector);
                let updated = apply_modifier(document, modifier, position)?;
                if &updated != *document {
                    writes.push(Write::Replace((*document).clone(), updated));
                }
            }
            Ok((writes, targets.len()))
        })
    }

    /// Removes every matching document and returns how many were removed.
    pub fn remove(&self, selector: &Selector) -> RippleResult<usize> {
        self.remove_matching(selector, false)
    }

    /// Removes the first match in insertion order.
    pub fn remove_one(&self, selector: &Selector) -> RippleResult<usize> {
        self.remove_matching(selector, true)
    }

    fn remove_matching(&self, selector: &Selector, just_once: bool) -> RippleResult<usize> {
        self.check_selector(selector)?;
        self.inner.write(|state| {
            let mut targets = state.resolve(selector);
            if just_once {
                targets.truncate(1);
            }
            let writes: Vec<Write> = targets.into_iter().map(|d| Write::Delete(d.clone())).collect();
            let count = writes.len();
            Ok((writes, count))
        })
    }

    /// Creates a lazy cursor over the documents matching `selector`.
    pub fn find(&self, selector: Selector) -> RippleResult<Cursor> {
        self.find_with_options(selector, FindOptions::new())
    }

    pub fn find_with_options(&self, selector: Selector, options: FindOptions) -> RippleResult<Cursor> {
        self.inner.check_open()?;
        self.check_selector(&selector)?;
        Ok(Cursor::new(self.clone(), selector, options))
    }

    /// Returns the first match. Inside a reactive scope the read is tracked
    /// until the next relevant write.
    pub fn find_one(&self, selector: Selector) -> RippleResult<Option<Document>> {
        let cursor = self.find_with_options(selector, FindOptions::new().limit(1))?;
        let first = cursor.fetch()?.into_iter().next();
        cursor.detach();
        Ok(first)
    }

    /// Looks up a document by id without tracking.
    pub fn get_by_id(&self, id: &str) -> RippleResult<Option<Document>> {
        self.inner.check_open()?;
        Ok(self.inner.state.read().documents.get(id).cloned())
    }

    pub fn size(&self) -> RippleResult<usize> {
        self.inner.check_open()?;
        Ok(self.inner.state.read().documents.len())
    }

    pub(crate) fn query(&self, selector: &Selector, options: &FindOptions) -> RippleResult<Vec<Document>> {
        self.inner.check_open()?;
        let documents: Vec<Document> = {
            let state = self.inner.state.read();
            state.resolve(selector).into_iter().cloned().collect()
        };
        Ok(options.apply(documents))
    }

    pub(crate) fn count(&self, selector: &Selector, options: &FindOptions) -> RippleResult<usize> {
        self.inner.check_open()?;
        let matched = self.inner.state.read().resolve(selector).len();
        let skipped = matched.saturating_sub(options.skip.unwrap_or(0));
        Ok(options.limit.map_or(skipped, |limit| skipped.min(limit)))
    }

    pub fn create_index(&self, field: &str) -> RippleResult<()> {
        self.inner.check_open()?;
        let mut state = self.inner.state.write();
        let CollectionState { documents, indexes } = &mut *state;
        indexes.create(field, documents.values())
    }

    pub fn drop_index(&self, field: &str) -> RippleResult<()> {
        self.inner.check_open()?;
        self.inner.state.write().indexes.drop_index(field)
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.inner.state.read().indexes.has_index(field)
    }

    /// Indexed fields in creation order.
    pub fn list_indexes(&self) -> Vec<String> {
        self.inner.state.read().indexes.fields()
    }

    pub fn rebuild_indexes(&self) -> RippleResult<()> {
        self.inner.check_open()?;
        let mut state = self.inner.state.write();
        let CollectionState { documents, indexes } = &mut *state;
        indexes.rebuild(documents.values());
        log::debug!("Rebuilt indexes of {}", self.inner.name);
        Ok(())
    }

    /// Subscribes `listener` to one kind of collection event.
    pub fn subscribe(&self, event: CollectionEvents, listener: CollectionEventListener) -> RippleResult<SubscriberRef> {
        self.inner.check_open()?;
        self.inner.event_bus.register(event.kind(), listener)
    }

    pub fn unsubscribe(&self, subscriber: SubscriberRef) -> RippleResult<()> {
        self.inner.event_bus.deregister(subscriber)
    }

    /// Subscribes `listener` to one kind of persistence event.
    pub fn subscribe_persistence(
        &self,
        event: PersistenceEvents,
        listener: PersistenceEventListener,
    ) -> RippleResult<SubscriberRef> {
        self.inner.check_open()?;
        self.inner.persistence_bus.register(event.kind(), listener)
    }

    pub fn unsubscribe_persistence(&self, subscriber: SubscriberRef) -> RippleResult<()> {
        self.inner.persistence_bus.deregister(subscriber)
    }

    /// True once the first load from the persistence adapter finished, or
    /// always when there is no adapter.
    pub fn is_ready(&self) -> bool {
        self.inner
            .synchronizer
            .as_ref()
            .map_or(true, |synchronizer| synchronizer.is_ready())
    }

    /// Schedules a load from the persistence adapter.
    pub fn reload(&self) -> RippleResult<()> {
        self.inner.check_open()?;
        if let Some(synchronizer) = &self.inner.synchronizer {
            synchronizer.request_load();
        }
        Ok(())
    }

    /// Ids with local writes not yet saved by the persistence adapter.
    pub fn pending_ids(&self) -> HashSet<String> {
        self.inner
            .synchronizer
            .as_ref()
            .map(|synchronizer| synchronizer.pending_ids())
            .unwrap_or_default()
    }

    /// Rejects further operations, waits for pending persistence work,
    /// disposes live queries and drops every listener.
    pub fn close(&self) -> RippleResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(synchronizer) = &self.inner.synchronizer {
            synchronizer.close();
        }
        self.inner.registry.clear();
        self.inner.event_bus.close()?;
        self.inner.persistence_bus.close()?;
        log::debug!("Closed collection {}", self.inner.name);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn check_selector(&self, selector: &Selector) -> RippleResult<()> {
        if self.inner.config.strict_selectors() && selector.has_unknown_operators() {
            log::error!("Selector uses unsupported operators: {:?}", selector);
            return Err(RippleError::new(
                "Selector uses unsupported operators",
                ErrorKind::SelectorError,
            ));
        }
        Ok(())
    }
}

/// Assigns an id when missing and validates it.
fn prepare_insert(mut document: Document) -> RippleResult<Document> {
    if !document.has_id() {
        document.insert(DOC_ID, Value::String(Uuid::new_v4().to_string()));
    }
    document.validate_id()?;
    if document.id().map_or(true, str::is_empty) {
        log::error!("Document id cannot be empty");
        return Err(RippleError::new("Document id cannot be empty", ErrorKind::InvalidId));
    }
    Ok(document)
}

impl CollectionState {
    /// Documents matching `selector`, in insertion order. Uses the indexes
    /// when they resolve the selector and scans otherwise.
    fn resolve(&self, selector: &Selector) -> Vec<&Document> {
        if let Some(id) = selector.id_lookup() {
            return self.documents.get(id).into_iter().collect();
        }

        let result = self.indexes.query(selector);
        if !result.matched {
            return self.documents.values().filter(|doc| matches(doc, selector)).collect();
        }

        result
            .ids
            .iter()
            .filter_map(|id| self.documents.get_full(id.as_str()))
            .filter(|(_, _, doc)| !result.keep_selector || matches(doc, selector))
            .sorted_by_key(|(position, _, _)| *position)
            .map(|(_, _, doc)| doc)
            .collect()
    }

    fn upsert(&self, document: Document, writes: &mut Vec<Write>) {
        let Some(id) = document.id() else {
            return;
        };
        match self.documents.get(id) {
            Some(existing) if existing == &document => {}
            Some(existing) => writes.push(Write::Replace(existing.clone(), document)),
            None => writes.push(Write::Insert(document)),
        }
    }
}

impl CollectionInner {
    fn check_open(&self) -> RippleResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Collection {} is closed", self.name);
            return Err(RippleError::new(
                &format!("Collection '{}' is closed", self.name),
                ErrorKind::CollectionClosed,
            ));
        }
        Ok(())
    }

    /// Runs one write: `prepare` computes every change under the write lock
    /// without mutating anything, then the changes are committed, events
    /// published and live queries notified.
    fn write<T>(
        &self,
        prepare: impl FnOnce(&CollectionState) -> RippleResult<(Vec<Write>, T)>,
    ) -> RippleResult<T> {
        self.check_open()?;
        let (writes, output) = {
            let mut state = self.state.write();
            let (writes, output) = prepare(&state)?;
            self.commit(&mut state, &writes, true);
            (writes, output)
        };
        self.after_commit(&writes);
        Ok(output)
    }

    fn commit(&self, state: &mut CollectionState, writes: &[Write], record: bool) {
        if writes.is_empty() {
            return;
        }

        let mut changes = Changes::new();
        let mut inserted = Vec::new();
        let mut replaced = Vec::new();
        let mut deleted = Vec::new();
        for write in writes {
            match write {
                Write::Insert(document) => {
                    let id = document.id().unwrap_or_default().to_string();
                    state.documents.insert(id, document.clone());
                    changes.record_added(document.clone());
                    inserted.push(document.clone());
                }
                Write::Replace(old, new) => {
                    let id = new.id().unwrap_or_default().to_string();
                    state.documents.insert(id, new.clone());
                    changes.record_modified(new.clone());
                    replaced.push((old.clone(), new.clone()));
                }
                Write::Delete(document) => {
                    if let Some(id) = document.id() {
                        state.documents.shift_remove(id);
                    }
                    changes.record_removed(document.clone());
                    deleted.push(document.clone());
                }
            }
        }

        state.indexes.insert(&inserted);
        state.indexes.update(&replaced);
        state.indexes.remove(&deleted);

        if record {
            if let Some(synchronizer) = &self.synchronizer {
                synchronizer.enqueue(changes);
            }
        }
    }

    /// Publishes events, then notifies live queries. Runs without the lock.
    fn after_commit(&self, writes: &[Write]) {
        if writes.is_empty() {
            return;
        }

        let mut touched = Vec::with_capacity(writes.len());
        for write in writes {
            let (event, document, previous) = match write {
                Write::Insert(doc) => (CollectionEvents::Added, doc, None),
                Write::Replace(old, new) => (CollectionEvents::Changed, new, Some(old)),
                Write::Delete(doc) => (CollectionEvents::Removed, doc, None),
            };
            if self.event_bus.has_listeners(event.kind()) {
                let info = CollectionEventInfo::new(event, document.clone(), previous.cloned(), &self.name);
                if let Err(e) = self.event_bus.publish(event.kind(), info) {
                    log::warn!("Failed to publish {} event of {}: {}", event.kind(), self.name, e);
                }
            }
            touched.push(document.clone());
            if let Some(previous) = previous {
                touched.push(previous.clone());
            }
        }
        self.registry.notify(&touched);
    }
}

impl SyncTarget for CollectionInner {
    fn snapshot(&self) -> Vec<Document> {
        self.state.read().documents.values().cloned().collect()
    }

    fn merge_loaded(&self, result: LoadResult) -> RippleResult<()> {
        let writes = {
            let mut state = self.state.write();
            let pending = self
                .synchronizer
                .as_ref()
                .map(|synchronizer| synchronizer.pending_ids())
                .unwrap_or_default();
            let mut writes = Vec::new();

            match result {
                LoadResult::Items(items) => {
                    let mut loaded = HashSet::new();
                    for document in items {
                        let Some(id) = loaded_id(&document) else {
                            continue;
                        };
                        if !loaded.insert(id.clone()) || pending.contains(&id) {
                            continue;
                        }
                        state.upsert(document, &mut writes);
                    }
                    for (id, document) in state.documents.iter() {
                        if !loaded.contains(id) && !pending.contains(id) {
                            writes.push(Write::Delete(document.clone()));
                        }
                    }
                }
                LoadResult::Changes(changes) => {
                    for document in changes.added().into_iter().chain(changes.modified()) {
                        match loaded_id(document) {
                            Some(id) if !pending.contains(&id) => state.upsert(document.clone(), &mut writes),
                            _ => {}
                        }
                    }
                    for id in changes.removed_ids() {
                        if pending.contains(id) {
                            continue;
                        }
                        if let Some(existing) = state.documents.get(id) {
                            writes.push(Write::Delete(existing.clone()));
                        }
                    }
                }
            }

            log::debug!("Merging {} loaded changes into {}", writes.len(), self.name);
            self.commit(&mut state, &writes, false);
            writes
        };
        self.after_commit(&writes);
        Ok(())
    }
}

/// The id of a loaded document, or `None` (with a warning) when it has no
/// valid id.
fn loaded_id(document: &Document) -> Option<String> {
    match document.id() {
        Some(id) if !id.is_empty() => Some(id.to_string()),
        _ => {
            log::warn!("Ignoring loaded document without a valid id: {}", document);
            None
        }
    }
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        if let Some(synchronizer) = &self.synchronizer {
            synchronizer.signal_shutdown();
        }
    }
}
