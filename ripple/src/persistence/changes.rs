use crate::collection::Document;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Documents added, modified and removed since the last synchronization.
///
/// Each id appears in at most one of the three groups. Recording successive
/// writes to the same id compacts them:
///
/// | earlier  | later    | result   |
/// |----------|----------|----------|
/// | added    | modified | added    |
/// | added    | removed  | nothing  |
/// | modified | removed  | removed  |
/// | removed  | added    | modified |
///
/// ```rust
/// use ripple::doc;
/// use ripple::persistence::Changes;
///
/// let mut changes = Changes::new();
/// changes.record_added(doc! { id: "1", n: 1 });
/// changes.record_modified(doc! { id: "1", n: 2 });
/// assert_eq!(changes.added().len(), 1);
/// assert!(changes.modified().is_empty());
///
/// changes.record_removed(doc! { id: "1", n: 2 });
/// assert!(changes.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    added: IndexMap<String, Document>,
    modified: IndexMap<String, Document>,
    removed: IndexMap<String, Document>,
}

impl Changes {
    pub fn new() -> Self {
        Changes::default()
    }

    pub fn added(&self) -> Vec<&Document> {
        self.added.values().collect()
    }

    /// New states of modified documents.
    pub fn modified(&self) -> Vec<&Document> {
        self.modified.values().collect()
    }

    /// Last known states of removed documents.
    pub fn removed(&self) -> Vec<&Document> {
        self.removed.values().collect()
    }

    pub fn removed_ids(&self) -> Vec<&str> {
        self.removed.keys().map(|id| id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Number of ids with a pending change.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.added.contains_key(id) || self.modified.contains_key(id) || self.removed.contains_key(id)
    }

    pub fn ids(&self) -> HashSet<String> {
        self.added
            .keys()
            .chain(self.modified.keys())
            .chain(self.removed.keys())
            .cloned()
            .collect()
    }

    pub fn record_added(&mut self, document: Document) {
        let Some(id) = document.id().map(|id| id.to_string()) else {
            log::warn!("Ignoring change record for document without id");
            return;
        };
        if self.removed.shift_remove(&id).is_some() {
            self.modified.insert(id, document);
        } else {
            self.added.insert(id, document);
        }
    }

    pub fn record_modified(&mut self, document: Document) {
        let Some(id) = document.id().map(|id| id.to_string()) else {
            log::warn!("Ignoring change record for document without id");
            return;
        };
        if let Some(slot) = self.added.get_mut(&id) {
            *slot = document;
        } else {
            self.removed.shift_remove(&id);
            self.modified.insert(id, document);
        }
    }

    pub fn record_removed(&mut self, document: Document) {
        let Some(id) = document.id().map(|id| id.to_string()) else {
            log::warn!("Ignoring change record for document without id");
            return;
        };
        if self.added.shift_remove(&id).is_some() {
            return;
        }
        self.modified.shift_remove(&id);
        self.removed.insert(id, document);
    }

    /// Folds a later delta into this one.
    pub fn merge(&mut self, later: Changes) {
        for (_, document) in later.added {
            self.record_added(document);
        }
        for (_, document) in later.modified {
            self.record_modified(document);
        }
        for (_, document) in later.removed {
            self.record_removed(document);
        }
    }

    /// Takes the accumulated delta, leaving this one empty.
    pub fn take(&mut self) -> Changes {
        std::mem::take(self)
    }
}
