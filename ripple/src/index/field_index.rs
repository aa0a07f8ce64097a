use crate::collection::Document;
use crate::common::{resolve, FieldPath, Value};
use crate::filter::{Condition, FieldOp, Selector};
use crate::index::IndexResult;
use std::collections::{BTreeSet, HashMap};

/// Values a document contributes to one index.
#[derive(Debug, PartialEq, Eq)]
struct IndexKeys {
    values: BTreeSet<Value>,
    null: bool,
}

/// An in-memory secondary index over one field path.
///
/// Maps each value found at the path to the ids of the documents holding
/// it. Array values are indexed per element. Documents where the field is
/// absent or null are kept in a separate table, and every indexed id is
/// remembered so complement queries (`$nin`) can be answered.
///
/// The index never re-reads the collection: callers keep it consistent by
/// feeding every write through [insert](FieldIndex::insert),
/// [remove](FieldIndex::remove) and [update](FieldIndex::update).
#[derive(Debug, Clone)]
pub struct FieldIndex {
    field: FieldPath,
    buckets: HashMap<Value, BTreeSet<String>>,
    nulls: BTreeSet<String>,
    all_ids: BTreeSet<String>,
}

impl FieldIndex {
    pub fn new(field: &str) -> Self {
        FieldIndex {
            field: FieldPath::parse(field),
            buckets: HashMap::new(),
            nulls: BTreeSet::new(),
            all_ids: BTreeSet::new(),
        }
    }

    pub fn field(&self) -> &str {
        self.field.as_str()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.all_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_ids.is_empty()
    }

    /// Discards all state and indexes `items` from scratch.
    pub fn rebuild<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a Document>,
    {
        self.buckets.clear();
        self.nulls.clear();
        self.all_ids.clear();
        self.insert(items);
        log::debug!(
            "Rebuilt index on {} with {} documents and {} keys",
            self.field,
            self.all_ids.len(),
            self.buckets.len()
        );
    }

    pub fn insert<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a Document>,
    {
        for document in items {
            if let Some(id) = document.id() {
                let keys = self.keys_of(document);
                self.add(id, keys);
            }
        }
    }

    pub fn remove<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a Document>,
    {
        for document in items {
            if let Some(id) = document.id() {
                let keys = self.keys_of(document);
                self.discard(id, &keys);
            }
        }
    }

    /// Applies `(old, new)` document pairs. Pairs whose indexed value did
    /// not change are skipped.
    pub fn update<'a, I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (&'a Document, &'a Document)>,
    {
        for (old, new) in pairs {
            let old_keys = self.keys_of(old);
            let new_keys = self.keys_of(new);
            if old_keys == new_keys && old.id() == new.id() {
                continue;
            }
            if let Some(id) = old.id() {
                self.discard(id, &old_keys);
            }
            if let Some(id) = new.id() {
                self.add(id, new_keys);
            }
        }
    }

    fn keys_of(&self, document: &Document) -> IndexKeys {
        let mut keys = IndexKeys {
            values: BTreeSet::new(),
            null: false,
        };
        for branch in resolve(document, &self.field) {
            match branch.value {
                None | Some(Value::Null) => keys.null = true,
                Some(Value::Array(items)) => {
                    for item in items {
                        if item.is_null() {
                            keys.null = true;
                        } else {
                            keys.values.insert(item.clone());
                        }
                    }
                }
                Some(value) => {
                    keys.values.insert(value.clone());
                }
            }
        }
        keys
    }

    fn add(&mut self, id: &str, keys: IndexKeys) {
        for value in keys.values {
            self.buckets.entry(value).or_default().insert(id.to_string());
        }
        if keys.null {
            self.nulls.insert(id.to_string());
        }
        self.all_ids.insert(id.to_string());
    }

    fn discard(&mut self, id: &str, keys: &IndexKeys) {
        for value in &keys.values {
            if let Some(ids) = self.buckets.get_mut(value) {
                ids.remove(id);
                if ids.is_empty() {
                    self.buckets.remove(value);
                }
            }
        }
        self.nulls.remove(id);
        self.all_ids.remove(id);
    }

    /// Resolves the selector's clause on this index's field.
    ///
    /// Only a plain literal, `$eq`, `$in` or `$nin` can be answered; anything
    /// else yields an unmatched result.
    pub fn query(&self, selector: &Selector) -> IndexResult {
        let Some(condition) = selector.field_condition(self.field.as_str()) else {
            return IndexResult::unmatched();
        };

        match condition {
            Condition::Literal(value) => self.lookup_eq(value),
            Condition::Operators(ops) if ops.len() == 1 => match &ops[0] {
                FieldOp::Eq(value) => self.lookup_eq(value),
                FieldOp::In(values) => self.lookup_in(values),
                FieldOp::Nin(values) => self.lookup_nin(values),
                _ => IndexResult::unmatched(),
            },
            _ => IndexResult::unmatched(),
        }
    }

    fn lookup_eq(&self, value: &Value) -> IndexResult {
        match value {
            Value::Array(_) => IndexResult::unmatched(),
            Value::Null => IndexResult::matched(self.nulls.clone(), self.field(), true),
            value => IndexResult::matched(self.bucket(value), self.field(), false),
        }
    }

    fn lookup_in(&self, values: &[Value]) -> IndexResult {
        let Some((ids, has_null)) = self.union(values) else {
            return IndexResult::unmatched();
        };
        IndexResult::matched(ids, self.field(), has_null)
    }

    fn lookup_nin(&self, values: &[Value]) -> IndexResult {
        let Some((excluded, _)) = self.union(values) else {
            return IndexResult::unmatched();
        };
        let ids = self.all_ids.difference(&excluded).cloned().collect();
        IndexResult::matched(ids, self.field(), false)
    }

    /// Union of the buckets of `values`; `None` if a value is an array.
    fn union(&self, values: &[Value]) -> Option<(BTreeSet<String>, bool)> {
        let mut ids = BTreeSet::new();
        let mut has_null = false;
        for value in values {
            match value {
                Value::Array(_) => return None,
                Value::Null => {
                    has_null = true;
                    ids.extend(self.nulls.iter().cloned());
                }
                value => {
                    if let Some(bucket) = self.buckets.get(value) {
                        ids.extend(bucket.iter().cloned());
                    }
                }
            }
        }
        Some((ids, has_null))
    }

    fn bucket(&self, value: &Value) -> BTreeSet<String> {
        self.buckets.get(value).cloned().unwrap_or_default()
    }
}
