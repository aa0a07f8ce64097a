use crate::collection::Document;
use crate::common::FieldPath;
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::filter::Selector;
use crate::index::{FieldIndex, IndexResult};
use indexmap::IndexMap;

/// All indexes of one collection, in creation order.
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    indexes: IndexMap<String, FieldIndex>,
}

impl IndexSet {
    pub fn new() -> Self {
        IndexSet::default()
    }

    /// Creates an index on `field` and builds it from `items`.
    pub fn create<'a, I>(&mut self, field: &str, items: I) -> RippleResult<()>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let path = FieldPath::parse(field);
        if path.is_malformed() || path.has_positional() {
            log::error!("Cannot create an index on invalid field path '{}'", field);
            return Err(RippleError::new(
                &format!("Cannot create an index on invalid field path '{}'", field),
                ErrorKind::IndexingError,
            ));
        }

        if self.indexes.contains_key(field) {
            log::error!("Index on {} already exists", field);
            return Err(RippleError::new(
                &format!("Index on '{}' already exists", field),
                ErrorKind::IndexAlreadyExists,
            ));
        }

        let mut index = FieldIndex::new(field);
        index.rebuild(items);
        self.indexes.insert(field.to_string(), index);
        log::debug!("Created index on {}", field);
        Ok(())
    }

    pub fn drop_index(&mut self, field: &str) -> RippleResult<()> {
        match self.indexes.shift_remove(field) {
            Some(_) => {
                log::debug!("Dropped index on {}", field);
                Ok(())
            }
            None => {
                log::error!("Index on {} does not exist", field);
                Err(RippleError::new(
                    &format!("Index on '{}' does not exist", field),
                    ErrorKind::IndexNotFound,
                ))
            }
        }
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    pub fn fields(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn get(&self, field: &str) -> Option<&FieldIndex> {
        self.indexes.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn rebuild<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = &'a Document>,
        I::IntoIter: Clone,
    {
        let items = items.into_iter();
        for index in self.indexes.values_mut() {
            index.rebuild(items.clone());
        }
    }

    pub fn insert(&mut self, items: &[Document]) {
        for index in self.indexes.values_mut() {
            index.insert(items);
        }
    }

    pub fn remove(&mut self, items: &[Document]) {
        for index in self.indexes.values_mut() {
            index.remove(items);
        }
    }

    pub fn update(&mut self, pairs: &[(Document, Document)]) {
        for index in self.indexes.values_mut() {
            index.update(pairs.iter().map(|(old, new)| (old, new)));
        }
    }

    /// Queries every index and intersects the matched results.
    ///
    /// The returned result is unmatched when no index could resolve the
    /// selector. Its `keep_selector` is set when any index asked for it or
    /// when the selector has clauses no index consumed.
    pub fn query(&self, selector: &Selector) -> IndexResult {
        let mut combined = IndexResult::unmatched();
        for index in self.indexes.values() {
            let result = index.query(selector);
            if result.matched {
                combined.intersect(result);
            }
        }

        if combined.matched && !selector.is_covered_by(&combined.fields) {
            combined.keep_selector = true;
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn docs() -> Vec<Document> {
        vec![
            doc! { id: "1", status: "open", owner: "ann" },
            doc! { id: "2", status: "open", owner: "bob" },
            doc! { id: "3", status: "closed", owner: "ann" },
        ]
    }

    fn parse(selector: Document) -> Selector {
        Selector::parse(&selector).unwrap()
    }

    #[test]
    fn create_and_drop() {
        let docs = docs();
        let mut set = IndexSet::new();
        set.create("status", &docs).unwrap();
        assert!(set.has_index("status"));

        let err = set.create("status", &docs).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexAlreadyExists);

        set.drop_index("status").unwrap();
        let err = set.drop_index("status").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexNotFound);

        let err = set.create("items.$.sku", &docs).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexingError);
    }

    #[test]
    fn intersects_matched_indexes() {
        let docs = docs();
        let mut set = IndexSet::new();
        set.create("status", &docs).unwrap();
        set.create("owner", &docs).unwrap();
        assert_eq!(set.fields(), vec!["status".to_string(), "owner".to_string()]);

        let result = set.query(&parse(doc! { status: "open", owner: "ann" }));
        assert!(result.matched);
        assert!(!result.keep_selector);
        assert_eq!(result.id_list(), vec!["1".to_string()]);
    }

    #[test]
    fn unconsumed_clauses_keep_selector() {
        let docs = docs();
        let mut set = IndexSet::new();
        set.create("status", &docs).unwrap();

        let result = set.query(&parse(doc! { status: "open", owner: "ann" }));
        assert!(result.matched);
        assert!(result.keep_selector);
        assert_eq!(result.id_list(), vec!["1".to_string(), "2".to_string()]);

        let result = set.query(&parse(doc! { owner: "ann" }));
        assert!(!result.matched);
    }

    #[test]
    fn writes_fan_out_to_every_index() {
        let mut set = IndexSet::new();
        set.create("status", std::iter::empty()).unwrap();
        set.create("owner", std::iter::empty()).unwrap();

        let docs = docs();
        set.insert(&docs);
        let moved = doc! { id: "2", status: "closed", owner: "bob" };
        set.update(&[(docs[1].clone(), moved)]);
        set.remove(&docs[0..1]);

        let result = set.query(&parse(doc! { status: "closed" }));
        assert_eq!(result.id_list(), vec!["2".to_string(), "3".to_string()]);
        let result = set.query(&parse(doc! { owner: "ann" }));
        assert_eq!(result.id_list(), vec!["3".to_string()]);

        set.rebuild(&docs);
        let result = set.query(&parse(doc! { status: "open" }));
        assert_eq!(result.id_list(), vec!["1".to_string(), "2".to_string()]);
    }
}
