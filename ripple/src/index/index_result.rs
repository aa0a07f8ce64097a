use std::collections::BTreeSet;

/// Answer of an index lookup for a selector.
///
/// When `matched` is false the index could not resolve the selector and
/// `ids` is empty; the caller scans. When `matched` is true, `ids` holds the
/// candidates, `fields` names the selector fields the lookup consumed, and
/// `keep_selector` tells whether candidates still have to be re-checked with
/// the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexResult {
    pub matched: bool,
    pub ids: BTreeSet<String>,
    pub fields: Vec<String>,
    pub keep_selector: bool,
}

impl IndexResult {
    pub fn unmatched() -> Self {
        IndexResult::default()
    }

    pub fn matched(ids: BTreeSet<String>, field: &str, keep_selector: bool) -> Self {
        IndexResult {
            matched: true,
            ids,
            fields: vec![field.to_string()],
            keep_selector,
        }
    }

    /// Candidate ids as a sorted vector.
    pub fn id_list(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    /// Narrows this result with another matched result.
    pub(crate) fn intersect(&mut self, other: IndexResult) {
        if !self.matched {
            *self = other;
            return;
        }
        self.ids = self.ids.intersection(&other.ids).cloned().collect();
        self.fields.extend(other.fields);
        self.keep_selector |= other.keep_selector;
    }
}
