/// Specifies the direction for sorting documents.
///
/// Used with [FindOptions](crate::collection::FindOptions) to control the
/// order of a cursor's results:
/// ```text
/// let options = order_by("age", SortOrder::Descending);
/// let cursor = collection.find_with_options(selector, options)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Smallest value first
    Ascending,
    /// Largest value first
    Descending,
}

impl SortOrder {
    pub(crate) fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// An ordered list of `(field path, direction)` pairs.
///
/// Documents are compared field by field; the first field whose values differ
/// decides. A missing field sorts like `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortableFields {
    sorting_order: Vec<(String, SortOrder)>,
}

impl SortableFields {
    pub fn new() -> Self {
        SortableFields::default()
    }

    pub fn add_sorted_field(mut self, field: &str, order: SortOrder) -> Self {
        self.sorting_order.push((field.to_string(), order));
        self
    }

    pub fn sorting_order(&self) -> &[(String, SortOrder)] {
        &self.sorting_order
    }

    pub fn is_empty(&self) -> bool {
        self.sorting_order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn descending_reverses_ordering() {
        assert_eq!(SortOrder::Ascending.apply(Ordering::Less), Ordering::Less);
        assert_eq!(SortOrder::Descending.apply(Ordering::Less), Ordering::Greater);
        assert_eq!(SortOrder::Descending.apply(Ordering::Equal), Ordering::Equal);
    }

    #[test]
    fn sortable_fields_keep_insertion_order() {
        let fields = SortableFields::new()
            .add_sorted_field("last", SortOrder::Ascending)
            .add_sorted_field("first", SortOrder::Descending);
        assert_eq!(
            fields.sorting_order(),
            &[
                ("last".to_string(), SortOrder::Ascending),
                ("first".to_string(), SortOrder::Descending)
            ]
        );
        assert!(!fields.is_empty());
    }
}
