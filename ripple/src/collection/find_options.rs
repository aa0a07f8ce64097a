use crate::collection::Document;
use crate::common::{get_path, remove_path, set_path, FieldPath, SortOrder, SortableFields, Value, DOC_ID};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use std::cmp::Ordering;

/// Options for controlling find operations: sorting, pagination and
/// projection.
///
/// ```rust
/// use ripple::collection::{FindOptions, Projection};
/// use ripple::common::SortOrder;
///
/// let options = FindOptions::new()
///     .sort_by("age", SortOrder::Descending)
///     .skip(10)
///     .limit(20)
///     .fields(Projection::include(&["name", "age"]));
/// assert_eq!(options.skip, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort_by: Option<SortableFields>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub fields: Option<Projection>,
}

/// Creates `FindOptions` sorting by one field.
pub fn order_by(field_name: &str, sort_order: SortOrder) -> FindOptions {
    FindOptions::new().sort_by(field_name, sort_order)
}

/// Creates `FindOptions` that skips the first `skip` results.
pub fn skip_by(skip: usize) -> FindOptions {
    FindOptions::new().skip(skip)
}

/// Creates `FindOptions` returning at most `limit` results.
pub fn limit_to(limit: usize) -> FindOptions {
    FindOptions::new().limit(limit)
}

impl FindOptions {
    pub fn new() -> FindOptions {
        FindOptions::default()
    }

    /// Adds a sort key. Later keys break ties of earlier ones.
    pub fn sort_by(mut self, field_name: &str, sort_order: SortOrder) -> FindOptions {
        let fields = self.sort_by.take().unwrap_or_default();
        self.sort_by = Some(fields.add_sorted_field(field_name, sort_order));
        self
    }

    pub fn skip(mut self, skip: usize) -> FindOptions {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> FindOptions {
        self.limit = Some(limit);
        self
    }

    pub fn fields(mut self, projection: Projection) -> FindOptions {
        self.fields = Some(projection);
        self
    }

    /// Sorts, paginates and projects `documents`.
    pub(crate) fn apply(&self, mut documents: Vec<Document>) -> Vec<Document> {
        if let Some(sort_by) = &self.sort_by {
            if !sort_by.is_empty() {
                documents.sort_by(|a, b| compare_documents(a, b, sort_by));
            }
        }

        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        let page = documents.into_iter().skip(skip).take(limit);

        match &self.fields {
            Some(projection) => page.map(|doc| projection.project(&doc)).collect(),
            None => page.collect(),
        }
    }
}

/// Orders two documents by the sort keys. Absent fields sort as null; the
/// sort is stable so ties keep insertion order.
fn compare_documents(a: &Document, b: &Document, sort_by: &SortableFields) -> Ordering {
    for (field, order) in sort_by.sorting_order() {
        let path = FieldPath::parse(field);
        let left = get_path(a, &path).unwrap_or(&Value::Null);
        let right = get_path(b, &path).unwrap_or(&Value::Null);
        let ordering = order.apply(left.cmp(right));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Field projection applied to find results.
///
/// `Include` keeps `id` plus the listed paths, `Exclude` drops the listed
/// paths. Parsed from `{ name: 1, age: 1 }` or `{ secret: 0 }`; `id: 0` is
/// allowed in an inclusion to drop the id.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include { fields: Vec<FieldPath>, with_id: bool },
    Exclude(Vec<FieldPath>),
}

impl Projection {
    pub fn include(fields: &[&str]) -> Projection {
        Projection::Include {
            fields: fields.iter().map(|f| FieldPath::parse(f)).collect(),
            with_id: true,
        }
    }

    pub fn exclude(fields: &[&str]) -> Projection {
        Projection::Exclude(fields.iter().map(|f| FieldPath::parse(f)).collect())
    }

    pub fn parse(spec: &Document) -> RippleResult<Projection> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut with_id = true;

        for (field, flag) in spec.iter() {
            let path = FieldPath::parse(field);
            if path.is_malformed() || path.has_positional() {
                log::error!("Invalid projection field '{}'", field);
                return Err(RippleError::new(
                    &format!("Invalid projection field '{}'", field),
                    ErrorKind::InvalidOperation,
                ));
            }
            let keep = match flag {
                Value::Bool(b) => *b,
                other => other.as_f64().map(|n| n != 0.0).unwrap_or(true),
            };
            if field == DOC_ID {
                with_id = keep;
            } else if keep {
                included.push(path);
            } else {
                excluded.push(path);
            }
        }

        match (included.is_empty(), excluded.is_empty()) {
            (false, false) => {
                log::error!("Projection cannot mix inclusion and exclusion: {}", spec);
                Err(RippleError::new(
                    "Projection cannot mix inclusion and exclusion",
                    ErrorKind::InvalidOperation,
                ))
            }
            (false, true) => Ok(Projection::Include {
                fields: included,
                with_id,
            }),
            (true, _) => {
                if !with_id {
                    excluded.push(FieldPath::parse(DOC_ID));
                }
                Ok(Projection::Exclude(excluded))
            }
        }
    }

    pub(crate) fn project(&self, document: &Document) -> Document {
        match self {
            Projection::Include { fields, with_id } => {
                let mut result = Document::new();
                if *with_id {
                    if let Some(id) = document.get(DOC_ID) {
                        result.insert(DOC_ID, id.clone());
                    }
                }
                for path in fields {
                    if let Some(value) = get_path(document, path) {
                        if let Err(e) = set_path(&mut result, path, value.clone()) {
                            log::warn!("Failed to project field {}: {}", path, e);
                        }
                    }
                }
                result
            }
            Projection::Exclude(fields) => {
                let mut result = document.clone();
                for path in fields {
                    remove_path(&mut result, path);
                }
                result
            }
        }
    }
}

impl TryFrom<Document> for Projection {
    type Error = RippleError;

    fn try_from(value: Document) -> Result<Self, Self::Error> {
        Projection::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn people() -> Vec<Document> {
        vec![
            doc! { id: "1", name: "ann", age: 30 },
            doc! { id: "2", name: "bob", age: 25 },
            doc! { id: "3", name: "cyd", age: 30 },
            doc! { id: "4", name: "dan" },
        ]
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().filter_map(|d| d.id()).collect()
    }

    #[test]
    fn sort_is_stable_and_multi_key() {
        let result = order_by("age", SortOrder::Descending).apply(people());
        assert_eq!(ids(&result), vec!["1", "3", "2", "4"]);

        let options = FindOptions::new()
            .sort_by("age", SortOrder::Ascending)
            .sort_by("name", SortOrder::Descending);
        let result = options.apply(people());
        assert_eq!(ids(&result), vec!["4", "2", "3", "1"]);
    }

    #[test]
    fn skip_and_limit() {
        assert_eq!(ids(&skip_by(1).limit(2).apply(people())), vec!["2", "3"]);
        assert_eq!(ids(&limit_to(0).apply(people())), Vec::<&str>::new());
        assert_eq!(ids(&skip_by(10).apply(people())), Vec::<&str>::new());
    }

    #[test]
    fn include_projection() {
        let options = FindOptions::new().fields(Projection::include(&["name", "address.city"]));
        let result = options.apply(vec![doc! { id: "1", name: "ann", age: 3, address: { city: "x", zip: 1 } }]);
        assert_eq!(result, vec![doc! { id: "1", name: "ann", address: { city: "x" } }]);
    }

    #[test]
    fn parsed_projection() {
        let projection = Projection::parse(&doc! { secret: 0, id: 0 }).unwrap();
        assert_eq!(projection.project(&doc! { id: "1", secret: "s", a: 1 }), doc! { a: 1 });

        let projection = Projection::parse(&doc! { a: 1, id: false }).unwrap();
        assert_eq!(projection.project(&doc! { id: "1", a: 1, b: 2 }), doc! { a: 1 });

        let err = Projection::parse(&doc! { a: 1, b: 0 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }
}
