use crate::collection::Document;
use crate::common::{Value, FIELD_SEPARATOR, MAX_ARRAY_PADDING, POSITIONAL_SEGMENT};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

type Segments = SmallVec<[String; 4]>;

/// A parsed dot-path such as `address.city`, `tags.0` or `items.$.qty`.
///
/// Segments are kept as strings. A numeric segment addresses an array element
/// when the node it is applied to is an array, and is an ordinary key
/// otherwise. A `$` segment stands for "every element" when reading and for
/// the positional index when writing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Segments,
}

impl FieldPath {
    pub fn parse(path: &str) -> FieldPath {
        FieldPath {
            raw: path.to_string(),
            segments: path.split(FIELD_SEPARATOR).map(|s| s.to_string()).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn has_positional(&self) -> bool {
        self.segments.iter().any(|s| s == POSITIONAL_SEGMENT)
    }

    /// Returns true if any segment is empty, e.g. `a..b` or a trailing dot.
    pub fn is_malformed(&self) -> bool {
        self.segments.iter().any(|s| s.is_empty())
    }

    /// Replaces the first `$` segment with `index`.
    pub fn with_positional(&self, index: Option<usize>) -> RippleResult<FieldPath> {
        if !self.has_positional() {
            return Ok(self.clone());
        }

        let index = match index {
            Some(i) => i,
            None => {
                log::error!("Positional operator used in {} without a matching array element", self.raw);
                return Err(RippleError::new(
                    &format!(
                        "The positional operator in '{}' did not find the match needed from the query",
                        self.raw
                    ),
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        let mut replaced = false;
        let segments: Segments = self
            .segments
            .iter()
            .map(|s| {
                if !replaced && s == POSITIONAL_SEGMENT {
                    replaced = true;
                    index.to_string()
                } else {
                    s.clone()
                }
            })
            .collect();
        let raw = segments.join(FIELD_SEPARATOR.to_string().as_str());
        Ok(FieldPath { raw, segments })
    }

    /// Returns true if this path equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &FieldPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a == b)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::parse(value)
    }
}

/// One resolved location of a path inside a document.
///
/// `value` is `None` when the path does not exist along this branch.
/// `array_index` is the index of the outermost array element the branch went
/// through, which is what positional updates address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch<'a> {
    pub value: Option<&'a Value>,
    pub array_index: Option<usize>,
}

#[inline]
fn array_index_of(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Resolves `path` against `document`, fanning out over arrays.
///
/// Always returns at least one branch; a path that exists nowhere yields a
/// single branch with `value: None`.
pub fn resolve<'a>(document: &'a Document, path: &FieldPath) -> Vec<Branch<'a>> {
    let mut branches = Vec::new();
    resolve_in_document(document, path.segments(), None, &mut branches);
    if branches.is_empty() {
        branches.push(Branch {
            value: None,
            array_index: None,
        });
    }
    branches
}

fn resolve_in_document<'a>(
    document: &'a Document,
    segments: &[String],
    array_index: Option<usize>,
    out: &mut Vec<Branch<'a>>,
) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match document.get(head) {
        Some(child) => resolve_in_value(child, rest, array_index, out),
        None => out.push(Branch {
            value: None,
            array_index,
        }),
    }
}

fn resolve_in_value<'a>(
    value: &'a Value,
    segments: &[String],
    array_index: Option<usize>,
    out: &mut Vec<Branch<'a>>,
) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(Branch {
            value: Some(value),
            array_index,
        });
        return;
    };

    match value {
        Value::Document(doc) => resolve_in_document(doc, segments, array_index, out),
        Value::Array(items) => {
            if head == POSITIONAL_SEGMENT {
                for (i, item) in items.iter().enumerate() {
                    resolve_in_value(item, rest, array_index.or(Some(i)), out);
                }
            } else if let Some(i) = array_index_of(head) {
                match items.get(i) {
                    Some(item) => resolve_in_value(item, rest, array_index, out),
                    None => out.push(Branch {
                        value: None,
                        array_index,
                    }),
                }
            } else {
                // implicit traversal of an array of documents
                let before = out.len();
                for (i, item) in items.iter().enumerate() {
                    if let Value::Document(doc) = item {
                        resolve_in_document(doc, segments, array_index.or(Some(i)), out);
                    }
                }
                if out.len() == before {
                    out.push(Branch {
                        value: None,
                        array_index,
                    });
                }
            }
        }
        _ => out.push(Branch {
            value: None,
            array_index,
        }),
    }
}

/// Looks up a single value by path without fanning out over arrays.
pub fn get_path<'a>(document: &'a Document, path: &FieldPath) -> Option<&'a Value> {
    let (head, rest) = path.segments().split_first()?;
    let mut current = document.get(head)?;
    for segment in rest {
        current = match current {
            Value::Document(doc) => doc.get(segment)?,
            Value::Array(items) => items.get(array_index_of(segment)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable variant of [get_path].
pub fn get_path_mut<'a>(document: &'a mut Document, path: &FieldPath) -> Option<&'a mut Value> {
    let (head, rest) = path.segments().split_first()?;
    let mut current = document.get_mut(head)?;
    for segment in rest {
        current = match current {
            Value::Document(doc) => doc.get_mut(segment)?,
            Value::Array(items) => items.get_mut(array_index_of(segment)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate documents as needed.
///
/// Writing an array index past the end pads the array with nulls. Writing
/// through a scalar fails with `TypeMismatch`.
pub fn set_path(document: &mut Document, path: &FieldPath, value: Value) -> RippleResult<()> {
    let Some((head, rest)) = path.segments().split_first() else {
        return Err(invalid_path(path));
    };

    if rest.is_empty() {
        document.insert(head, value);
        return Ok(());
    }

    if document.get(head).is_none() {
        document.insert(head, Value::Document(Document::new()));
    }
    match document.get_mut(head) {
        Some(child) => set_in_value(child, rest, value, path),
        None => Err(invalid_path(path)),
    }
}

fn set_in_value(node: &mut Value, segments: &[String], value: Value, path: &FieldPath) -> RippleResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    match node {
        Value::Document(doc) => {
            if rest.is_empty() {
                doc.insert(head, value);
                return Ok(());
            }
            if doc.get(head).is_none() {
                doc.insert(head, Value::Document(Document::new()));
            }
            match doc.get_mut(head) {
                Some(child) => set_in_value(child, rest, value, path),
                None => Err(invalid_path(path)),
            }
        }
        Value::Array(items) => {
            let Some(index) = array_index_of(head) else {
                log::error!("Cannot create field {} in array element of {}", head, path);
                return Err(RippleError::new(
                    &format!("Cannot create field '{}' in array of path '{}'", head, path),
                    ErrorKind::TypeMismatch,
                ));
            };
            if items.len() <= index {
                let padded_len = index
                    .checked_add(1)
                    .filter(|len| len - items.len() <= MAX_ARRAY_PADDING);
                let Some(padded_len) = padded_len else {
                    log::error!("Array index {} of {} is too far past the end", index, path);
                    return Err(RippleError::new(
                        &format!(
                            "Array index {} in path '{}' is more than {} past the end of the array",
                            index, path, MAX_ARRAY_PADDING
                        ),
                        ErrorKind::InvalidOperation,
                    ));
                };
                items.resize(padded_len, Value::Null);
            }
            if rest.is_empty() {
                items[index] = value;
                return Ok(());
            }
            if items[index].is_null() {
                items[index] = Value::Document(Document::new());
            }
            set_in_value(&mut items[index], rest, value, path)
        }
        other => {
            log::error!("Cannot traverse {} value at {} of {}", other.type_name(), head, path);
            Err(RippleError::new(
                &format!("Cannot create field '{}' in {} value of path '{}'", head, other.type_name(), path),
                ErrorKind::TypeMismatch,
            ))
        }
    }
}

/// Removes the value at `path`. A removed array element is replaced with null
/// so the positions of its siblings do not shift.
pub fn remove_path(document: &mut Document, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.segments().split_last()?;
    if parents.is_empty() {
        return document.remove(last);
    }

    let parent_path = FieldPath {
        raw: parents.join(FIELD_SEPARATOR.to_string().as_str()),
        segments: parents.iter().cloned().collect(),
    };
    match get_path_mut(document, &parent_path)? {
        Value::Document(doc) => doc.remove(last),
        Value::Array(items) => {
            let slot = items.get_mut(array_index_of(last)?)?;
            Some(slot.take())
        }
        _ => None,
    }
}

fn invalid_path(path: &FieldPath) -> RippleError {
    log::error!("Invalid field path '{}'", path);
    RippleError::new(&format!("Invalid field path '{}'", path), ErrorKind::InvalidOperation)
}
