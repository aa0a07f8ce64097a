use im::OrdMap;

use crate::common::{get_path, FieldPath, Value, DOC_ID};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use std::fmt::{Debug, Display};

/// A schemaless record stored in a [Collection](crate::collection::Collection).
///
/// A document is an ordered map from field name to [Value], backed by the
/// persistent `im::OrdMap`:
/// - O(1) clone through structural sharing
/// - a mutation copies only the touched path, the clone it came from is unchanged
///
/// Keys are stored verbatim; `"a.b"` is one key. Use [get_path](Document::get_path)
/// to traverse nested documents and arrays with a dot-path.
///
/// Every stored document carries a string identifier under the `id` field.
/// The collection assigns a UUID when a document without one is inserted.
///
/// ```rust
/// use ripple::doc;
/// use ripple::common::Value;
///
/// let doc = doc! {
///     id: "42",
///     name: { first: "Grace", last: "Hopper" },
///     tags: ["navy", "cobol"],
/// };
/// assert_eq!(doc.id(), Some("42"));
/// assert_eq!(doc.get_path("name.first"), Some(&Value::from("Grace")));
/// ```
#[derive(Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document { data: OrdMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with the top-level `key`.
    ///
    /// Fails for an empty key, and with `InvalidId` when `key` is `id` and the
    /// value is not a string.
    pub fn put<T: Into<Value>>(&mut self, key: &str, value: T) -> RippleResult<()> {
        if key.is_empty() {
            log::error!("Document does not support empty key");
            return Err(RippleError::new(
                "Document does not support empty key",
                ErrorKind::InvalidOperation,
            ));
        }

        let value = value.into();
        if key == DOC_ID && !value.is_string() {
            log::error!("Document id must be a string, found {}", value.type_name());
            return Err(RippleError::new(
                &format!("Document id must be a string, found {}", value.type_name()),
                ErrorKind::InvalidId,
            ));
        }

        self.data.insert(key.to_string(), value);
        Ok(())
    }

    /// Associates `value` with `key` without validation and returns the
    /// previous value.
    pub fn insert<K: Into<String>, T: Into<Value>>(&mut self, key: K, value: T) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Returns the value of the top-level field `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Returns the value at a dot-path. Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        get_path(self, &FieldPath::parse(path))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the document id if it is present and a string.
    pub fn id(&self) -> Option<&str> {
        self.data.get(DOC_ID).and_then(|v| v.as_str())
    }

    pub fn has_id(&self) -> bool {
        self.data.contains_key(DOC_ID)
    }

    /// Validates the `id` field: absent is fine, anything but a string is not.
    pub(crate) fn validate_id(&self) -> RippleResult<()> {
        match self.data.get(DOC_ID) {
            None | Some(Value::String(_)) => Ok(()),
            Some(other) => {
                log::error!("Document id must be a string, found {}", other.type_name());
                Err(RippleError::new(
                    &format!("Document id must be a string, found {}", other.type_name()),
                    ErrorKind::InvalidId,
                ))
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Copies every field of `other` into this document, overwriting
    /// fields with the same key.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.data.iter() {
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub(crate) fn to_json(&self) -> String {
        let fields: Vec<String> = self
            .data
            .iter()
            .map(|(k, v)| format!("\"{}\": {}", k, v.to_json()))
            .collect();
        format!("{{{}}}", fields.join(", "))
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter().collect::<Vec<_>>().into_iter()
    }
}

pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] with JSON-like syntax.
///
/// Keys are identifiers or string literals; string literals allow operator
/// names and dotted paths.
///
/// ```rust
/// use ripple::doc;
///
/// let limit = 10;
/// let selector = doc! {
///     "address.city": "Paris",
///     age: { "$gte": 18, "$lt": (limit * 10) },
///     tags: ["a", "b"],
/// };
/// assert_eq!(selector.size(), 3);
/// ```
#[macro_export]
macro_rules! doc {
    ({}) => {
        $crate::collection::Document::new()
    };

    () => {
        $crate::collection::Document::new()
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::collection::Document::new();
            $(
                doc.insert($crate::collection::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Converts one value of a [doc!] invocation: nested documents, arrays or
/// any expression convertible into a [Value](crate::common::Value).
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
        }
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
