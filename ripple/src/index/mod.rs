//! In-memory secondary indexes.
//!
//! A [FieldIndex] maps the values found at one field path to the ids of the
//! documents holding them. The collection keeps one [IndexSet] and feeds
//! every write through it, so an index always reflects the current
//! documents exactly.
//!
//! ```rust
//! use ripple::doc;
//! use ripple::filter::Selector;
//! use ripple::index::FieldIndex;
//!
//! let docs = vec![
//!     doc! { id: "1", status: "open" },
//!     doc! { id: "2", status: "closed" },
//!     doc! { id: "3", status: "open" },
//! ];
//! let mut index = FieldIndex::new("status");
//! index.rebuild(&docs);
//!
//! let result = index.query(&Selector::parse(&doc! { status: "open" }).unwrap());
//! assert!(result.matched);
//! assert_eq!(result.id_list(), vec!["1".to_string(), "3".to_string()]);
//! ```
//!
//! # Resolvable clauses
//!
//! - a literal (not null, not an array) or `$eq`: one bucket
//! - `$in`: union of buckets
//! - `$nin`: every indexed id outside the union
//! - a `null` literal: documents where the field is null or absent; the
//!   matcher still runs over these candidates
//!
//! Other clauses are left to the matcher.

mod field_index;
mod index_result;
mod index_set;

pub use field_index::*;
pub use index_result::*;
pub use index_set::*;
