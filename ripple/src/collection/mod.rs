//! Collections and documents.
//!
//! # Documents
//!
//! A [Document] is an ordered map from string keys to [Value](crate::common::Value)s.
//! Nested fields are addressed with dot paths, and array elements with
//! numeric segments (`items.0.sku`). The reserved `id` field holds the
//! document's string id.
//!
//! ```rust
//! use ripple::doc;
//!
//! let mut user = doc! { name: "Alice", address: { city: "Lisbon" } };
//! user.put("age", 31).unwrap();
//! assert_eq!(user.get_path("address.city").unwrap().as_str(), Some("Lisbon"));
//! assert!(user.put("id", 7).is_err());
//! ```
//!
//! # Collections
//!
//! A [Collection] holds documents in insertion order and supports:
//! - inserts, modifier-based updates with upsert, and removals
//! - selector queries through lazy, reactive [Cursor]s
//! - single-field secondary indexes
//! - collection events for every committed change
//! - optional synchronization through a
//!   [PersistenceAdapter](crate::persistence::PersistenceAdapter)
//!
//! ```rust
//! use ripple::collection::{CollectionBuilder, FindOptions};
//! use ripple::common::SortOrder;
//! use ripple::doc;
//! use ripple::filter::field;
//!
//! let users = CollectionBuilder::new().name("users").open().unwrap();
//! users.insert(doc! { name: "Alice", age: 31 }).unwrap();
//! users.insert(doc! { name: "Bob", age: 27 }).unwrap();
//!
//! let options = FindOptions::new().sort_by("age", SortOrder::Ascending);
//! let cursor = users.find_with_options(field("age").gt(18), options).unwrap();
//! let names: Vec<_> = cursor
//!     .fetch()
//!     .unwrap()
//!     .iter()
//!     .map(|d| d.get("name").unwrap().as_str().unwrap().to_string())
//!     .collect();
//! assert_eq!(names, vec!["Bob", "Alice"]);
//! ```

mod collection;
mod config;
mod cursor;
mod document;
mod event;
mod find_options;
mod update_options;

pub use collection::*;
pub use config::*;
pub use cursor::*;
pub use document::*;
pub use event::*;
pub use find_options::*;
pub use update_options::*;
