//! Selectors: the MongoDB-style query language and its matcher.
//!
//! A [Selector] is parsed from a document or built fluently:
//! - `field("age").gt(30)` - comparison operators
//! - `field("tags").in_array(vec!["a", "b"])` - set membership
//! - `field("name").regex("^A")` - regular expressions over strings
//! - `and(..)`, `or(..)`, `nor(..)` - logical combinators
//! - `all()` - match all documents
//! - `by_id(id)` - match by document id
//!
//! ```rust
//! use ripple::doc;
//! use ripple::filter::{field, matches, Selector};
//!
//! let selector = Selector::parse(&doc! {
//!     "items.sku": "b",
//!     qty: { "$gte": 5 },
//! }).unwrap();
//! let document = doc! { id: "1", qty: 7, items: [{ sku: "a" }, { sku: "b" }] };
//! assert!(matches(&document, &selector));
//! assert!(matches(&document, &field("qty").lt(10)));
//! ```
//!
//! # Supported Operators
//!
//! - **Equality**: literal values, `$eq`, `$ne`
//! - **Comparison**: `$gt`, `$gte`, `$lt`, `$lte`
//! - **Array**: `$in`, `$nin`, `$all`, `$size`, `$elemMatch`
//! - **Element**: `$exists`
//! - **Pattern**: `$regex` with `$options`
//! - **Logical**: `$and`, `$or`, `$nor`, `$not`
//!
//! Any other operator parses but never matches.

mod fluent;
mod matcher;
mod selector;

pub use fluent::*;
pub use matcher::*;
pub use selector::*;
