//! # Ripple - Reactive Local-First Document Store
//!
//! Ripple is an embedded, in-memory document store with a reactive query
//! engine. Queries use MongoDB-style selectors, updates use MongoDB-style
//! modifiers, and reads performed inside a reactive computation are
//! re-run automatically when a write could change their result.
//!
//! ## Key Features
//!
//! - **Selectors**: comparison, array, element, pattern and logical operators
//!   over nested dot paths
//! - **Modifiers**: `$set`, `$inc`, `$push`, `$pull` and friends, including
//!   the positional `$` operator
//! - **Indexes**: incremental single-field indexes maintained on every write
//! - **Reactivity**: a pluggable [ReactivityAdapter](reactivity::ReactivityAdapter)
//!   connects cursors to any signal or tracker runtime
//! - **Persistence**: a background synchronizer drives a pluggable
//!   [PersistenceAdapter](persistence::PersistenceAdapter); several adapters
//!   can be combined with conflict resolution
//! - **Events**: observers for added, changed and removed documents, and for
//!   persistence progress
//!
//! ## Quick Start
//!
//! ```rust
//! use ripple::collection::CollectionBuilder;
//! use ripple::doc;
//! use ripple::errors::RippleResult;
//! use ripple::filter::field;
//! use ripple::modifier::Modifier;
//!
//! # fn main() -> RippleResult<()> {
//! let todos = CollectionBuilder::new().name("todos").index("done").open()?;
//!
//! todos.insert(doc! { title: "buy milk", done: false, tags: ["home"] })?;
//! todos.insert(doc! { title: "ship release", done: false, tags: ["work"] })?;
//!
//! todos.update_one(
//!     &field("tags").eq("home"),
//!     &Modifier::new().set("done", true).push("tags", "errand"),
//! )?;
//!
//! let open = todos.find(field("done").eq(false))?;
//! assert_eq!(open.count()?, 1);
//!
//! todos.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Pattern
//!
//! Public handles such as [Collection](collection::Collection) wrap an
//! `Arc` to their implementation, so they are cheap to clone and safe to
//! share across threads. All state of a collection sits behind one
//! `parking_lot` lock, and every write becomes visible atomically.

pub mod collection;
pub mod common;
pub mod errors;
pub mod filter;
pub mod index;
pub mod modifier;
pub mod persistence;
pub mod reactivity;
