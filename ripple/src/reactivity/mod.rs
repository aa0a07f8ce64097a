//! Pluggable reactivity.
//!
//! The collection does not know which reactive runtime drives it. A runtime
//! plugs in through [ReactivityAdapter]: each live query obtains a
//! [Dependency] from the adapter, calls [Dependency::depend] whenever it is
//! read and receives [Dependency::notify] when a write could have changed its
//! result.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use ripple::reactivity::{Dependency, ReactivityAdapter};
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl Dependency for Counter {
//!     fn depend(&self) {}
//!     fn notify(&self) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! struct Runtime;
//!
//! impl ReactivityAdapter for Runtime {
//!     fn create(&self) -> Arc<dyn Dependency> {
//!         Arc::new(Counter::default())
//!     }
//! }
//! ```

mod registry;

pub(crate) use registry::*;

use std::sync::Arc;

/// A reactive handle owned by one live query.
pub trait Dependency: Send + Sync {
    /// Records that the current reactive computation read the query.
    fn depend(&self);

    /// Invalidates the computations that depend on the query.
    fn notify(&self);
}

/// Binds a reactive runtime to the collection.
pub trait ReactivityAdapter: Send + Sync {
    /// Creates the dependency for a new live query.
    fn create(&self) -> Arc<dyn Dependency>;

    /// Whether a reactive computation is currently running. Reads outside a
    /// scope are not tracked.
    fn is_in_scope(&self) -> bool {
        true
    }

    /// Registers `callback` to run when the current computation is torn
    /// down. Returns false when the runtime has no disposal hook and dropped
    /// the callback, which is what the default implementation does.
    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) -> bool {
        let _ = callback;
        false
    }
}
