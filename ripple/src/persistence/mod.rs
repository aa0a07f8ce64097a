//! Persistence contract and synchronization.
//!
//! A collection keeps its documents in memory. A [PersistenceAdapter] mirrors
//! them to some backend, and the [Synchronizer] drives it from one background
//! worker:
//!
//! - every local write batch is folded into a pending [Changes] delta and
//!   the worker saves the cumulative delta, never re-entering `save`;
//! - on start, and whenever the adapter reports an external change, the
//!   worker loads the remote state and merges it, keeping ids that still
//!   have un-flushed local writes;
//! - failures never fail the in-memory collection; they surface as
//!   [PersistenceEvents::Error] events.
//!
//! [MemoryAdapter] keeps the last saved snapshot in memory and
//! [CombinedAdapter] fans out to several adapters.

mod changes;
mod combine;
mod event;
mod memory;
mod synchronizer;

pub use changes::*;
pub use combine::*;
pub use event::*;
pub use memory::*;
pub(crate) use synchronizer::*;

use crate::collection::Document;
use crate::errors::{ErrorKind, RippleError, RippleResult};
use std::sync::Arc;

/// Callback an adapter invokes when its backend changed externally.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Result of [PersistenceAdapter::load].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    /// The complete remote state.
    Items(Vec<Document>),
    /// Only what changed remotely.
    Changes(Changes),
}

/// A persistence backend.
///
/// All calls come from the synchronizer's worker thread; `save` and `load`
/// never run concurrently for one collection. They may block.
pub trait PersistenceAdapter: Send + Sync {
    /// Name used to attribute errors and events.
    fn name(&self) -> &str;

    /// Subscribes to external change notifications.
    fn register(&self, on_change: ChangeCallback) -> RippleResult<()>;

    /// Stores `items`, the complete in-memory state, together with the
    /// delta accumulated since the last successful save.
    fn save(&self, items: &[Document], changes: &Changes) -> RippleResult<()>;

    fn load(&self) -> RippleResult<LoadResult>;
}

/// Wraps `error` as an `AdapterError` attributed to `adapter`, unless it
/// already is one.
pub(crate) fn attribute_error(adapter: &str, action: &str, error: RippleError) -> RippleError {
    if matches!(error.kind(), ErrorKind::AdapterError(_)) {
        return error;
    }
    RippleError::new_with_cause(
        &format!("Adapter {} failed to {}", adapter, action),
        ErrorKind::AdapterError(adapter.to_string()),
        error,
    )
}
