// doc constants
pub const DOC_ID: &str = "id";
pub const FIELD_SEPARATOR: char = '.';
pub const POSITIONAL_SEGMENT: &str = "$";
/// Most nulls a write past the end of an array may pad with.
pub const MAX_ARRAY_PADDING: usize = 10_000;

// collection event kinds
pub const EVENT_ADDED: &str = "added";
pub const EVENT_CHANGED: &str = "changed";
pub const EVENT_REMOVED: &str = "removed";

// persistence event kinds
pub const EVENT_PERSISTENCE_INIT: &str = "persistence.init";
pub const EVENT_PERSISTENCE_TRANSMITTED: &str = "persistence.transmitted";
pub const EVENT_PERSISTENCE_ERROR: &str = "persistence.error";

// combined adapter event kinds
pub const EVENT_ADAPTER_ERROR: &str = "adapter.error";

// collection defaults
pub const DEFAULT_COLLECTION_NAME: &str = "default";
pub const SYNC_WORKER_PREFIX: &str = "ripple-sync";

pub const RIPPLE_VERSION: &str = env!("CARGO_PKG_VERSION");
