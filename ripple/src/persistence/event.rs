use crate::common::{EVENT_ADAPTER_ERROR, EVENT_PERSISTENCE_ERROR, EVENT_PERSISTENCE_INIT, EVENT_PERSISTENCE_TRANSMITTED};
use crate::errors::{RippleError, RippleResult};
use crate::persistence::Changes;
use anyhow::Error;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use std::fmt::Debug;
use std::sync::Arc;

/// Kinds of persistence events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceEvents {
    /// The first load finished; the collection is ready.
    Init,
    /// A delta was saved.
    Transmitted,
    /// A save or load failed.
    Error,
    /// One adapter of a [CombinedAdapter](crate::persistence::CombinedAdapter)
    /// failed while the others carried on.
    AdapterError,
}

impl PersistenceEvents {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceEvents::Init => EVENT_PERSISTENCE_INIT,
            PersistenceEvents::Transmitted => EVENT_PERSISTENCE_TRANSMITTED,
            PersistenceEvents::Error => EVENT_PERSISTENCE_ERROR,
            PersistenceEvents::AdapterError => EVENT_ADAPTER_ERROR,
        }
    }
}

/// Information about a persistence event, attributed to one adapter.
#[derive(Clone)]
pub struct PersistenceEventInfo {
    inner: Arc<PersistenceEventInner>,
}

struct PersistenceEventInner {
    event_type: PersistenceEvents,
    adapter: String,
    changes: Option<Changes>,
    error: Option<RippleError>,
}

impl PersistenceEventInfo {
    pub fn init(adapter: &str) -> Self {
        Self::new(PersistenceEvents::Init, adapter, None, None)
    }

    pub fn transmitted(adapter: &str, changes: Changes) -> Self {
        Self::new(PersistenceEvents::Transmitted, adapter, Some(changes), None)
    }

    pub fn error(adapter: &str, error: RippleError) -> Self {
        Self::new(PersistenceEvents::Error, adapter, None, Some(error))
    }

    pub fn adapter_error(adapter: &str, error: RippleError) -> Self {
        Self::new(PersistenceEvents::AdapterError, adapter, None, Some(error))
    }

    fn new(
        event_type: PersistenceEvents,
        adapter: &str,
        changes: Option<Changes>,
        error: Option<RippleError>,
    ) -> Self {
        PersistenceEventInfo {
            inner: Arc::new(PersistenceEventInner {
                event_type,
                adapter: adapter.to_string(),
                changes,
                error,
            }),
        }
    }

    pub fn event_type(&self) -> PersistenceEvents {
        self.inner.event_type
    }

    /// Name of the adapter the event is attributed to.
    pub fn adapter(&self) -> &str {
        &self.inner.adapter
    }

    /// The saved delta of a `Transmitted` event.
    pub fn changes(&self) -> Option<&Changes> {
        self.inner.changes.as_ref()
    }

    /// The failure of an `Error` or `AdapterError` event.
    pub fn cause(&self) -> Option<&RippleError> {
        self.inner.error.as_ref()
    }
}

impl Debug for PersistenceEventInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEventInfo")
            .field("event_type", &self.event_type())
            .field("adapter", &self.adapter())
            .field("changes", &self.changes().map(|c| c.len()))
            .field("error", &self.cause().map(|e| e.message().to_string()))
            .finish()
    }
}

pub trait PersistenceEventCallback: Send + Sync + Fn(PersistenceEventInfo) -> RippleResult<()> {}

impl<F> PersistenceEventCallback for F where F: Send + Sync + Fn(PersistenceEventInfo) -> RippleResult<()> {}

/// Listener for [PersistenceEvents].
#[derive(Clone)]
pub struct PersistenceEventListener {
    on_event: Arc<dyn PersistenceEventCallback>,
}

impl PersistenceEventListener {
    pub fn new(on_event: impl PersistenceEventCallback + 'static) -> Self {
        PersistenceEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<PersistenceEventInfo> for PersistenceEventListener {
    fn handle(&self, event: &Event<PersistenceEventInfo>) -> Result<(), BasuError> {
        match (self.on_event)(event.data.clone()) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::warn!("Persistence event handler failed: {}", e);
                Err(BasuError::HandlerError(Error::from(e)))
            }
        }
    }
}

impl Debug for PersistenceEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEventListener").finish()
    }
}
