use crate::collection::Document;
use crate::common::{EVENT_ADDED, EVENT_CHANGED, EVENT_REMOVED};
use crate::errors::RippleResult;
use anyhow::Error;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kinds of collection events. Each kind has its own observer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionEvents {
    /// A document was inserted.
    Added,
    /// A document was replaced by a new state.
    Changed,
    /// A document was removed.
    Removed,
}

impl CollectionEvents {
    /// The event-bus kind this event is published under.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectionEvents::Added => EVENT_ADDED,
            CollectionEvents::Changed => EVENT_CHANGED,
            CollectionEvents::Removed => EVENT_REMOVED,
        }
    }

    pub fn all() -> [CollectionEvents; 3] {
        [
            CollectionEvents::Added,
            CollectionEvents::Changed,
            CollectionEvents::Removed,
        ]
    }
}

/// Information about one document written to a collection.
///
/// Cloning is cheap; the payload is shared. For `Added` and `Changed` the
/// [document](CollectionEventInfo::document) is the new state, for `Removed`
/// it is the removed state. `Changed` also carries the previous state.
///
/// ```ignore
/// collection.subscribe(CollectionEvents::Changed, CollectionEventListener::new(|event| {
///     log::info!("{:?} -> {:?}", event.previous(), event.document());
///     Ok(())
/// }))?;
/// ```
#[derive(Clone)]
pub struct CollectionEventInfo {
    inner: Arc<CollectionEventInner>,
}

impl CollectionEventInfo {
    pub fn new(
        event_type: CollectionEvents,
        document: Document,
        previous: Option<Document>,
        collection: &str,
    ) -> Self {
        CollectionEventInfo {
            inner: Arc::new(CollectionEventInner {
                event_type,
                document,
                previous,
                collection: collection.to_string(),
                timestamp: current_time_millis(),
            }),
        }
    }

    pub fn event_type(&self) -> CollectionEvents {
        self.inner.event_type
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// The state before a `Changed` write.
    pub fn previous(&self) -> Option<&Document> {
        self.inner.previous.as_ref()
    }

    /// Name of the collection that was written.
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u128 {
        self.inner.timestamp
    }
}

impl Debug for CollectionEventInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEventInfo")
            .field("event_type", &self.event_type())
            .field("document", self.document())
            .field("previous", &self.previous())
            .field("collection", &self.collection())
            .field("timestamp", &self.timestamp())
            .finish()
    }
}

struct CollectionEventInner {
    event_type: CollectionEvents,
    document: Document,
    previous: Option<Document>,
    collection: String,
    timestamp: u128,
}

pub(crate) fn current_time_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Closure signature for collection event handlers.
pub trait CollectionEventCallback: Send + Sync + Fn(CollectionEventInfo) -> RippleResult<()> {}

impl<F> CollectionEventCallback for F where F: Send + Sync + Fn(CollectionEventInfo) -> RippleResult<()> {}

/// Listener registered on a collection for one [CollectionEvents] kind.
///
/// Handlers run synchronously on the writing thread after the write has
/// committed. A handler error is logged and does not undo the write.
#[derive(Clone)]
pub struct CollectionEventListener {
    on_event: Arc<dyn CollectionEventCallback>,
}

impl CollectionEventListener {
    pub fn new(on_event: impl CollectionEventCallback + 'static) -> Self {
        CollectionEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<CollectionEventInfo> for CollectionEventListener {
    fn handle(&self, event: &Event<CollectionEventInfo>) -> Result<(), BasuError> {
        match (self.on_event)(event.data.clone()) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::warn!("Collection event handler failed: {}", e);
                Err(BasuError::HandlerError(Error::from(e)))
            }
        }
    }
}

impl Debug for CollectionEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEventListener").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::errors::{ErrorKind, RippleError};
    use parking_lot::Mutex;

    #[test]
    fn event_info_accessors() {
        let event = CollectionEventInfo::new(
            CollectionEvents::Changed,
            doc! { id: "1", n: 2 },
            Some(doc! { id: "1", n: 1 }),
            "todos",
        );
        assert_eq!(event.event_type(), CollectionEvents::Changed);
        assert_eq!(event.document(), &doc! { id: "1", n: 2 });
        assert_eq!(event.previous(), Some(&doc! { id: "1", n: 1 }));
        assert_eq!(event.collection(), "todos");
        assert!(event.timestamp() > 0);
        assert!(format!("{:?}", event).contains("CollectionEventInfo"));
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds: Vec<&str> = CollectionEvents::all().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EVENT_ADDED, EVENT_CHANGED, EVENT_REMOVED]);
    }

    #[test]
    fn listener_handles_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = CollectionEventListener::new(move |event: CollectionEventInfo| {
            sink.lock().push(event.document().clone());
            Ok(())
        });

        let info = CollectionEventInfo::new(CollectionEvents::Added, doc! { id: "1" }, None, "c");
        assert!(listener.handle(&Event::new(info)).is_ok());
        assert_eq!(*seen.lock(), vec![doc! { id: "1" }]);
    }

    #[test]
    fn listener_error_becomes_handler_error() {
        let listener = CollectionEventListener::new(|_event: CollectionEventInfo| {
            Err(RippleError::new("boom", ErrorKind::InternalError))
        });
        let info = CollectionEventInfo::new(CollectionEvents::Removed, doc! { id: "1" }, None, "c");
        let result = listener.handle(&Event::new(info));
        assert!(matches!(result, Err(BasuError::HandlerError(_))));
    }
}
