use crate::errors::{ErrorKind, RippleError, RippleResult};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Publishes and subscribes to events, with one observer list per event kind.
///
/// Kinds are plain strings (see the `EVENT_*` constants). A listener is
/// registered for exactly one kind and only receives events published under
/// that kind. Publishing is synchronous: every listener has run when
/// [publish](RippleEventBus::publish) returns.
///
/// # Example
///
/// ```ignore
/// let bus: RippleEventBus<CollectionEventInfo, CollectionEventListener> = RippleEventBus::new();
/// let subscriber = bus.register(EVENT_ADDED, listener)?;
/// bus.publish(EVENT_ADDED, info)?;
/// bus.deregister(subscriber)?;
/// ```
#[derive(Clone)]
pub struct RippleEventBus<E, L> {
    inner: Arc<RippleEventBusInner<E, L>>,
}

impl<E, L> Default for RippleEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> RippleEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    pub fn new() -> Self {
        RippleEventBus {
            inner: Arc::new(RippleEventBusInner::new()),
        }
    }

    /// Registers a listener for events of `kind`.
    pub fn register(&self, kind: &str, listener: L) -> RippleResult<SubscriberRef> {
        self.inner.register(kind, listener)
    }

    /// Removes a previously registered listener.
    pub fn deregister(&self, subscriber: SubscriberRef) -> RippleResult<()> {
        self.inner.deregister(subscriber)
    }

    /// Publishes `event` to every listener registered for `kind`.
    pub fn publish(&self, kind: &str, event: E) -> RippleResult<()> {
        self.inner.publish(kind, event)
    }

    /// Returns true if at least one listener is registered for `kind`.
    pub fn has_listeners(&self, kind: &str) -> bool {
        self.inner.has_listeners(kind)
    }

    /// Drops every registered listener.
    pub fn close(&self) -> RippleResult<()> {
        self.inner.close()
    }
}

/// Handle to a listener registration, used to unsubscribe.
pub struct SubscriberRef {
    pub(crate) kind: String,
    pub(crate) inner: HandlerId,
}

impl SubscriberRef {
    pub fn new(kind: &str, inner: HandlerId) -> Self {
        SubscriberRef {
            kind: kind.to_string(),
            inner,
        }
    }

    /// The event kind this registration listens to.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

struct RippleEventBusInner<E, L> {
    event_bus: EventBus<E>,
    phantom_data: PhantomData<L>,
}

impl<E, L> RippleEventBusInner<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn new() -> Self {
        RippleEventBusInner {
            event_bus: EventBus::new(),
            phantom_data: PhantomData,
        }
    }

    fn register(&self, kind: &str, listener: L) -> RippleResult<SubscriberRef> {
        match self.event_bus.subscribe(kind, Box::new(listener)) {
            Ok(handler_id) => Ok(SubscriberRef::new(kind, handler_id)),
            Err(e) => Err(Self::ripple_error(e)),
        }
    }

    fn deregister(&self, subscriber: SubscriberRef) -> RippleResult<()> {
        match self.event_bus.unsubscribe(&subscriber.kind, &subscriber.inner) {
            Ok(_) => Ok(()),
            Err(e) => Err(Self::ripple_error(e)),
        }
    }

    fn publish(&self, kind: &str, event: E) -> RippleResult<()> {
        // no listener ever registered for this kind
        let handler_count = match self.event_bus.get_handler_count(kind) {
            Ok(count) => count,
            Err(BasuError::EventTypeNotFOUND) => return Ok(()),
            Err(e) => return Err(Self::ripple_error(e)),
        };

        if handler_count == 0 {
            return Ok(());
        }

        let basu_event = Event::new(event);
        match self.event_bus.publish(kind, &basu_event) {
            Ok(_) => Ok(()),
            Err(e) => Err(Self::ripple_error(e)),
        }
    }

    fn close(&self) -> RippleResult<()> {
        match self.event_bus.clear() {
            Ok(_) => Ok(()),
            Err(e) => Err(Self::ripple_error(e)),
        }
    }

    fn has_listeners(&self, kind: &str) -> bool {
        match self.event_bus.get_handler_count(kind) {
            Ok(count) => count > 0,
            Err(BasuError::EventTypeNotFOUND) => false,
            Err(e) => {
                log::warn!("Failed to check listeners for {}: {}", kind, e);
                false
            }
        }
    }

    fn ripple_error(e: BasuError) -> RippleError {
        match e {
            BasuError::EventTypeNotFOUND => RippleError::new(
                "Event bus error: no listener is registered for the event kind",
                ErrorKind::EventError,
            ),
            BasuError::MutexPoisoned => RippleError::new(
                "Event bus error: internal mutex poisoned",
                ErrorKind::EventError,
            ),
            BasuError::HandlerError(e) => RippleError::new(
                &format!("Event handler error: {}", e),
                ErrorKind::EventError,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone)]
    struct RecordingListener {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Handle<String> for RecordingListener {
        fn handle(&self, event: &Event<String>) -> Result<(), BasuError> {
            self.seen.lock().push(event.data.clone());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FailingListener;

    impl Handle<String> for FailingListener {
        fn handle(&self, _event: &Event<String>) -> Result<(), BasuError> {
            Err(BasuError::HandlerError(anyhow::anyhow!("listener failed")))
        }
    }

    fn recording() -> (RecordingListener, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (RecordingListener { seen: seen.clone() }, seen)
    }

    #[test]
    fn publish_without_listeners_is_ok() {
        let bus: RippleEventBus<String, RecordingListener> = RippleEventBus::new();
        assert!(bus.publish("added", "x".to_string()).is_ok());
        assert!(!bus.has_listeners("added"));
    }

    #[test]
    fn listeners_only_receive_their_kind() {
        let bus: RippleEventBus<String, RecordingListener> = RippleEventBus::new();
        let (added, added_seen) = recording();
        let (removed, removed_seen) = recording();
        bus.register("added", added).unwrap();
        bus.register("removed", removed).unwrap();

        bus.publish("added", "a1".to_string()).unwrap();
        bus.publish("removed", "r1".to_string()).unwrap();
        bus.publish("added", "a2".to_string()).unwrap();

        assert_eq!(*added_seen.lock(), vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(*removed_seen.lock(), vec!["r1".to_string()]);
    }

    #[test]
    fn deregister_stops_delivery() {
        let bus: RippleEventBus<String, RecordingListener> = RippleEventBus::new();
        let (listener, seen) = recording();
        let subscriber = bus.register("changed", listener).unwrap();
        assert_eq!(subscriber.kind(), "changed");
        assert!(bus.has_listeners("changed"));

        bus.deregister(subscriber).unwrap();
        bus.publish("changed", "c".to_string()).unwrap();
        assert!(seen.lock().is_empty());
        assert!(!bus.has_listeners("changed"));
    }

    #[test]
    fn deregister_unknown_subscriber_fails() {
        let bus: RippleEventBus<String, RecordingListener> = RippleEventBus::new();
        let subscriber = SubscriberRef::new("added", HandlerId::new());
        assert!(bus.deregister(subscriber).is_err());
    }

    #[test]
    fn handler_error_converts_to_event_error() {
        let error = BasuError::HandlerError(anyhow::anyhow!("listener failed"));
        let result = RippleEventBusInner::<String, FailingListener>::ripple_error(error);
        assert_eq!(result.kind(), &ErrorKind::EventError);
        assert!(result.message().contains("listener failed"));
    }

    #[test]
    fn mutex_poisoned_converts_to_event_error() {
        let result =
            RippleEventBusInner::<String, FailingListener>::ripple_error(BasuError::MutexPoisoned);
        assert_eq!(result.kind(), &ErrorKind::EventError);
    }

    #[test]
    fn close_drops_listeners() {
        let bus: RippleEventBus<String, RecordingListener> = RippleEventBus::new();
        let (listener, seen) = recording();
        bus.register("added", listener).unwrap();
        bus.close().unwrap();
        bus.publish("added", "x".to_string()).unwrap();
        assert!(seen.lock().is_empty());
    }
}
