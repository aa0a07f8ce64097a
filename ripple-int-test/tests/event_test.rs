use parking_lot::Mutex;
use ripple::collection::{CollectionBuilder, CollectionEventInfo, CollectionEventListener, CollectionEvents, Document};
use ripple::doc;
use ripple::errors::{ErrorKind, RippleError};
use ripple::filter::field;
use ripple::modifier::Modifier;
use std::sync::Arc;

#[ctor::ctor]
fn init() {
    colog::init();
}

type Seen = Arc<Mutex<Vec<(CollectionEvents, Document, Option<Document>)>>>;

fn recorder(seen: &Seen) -> CollectionEventListener {
    let sink = seen.clone();
    CollectionEventListener::new(move |event: CollectionEventInfo| {
        sink.lock().push((
            event.event_type(),
            event.document().clone(),
            event.previous().cloned(),
        ));
        Ok(())
    })
}

#[test]
fn test_events_carry_documents() {
    let collection = CollectionBuilder::new().name("events").open().unwrap();
    let seen: Seen = Arc::default();
    for event in CollectionEvents::all() {
        collection.subscribe(event, recorder(&seen)).unwrap();
    }

    collection.insert(doc! { id: "1", n: 1 }).unwrap();
    collection.update(&field("id").eq("1"), &Modifier::new().inc("n", 1)).unwrap();
    collection.remove(&field("id").eq("1")).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (CollectionEvents::Added, doc! { id: "1", n: 1 }, None),
            (CollectionEvents::Changed, doc! { id: "1", n: 2 }, Some(doc! { id: "1", n: 1 })),
            (CollectionEvents::Removed, doc! { id: "1", n: 2 }, None),
        ]
    );
}

#[test]
fn test_batch_publishes_one_event_per_document() {
    let collection = CollectionBuilder::new().open().unwrap();
    let seen: Seen = Arc::default();
    collection.subscribe(CollectionEvents::Added, recorder(&seen)).unwrap();

    collection
        .insert_many(vec![doc! { id: "a" }, doc! { id: "b" }, doc! { id: "c" }])
        .unwrap();
    let added: Vec<_> = seen.lock().iter().map(|(_, d, _)| d.id().map(String::from)).collect();
    assert_eq!(added, vec![Some("a".into()), Some("b".into()), Some("c".into())]);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let collection = CollectionBuilder::new().open().unwrap();
    let seen: Seen = Arc::default();
    let subscriber = collection.subscribe(CollectionEvents::Added, recorder(&seen)).unwrap();

    collection.insert(doc! { id: "1" }).unwrap();
    assert_eq!(seen.lock().len(), 1);

    collection.unsubscribe(subscriber).unwrap();
    collection.insert(doc! { id: "2" }).unwrap();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_failing_listener_does_not_fail_the_write() {
    let collection = CollectionBuilder::new().open().unwrap();
    collection
        .subscribe(
            CollectionEvents::Added,
            CollectionEventListener::new(|_event: CollectionEventInfo| {
                Err(RippleError::new("listener failed", ErrorKind::EventError))
            }),
        )
        .unwrap();

    collection.insert(doc! { id: "1" }).unwrap();
    collection.insert_many(vec![doc! { id: "2" }, doc! { id: "3" }]).unwrap();
    assert_eq!(collection.size().unwrap(), 3);
}

#[test]
fn test_events_fire_before_reactive_notifications() {
    use ripple::reactivity::{Dependency, ReactivityAdapter};

    struct Probe(Arc<Mutex<Vec<&'static str>>>);

    impl Dependency for Probe {
        fn depend(&self) {}

        fn notify(&self) {
            self.0.lock().push("notify");
        }
    }

    struct Runtime(Arc<Mutex<Vec<&'static str>>>);

    impl ReactivityAdapter for Runtime {
        fn create(&self) -> Arc<dyn Dependency> {
            Arc::new(Probe(self.0.clone()))
        }
    }

    let order = Arc::new(Mutex::new(Vec::new()));
    let collection = CollectionBuilder::new()
        .reactivity(Arc::new(Runtime(order.clone())))
        .open()
        .unwrap();
    let sink = order.clone();
    collection
        .subscribe(
            CollectionEvents::Added,
            CollectionEventListener::new(move |_event: CollectionEventInfo| {
                sink.lock().push("added");
                Ok(())
            }),
        )
        .unwrap();

    let cursor = collection.find(field("n").eq(1)).unwrap();
    cursor.fetch().unwrap();
    collection.insert(doc! { n: 1 }).unwrap();
    assert_eq!(*order.lock(), vec!["added", "notify"]);
}
