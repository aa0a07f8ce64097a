use parking_lot::Mutex;
use ripple::collection::CollectionBuilder;
use ripple::common::Value;
use ripple::doc;
use ripple::errors::ErrorKind;
use ripple::filter::{all, field};
use ripple::modifier::Modifier;
use ripple::persistence::{
    Changes, CombinedAdapter, LastWriteWins, LoadResult, MemoryAdapter, PersistenceEventInfo,
    PersistenceEventListener, PersistenceEvents,
};
use ripple_int_test::test_util::{ids, run_persistent_test, wait_until};
use std::sync::Arc;
use std::time::Duration;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_loads_snapshot_on_open() {
    let adapter = MemoryAdapter::with_items("memory", vec![doc! { id: "1", n: 1 }, doc! { id: "2", n: 2 }]);
    run_persistent_test(Arc::new(adapter.clone()), |ctx| {
        let collection = ctx.collection();
        wait_until(2000, || collection.is_ready());

        assert_eq!(ids(&collection.find(all())?.fetch()?), vec!["1", "2"]);
        // loading is not a local change
        assert!(collection.pending_ids().is_empty());
        assert_eq!(adapter.save_count(), 0);
        Ok(())
    })
}

#[test]
fn test_local_writes_are_saved() {
    let adapter = MemoryAdapter::new("memory");
    run_persistent_test(Arc::new(adapter.clone()), |ctx| {
        let collection = ctx.collection();
        wait_until(2000, || collection.is_ready());

        collection.insert(doc! { id: "a", n: 1 })?;
        wait_until(2000, || adapter.snapshot() == vec![doc! { id: "a", n: 1 }]);

        collection.update(&field("id").eq("a"), &Modifier::new().inc("n", 1))?;
        collection.insert(doc! { id: "b" })?;
        collection.remove(&field("id").eq("b"))?;
        wait_until(2000, || adapter.snapshot() == vec![doc! { id: "a", n: 2 }]);
        wait_until(2000, || collection.pending_ids().is_empty());

        let saved = adapter.saved_changes();
        assert_eq!(saved[0].added(), vec![&doc! { id: "a", n: 1 }]);
        Ok(())
    })
}

#[test]
fn test_writes_during_a_save_are_coalesced() {
    let adapter = MemoryAdapter::new("memory");
    run_persistent_test(Arc::new(adapter.clone()), |ctx| {
        let collection = ctx.collection();
        wait_until(2000, || collection.is_ready());
        adapter.set_save_delay(Some(Duration::from_millis(100)));

        for n in 0..10 {
            collection.insert(doc! { n: n })?;
        }
        // every save sees the full snapshot, so wait on the deltas instead
        wait_until(5000, || adapter.saved_changes().iter().map(Changes::len).sum::<usize>() == 10);
        assert_eq!(adapter.snapshot().len(), 10);
        assert!(adapter.save_count() < 10);
        assert!(collection.pending_ids().is_empty());
        adapter.set_save_delay(None);
        Ok(())
    })
}

#[test]
fn test_external_change_reloads() {
    let adapter = MemoryAdapter::with_items("memory", vec![doc! { id: "1", n: 1 }]);
    run_persistent_test(Arc::new(adapter.clone()), |ctx| {
        let collection = ctx.collection();
        let runtime = ctx.runtime();
        wait_until(2000, || collection.is_ready());

        let cursor = collection.find(field("n").gt(0))?;
        runtime.scope(|| cursor.fetch())?;

        adapter.set_snapshot(vec![doc! { id: "1", n: 5 }, doc! { id: "2", n: 7 }]);
        adapter.trigger_change();

        wait_until(2000, || collection.size().map(|s| s == 2).unwrap_or(false));
        assert_eq!(
            collection.get_by_id("1")?.unwrap().get("n"),
            Some(&Value::from(5))
        );
        let dependency = runtime.dependency(0).unwrap();
        wait_until(2000, || dependency.notifies() == 1);

        adapter.set_snapshot(vec![doc! { id: "2", n: 7 }]);
        collection.reload()?;
        wait_until(2000, || collection.get_by_id("1").map(|d| d.is_none()).unwrap_or(false));
        Ok(())
    })
}

#[test]
fn test_load_with_changes_is_applied_incrementally() {
    let adapter = MemoryAdapter::with_items("memory", vec![doc! { id: "1" }, doc! { id: "2" }]);
    run_persistent_test(Arc::new(adapter.clone()), |ctx| {
        let collection = ctx.collection();
        wait_until(2000, || collection.is_ready());

        let mut changes = Changes::new();
        changes.record_added(doc! { id: "3" });
        changes.record_modified(doc! { id: "1", touched: true });
        changes.record_removed(doc! { id: "2" });
        adapter.queue_load(LoadResult::Changes(changes));
        collection.reload()?;

        wait_until(2000, || collection.size().map(|s| s == 2).unwrap_or(false)
            && collection.get_by_id("3").map(|d| d.is_some()).unwrap_or(false));
        assert_eq!(collection.get_by_id("1")?, Some(doc! { id: "1", touched: true }));
        assert!(collection.get_by_id("2")?.is_none());
        Ok(())
    })
}

#[test]
fn test_failed_save_keeps_local_state_and_retries_with_next_write() {
    let adapter = MemoryAdapter::new("flaky");
    let errors = Arc::new(Mutex::new(Vec::new()));
    run_persistent_test(Arc::new(adapter.clone()), |ctx| {
        let collection = ctx.collection();
        wait_until(2000, || collection.is_ready());

        let sink = errors.clone();
        collection.subscribe_persistence(
            PersistenceEvents::Error,
            PersistenceEventListener::new(move |event: PersistenceEventInfo| {
                sink.lock().push(event.cause().map(|e| e.kind().clone()));
                Ok(())
            }),
        )?;

        adapter.fail_saves(true);
        collection.insert(doc! { id: "local", n: 1 })?;
        wait_until(2000, || !errors.lock().is_empty());
        assert_eq!(errors.lock()[0], Some(ErrorKind::AdapterError("flaky".to_string())));
        assert!(collection.pending_ids().contains("local"));

        // a load must not clobber the unsaved document
        adapter.queue_load(LoadResult::Items(vec![doc! { id: "remote" }]));
        collection.reload()?;
        wait_until(2000, || collection.get_by_id("remote").map(|d| d.is_some()).unwrap_or(false));
        assert!(collection.get_by_id("local")?.is_some());

        adapter.fail_saves(false);
        collection.insert(doc! { id: "next" })?;
        wait_until(2000, || adapter.save_count() == 1);
        let saved = adapter.saved_changes();
        assert!(saved[0].contains("local"));
        assert!(saved[0].contains("next"));
        assert_eq!(ids(&adapter.snapshot()), vec!["local", "remote", "next"]);
        Ok(())
    })
}

#[test]
fn test_lifecycle_events() {
    let adapter = MemoryAdapter::new("memory");
    adapter.set_save_delay(Some(Duration::from_millis(20)));
    let collection = CollectionBuilder::new()
        .persistence(Arc::new(adapter.clone()))
        .open()
        .unwrap();

    let transmitted = Arc::new(Mutex::new(Vec::new()));
    let sink = transmitted.clone();
    collection
        .subscribe_persistence(
            PersistenceEvents::Transmitted,
            PersistenceEventListener::new(move |event: PersistenceEventInfo| {
                let changes = event.changes().cloned().unwrap_or_default();
                sink.lock().push((event.adapter().to_string(), changes.len()));
                Ok(())
            }),
        )
        .unwrap();

    wait_until(2000, || collection.is_ready());
    collection.insert(doc! { id: "1" }).unwrap();
    wait_until(2000, || !transmitted.lock().is_empty());
    assert_eq!(transmitted.lock()[0], ("memory".to_string(), 1));
    collection.close().unwrap();
}

#[test]
fn test_close_flushes_pending_writes() {
    let adapter = MemoryAdapter::new("memory");
    let collection = CollectionBuilder::new()
        .persistence(Arc::new(adapter.clone()))
        .open()
        .unwrap();
    wait_until(2000, || collection.is_ready());

    adapter.set_save_delay(Some(Duration::from_millis(50)));
    for n in 0..5 {
        collection.insert(doc! { id: (format!("d{}", n)) }).unwrap();
    }
    collection.close().unwrap();
    assert_eq!(adapter.snapshot().len(), 5);
}

#[test]
fn test_combined_adapters() {
    let local = MemoryAdapter::with_items(
        "local",
        vec![doc! { id: "1", v: "local", ts: 9 }, doc! { id: "2", v: "local" }],
    );
    let remote = MemoryAdapter::with_items(
        "remote",
        vec![doc! { id: "1", v: "remote", ts: 4 }, doc! { id: "3", v: "remote" }],
    );
    let combined = Arc::new(
        CombinedAdapter::new(vec![Arc::new(local.clone()), Arc::new(remote.clone())])
            .with_resolver(Arc::new(LastWriteWins::new().timestamp_field("ts"))),
    );

    let adapter_errors = Arc::new(Mutex::new(Vec::new()));
    let sink = adapter_errors.clone();
    combined
        .subscribe(PersistenceEventListener::new(move |event: PersistenceEventInfo| {
            sink.lock().push(event.adapter().to_string());
            Ok(())
        }))
        .unwrap();

    run_persistent_test(combined.clone(), |ctx| {
        let collection = ctx.collection();
        wait_until(2000, || collection.is_ready());
        assert_eq!(
            collection.find(all())?.fetch()?,
            vec![
                doc! { id: "1", v: "local", ts: 9 },
                doc! { id: "2", v: "local" },
                doc! { id: "3", v: "remote" },
            ]
        );

        remote.fail_saves(true);
        collection.insert(doc! { id: "4" })?;
        wait_until(2000, || local.snapshot().len() == 4);
        wait_until(2000, || adapter_errors.lock().contains(&"remote".to_string()));
        assert_eq!(remote.save_count(), 0);
        remote.fail_saves(false);
        Ok(())
    })
}
