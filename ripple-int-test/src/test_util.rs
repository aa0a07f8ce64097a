use parking_lot::Mutex;
use ripple::collection::{Collection, CollectionBuilder, Document};
use ripple::doc;
use ripple::errors::RippleResult;
use ripple::persistence::PersistenceAdapter;
use ripple::reactivity::{Dependency, ReactivityAdapter};
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test with retry logic and error handling.
/// `after` always runs, even when the test itself failed.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> RippleResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> RippleResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> RippleResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    collection: Collection,
    runtime: Arc<TestRuntime>,
}

impl TestContext {
    pub fn new(collection: Collection, runtime: Arc<TestRuntime>) -> Self {
        Self { collection, runtime }
    }

    pub fn collection(&self) -> Collection {
        self.collection.clone()
    }

    pub fn runtime(&self) -> Arc<TestRuntime> {
        self.runtime.clone()
    }
}

/// A collection with a [TestRuntime] reactivity adapter, named after a
/// random uuid.
pub fn create_test_context() -> RippleResult<TestContext> {
    let runtime = Arc::new(TestRuntime::default());
    let collection = CollectionBuilder::new()
        .name(&random_name())
        .reactivity(runtime.clone())
        .open()?;
    Ok(TestContext::new(collection, runtime))
}

/// Same as [create_test_context] with an index on each of `fields`.
pub fn create_indexed_test_context(fields: &[&str]) -> RippleResult<TestContext> {
    let runtime = Arc::new(TestRuntime::default());
    let mut builder = CollectionBuilder::new()
        .name(&random_name())
        .reactivity(runtime.clone());
    for field in fields {
        builder = builder.index(field);
    }
    Ok(TestContext::new(builder.open()?, runtime))
}

/// Same as [create_test_context], synchronized through `adapter`.
pub fn create_persistent_test_context(adapter: Arc<dyn PersistenceAdapter>) -> RippleResult<TestContext> {
    let runtime = Arc::new(TestRuntime::default());
    let collection = CollectionBuilder::new()
        .name(&random_name())
        .reactivity(runtime.clone())
        .persistence(adapter)
        .open()?;
    Ok(TestContext::new(collection, runtime))
}

/// Runs `test` against a collection synchronized through `adapter`, then
/// cleans up. Unlike [run_test] there is no retry, so `test` may capture
/// adapters to inspect them.
pub fn run_persistent_test<T>(adapter: Arc<dyn PersistenceAdapter>, test: T)
where
    T: FnOnce(TestContext) -> RippleResult<()>,
{
    let ctx = match create_persistent_test_context(adapter) {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };
    let result = test(ctx.clone());
    if let Err(e) = cleanup(ctx) {
        eprintln!("Warning: Failed to clean up test context: {:?}", e);
    }
    if let Err(e) = result {
        panic!("Test failed: {:?}", e);
    }
}

pub fn cleanup(ctx: TestContext) -> RippleResult<()> {
    ctx.runtime().tear_down();
    ctx.collection().close()
}

pub fn random_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn wait_until<F: Fn() -> bool>(timeout_ms: u64, check: F) {
    awaitility::at_most(Duration::from_millis(timeout_ms)).until(check);
}

pub fn status_documents() -> Vec<Document> {
    vec![
        doc! { id: "1", status: "open", priority: 2, tags: ["ui"] },
        doc! { id: "2", status: "closed", priority: 1, tags: ["api", "db"] },
        doc! { id: "3", status: "open", priority: 3, tags: [] },
        doc! { id: "4", status: () },
    ]
}

pub fn order_documents() -> Vec<Document> {
    vec![
        doc! {
            id: "o1",
            customer: { name: "Ann", address: { city: "Lisbon" } },
            items: [{ sku: "a", qty: 1 }, { sku: "b", qty: 4 }],
            total: 12.5,
        },
        doc! {
            id: "o2",
            customer: { name: "Ben", address: { city: "Porto" } },
            items: [{ sku: "b", qty: 2 }],
            total: 40,
        },
        doc! {
            id: "o3",
            customer: { name: "Cid" },
            items: [],
            total: 0,
        },
    ]
}

pub fn insert_test_documents(collection: &Collection, documents: Vec<Document>) -> RippleResult<Vec<String>> {
    collection.insert_many(documents)
}

pub fn ids(documents: &[Document]) -> Vec<String> {
    documents.iter().filter_map(|d| d.id()).map(String::from).collect()
}

/// A dependency that counts its calls.
#[derive(Default)]
pub struct CountingDependency {
    depends: AtomicUsize,
    notifies: AtomicUsize,
}

impl CountingDependency {
    pub fn depends(&self) -> usize {
        self.depends.load(Ordering::SeqCst)
    }

    pub fn notifies(&self) -> usize {
        self.notifies.load(Ordering::SeqCst)
    }
}

impl Dependency for CountingDependency {
    fn depend(&self) {
        self.depends.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self) {
        self.notifies.fetch_add(1, Ordering::SeqCst);
    }
}

/// A minimal reactive runtime: one scope at a time, torn down explicitly.
///
/// Every dependency it creates is kept so tests can inspect it by creation
/// order.
#[derive(Default)]
pub struct TestRuntime {
    in_scope: AtomicBool,
    dependencies: Mutex<Vec<Arc<CountingDependency>>>,
    disposers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl TestRuntime {
    /// Runs `computation` inside a reactive scope.
    pub fn scope<R>(&self, computation: impl FnOnce() -> R) -> R {
        self.in_scope.store(true, Ordering::SeqCst);
        let result = computation();
        self.in_scope.store(false, Ordering::SeqCst);
        result
    }

    /// Runs the disposal callbacks of every computation so far.
    pub fn tear_down(&self) {
        let disposers: Vec<_> = self.disposers.lock().drain(..).collect();
        for dispose in disposers {
            dispose();
        }
    }

    pub fn dependency(&self, index: usize) -> Option<Arc<CountingDependency>> {
        self.dependencies.lock().get(index).cloned()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.lock().len()
    }

    /// Total `notify()` calls across every dependency.
    pub fn total_notifies(&self) -> usize {
        self.dependencies.lock().iter().map(|d| d.notifies()).sum()
    }
}

impl ReactivityAdapter for TestRuntime {
    fn create(&self) -> Arc<dyn Dependency> {
        let dependency = Arc::new(CountingDependency::default());
        self.dependencies.lock().push(dependency.clone());
        dependency
    }

    fn is_in_scope(&self) -> bool {
        self.in_scope.load(Ordering::SeqCst)
    }

    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) -> bool {
        self.disposers.lock().push(callback);
        true
    }
}
