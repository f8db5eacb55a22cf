//! Shared fixtures for blob store integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blobs_store::{
    BlobKey, BlobSink, BlobStorageProvider, Database, FieldId, FieldTable, HybridDataProvider,
    ObjectStoreProvider, Result, SqlBlobPersistence,
};
use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

pub const SCOPE: &str = "master";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A configured hybrid provider over in-memory stores.
///
/// Default persistence gets its own database so ledger rows and default
/// payloads never share a table in assertions.
pub struct Fixture {
    pub db: Database,
    pub fallback_db: Database,
    pub fallback: Arc<SqlBlobPersistence>,
    pub storage: Arc<MockProvider>,
    pub provider: HybridDataProvider,
}

pub async fn setup() -> Fixture {
    setup_with(MockProvider::new()).await
}

pub async fn setup_with(storage: MockProvider) -> Fixture {
    init_tracing();

    let db = Database::in_memory().await.unwrap();
    let fallback_db = Database::in_memory().await.unwrap();
    let fallback = Arc::new(SqlBlobPersistence::new(fallback_db.clone()));
    let storage = Arc::new(storage);

    let provider = HybridDataProvider::new(
        db.clone(),
        fallback.clone(),
        Some(storage.clone() as Arc<dyn BlobStorageProvider>),
    );

    Fixture {
        db,
        fallback_db,
        fallback,
        storage,
        provider,
    }
}

/// Same stores, no external provider.
pub async fn setup_unconfigured() -> Fixture {
    let fixture = setup().await;
    let provider = HybridDataProvider::new(fixture.db.clone(), fixture.fallback.clone(), None);
    Fixture {
        provider,
        ..fixture
    }
}

/// Declare a template in `scope` with one blob-typed field.
pub async fn blob_field(db: &Database, scope: &str) -> FieldId {
    let template = db.create_template(scope, "File").await.unwrap();
    db.add_template_field(template, "Blob", true).await.unwrap()
}

/// Reference `key` from a new item through `field` in `table`.
pub async fn reference(db: &Database, table: FieldTable, field: FieldId, key: &BlobKey) {
    db.set_field_value(table, Uuid::new_v4(), field, Some(key.to_field_value().as_str()))
        .await
        .unwrap();
}

fn injected(operation: &str) -> blobs_store::BlobStoreError {
    object_store::Error::Generic {
        store: "mock",
        source: format!("injected {operation} failure").into(),
    }
    .into()
}

/// In-memory provider that records put concurrency and fails on demand.
#[derive(Debug)]
pub struct MockProvider {
    inner: ObjectStoreProvider,
    put_delay: Duration,
    active_puts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    same_key_overlap: AtomicBool,
    fail_puts: AtomicBool,
    fail_reads: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
    deletes: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            inner: ObjectStoreProvider::in_memory(),
            put_delay: Duration::ZERO,
            active_puts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            same_key_overlap: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            failing_deletes: Mutex::new(HashSet::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, key: &BlobKey) {
        self.failing_deletes.lock().insert(key.to_string());
    }

    pub fn clear_delete_failures(&self) {
        self.failing_deletes.lock().clear();
    }

    /// Whether two puts for one key ever ran at the same time.
    pub fn saw_same_key_overlap(&self) -> bool {
        self.same_key_overlap.load(Ordering::SeqCst)
    }

    /// Highest number of puts in flight at once, across all keys.
    pub fn max_concurrent_puts(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Keys passed to `delete`, in call order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }

    /// Upload directly, bypassing the hybrid write path.
    pub async fn seed(&self, key: &str, payload: &'static [u8]) {
        self.inner.put(Bytes::from_static(payload), key).await.unwrap();
    }

    pub async fn contains(&self, key: &BlobKey) -> bool {
        self.inner.exists(&key.to_string()).await.unwrap()
    }
}

#[async_trait]
impl BlobStorageProvider for MockProvider {
    async fn exists(&self, key: &str) -> Result<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("exists"));
        }
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str, sink: &mut BlobSink<'_>) -> Result<u64> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.inner.get(key, sink).await
    }

    async fn put(&self, payload: Bytes, key: &str) -> Result<()> {
        {
            let mut active = self.active_puts.lock();
            let count = active.entry(key.to_string()).or_insert(0);
            if *count > 0 {
                self.same_key_overlap.store(true, Ordering::SeqCst);
            }
            *count += 1;
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        let result = if self.fail_puts.load(Ordering::SeqCst) {
            Err(injected("put"))
        } else {
            self.inner.put(payload, key).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.active_puts.lock().get_mut(key) {
            *count -= 1;
        }
        result
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.lock().push(key.to_string());
        let failing = self.failing_deletes.lock().contains(key);
        if failing {
            return Err(injected("delete"));
        }
        self.inner.delete(key).await
    }

    async fn download_to_file(&self, key: &str, path: &Path) -> Result<()> {
        self.inner.download_to_file(key, path).await
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.inner.list_keys().await
    }
}
