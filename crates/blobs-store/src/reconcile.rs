//! Garbage collection of blobs no content field references any more.
//!
//! Liveness always comes from the field tables. The ledger is only used to
//! find candidates, and a missing ledger row never makes a blob deletable
//! by [`ReconciliationJob::run`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::database::{Database, FieldTable, LiveKeyStaging};
use crate::error::{BlobStoreError, Result};
use crate::key::BlobKey;
use crate::locks::KeyLockTable;
use crate::provider::BlobStorageProvider;

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Distinct keys referenced by content fields
    pub live: usize,
    /// Candidate keys with no live reference
    pub unused: usize,
    /// Objects removed from external storage
    pub deleted: usize,
    /// Candidates that were already gone from external storage
    pub missing: usize,
    /// Physical deletes that errored; retried on a later run or sweep
    pub failed: usize,
    /// Candidates written again after the metadata phase, left in place
    pub skipped: usize,
}

enum DeleteOutcome {
    Deleted,
    Missing,
    Skipped,
    Failed,
}

impl ReconcileStats {
    fn record(&mut self, outcome: DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => self.deleted += 1,
            DeleteOutcome::Missing => self.missing += 1,
            DeleteOutcome::Skipped => self.skipped += 1,
            DeleteOutcome::Failed => self.failed += 1,
        }
    }
}

/// Deletes blobs that are in the ledger but referenced by no content field.
#[derive(Debug, Clone)]
pub struct ReconciliationJob {
    db: Database,
    storage: Arc<dyn BlobStorageProvider>,
    locks: KeyLockTable,
    scope: String,
}

impl ReconciliationJob {
    /// `locks` must be the table the write path uses, so physical deletes
    /// serialize with writes to the same key.
    pub fn new(
        db: Database,
        storage: Arc<dyn BlobStorageProvider>,
        locks: KeyLockTable,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            db,
            storage,
            locks,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// One full pass: scan, prune the ledger, then delete objects.
    ///
    /// Callers must not run two passes concurrently.
    pub async fn run(&self) -> Result<ReconcileStats> {
        info!(scope = %self.scope, "starting blob reconciliation");

        let mut stats = ReconcileStats::default();

        let live = collect_live_keys(&self.db, &self.scope).await?;
        stats.live = live.len();

        let unused = prune_unreferenced(&self.db, &live).await?;
        stats.unused = unused.len();

        // One key at a time; a failure never aborts the batch
        for key in &unused {
            let outcome = self.delete_physical(key).await;
            stats.record(outcome);
        }

        let pruned = self.locks.prune_idle();
        debug!(pruned, "pruned idle key locks");

        info!(
            live = stats.live,
            unused = stats.unused,
            deleted = stats.deleted,
            missing = stats.missing,
            failed = stats.failed,
            skipped = stats.skipped,
            "blob reconciliation complete"
        );

        Ok(stats)
    }

    /// Delete external objects that are neither live nor in the ledger.
    ///
    /// Catches blobs whose ledger row was pruned by [`run`](Self::run) but
    /// whose physical delete failed. Object keys that are not blob keys are
    /// left alone.
    pub async fn sweep_orphans(&self) -> Result<ReconcileStats> {
        info!(scope = %self.scope, "starting orphan sweep");

        let mut stats = ReconcileStats::default();

        let live = collect_live_keys(&self.db, &self.scope).await?;
        stats.live = live.len();

        let listed = self.storage.list_keys().await?;
        for raw in listed {
            let key = match raw.parse::<BlobKey>() {
                Ok(key) => key,
                Err(_) => {
                    debug!(object = %raw, "ignoring non-blob object");
                    continue;
                }
            };
            if live.contains(&key) {
                continue;
            }
            // Ledgered keys belong to the regular pass
            if self.db.ledger_contains(&key).await? {
                continue;
            }

            stats.unused += 1;
            let outcome = self.delete_physical(&key).await;
            stats.record(outcome);
        }

        self.locks.prune_idle();

        info!(
            live = stats.live,
            orphans = stats.unused,
            deleted = stats.deleted,
            failed = stats.failed,
            skipped = stats.skipped,
            "orphan sweep complete"
        );

        Ok(stats)
    }

    /// Delete one object under its write lock.
    ///
    /// A ledger row for the key means a write landed after the metadata
    /// phase, so the object is kept.
    async fn delete_physical(&self, key: &BlobKey) -> DeleteOutcome {
        let lock = self.locks.get_lock(key);
        let _guard = lock.lock().await;

        match self.db.ledger_contains(key).await {
            Ok(true) => {
                info!(key = %key, "blob rewritten during reconciliation, keeping it");
                return DeleteOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "failed to re-check ledger before delete");
                return DeleteOutcome::Failed;
            }
        }

        match self.storage.delete(&key.to_string()).await {
            Ok(true) => {
                debug!(key = %key, "deleted unreferenced blob");
                DeleteOutcome::Deleted
            }
            Ok(false) => DeleteOutcome::Missing,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to delete unreferenced blob");
                DeleteOutcome::Failed
            }
        }
    }
}

/// Every blob key referenced by a blob-typed field in `scope`.
///
/// Values that do not parse as keys are skipped.
pub async fn collect_live_keys(db: &Database, scope: &str) -> Result<HashSet<BlobKey>> {
    let fields = db.enumerate_blob_fields(scope).await?;

    let mut live = HashSet::new();
    let mut rejected = 0usize;
    for field_id in fields {
        for table in FieldTable::ALL {
            for value in db.select_field_values(table, field_id).await? {
                match BlobKey::from_field_value(&value) {
                    Ok(key) => {
                        live.insert(key);
                    }
                    Err(e) => {
                        debug!(table = table.table_name(), %field_id, error = %e, "skipping field value");
                        rejected += 1;
                    }
                }
            }
        }
    }

    if rejected > 0 {
        warn!(rejected, scope, "blob field values that are not blob keys were ignored");
    }
    Ok(live)
}

/// Delete ledger rows for keys outside `live`, returning those keys.
///
/// Staging, the anti-join and the delete share one transaction; any error
/// rolls all of it back.
pub(crate) async fn prune_unreferenced(
    db: &Database,
    live: &HashSet<BlobKey>,
) -> Result<Vec<BlobKey>> {
    let mut tx = db.begin().await?;

    let mut staging = LiveKeyStaging::create(&mut tx).await?;
    staging.insert_live_keys(live).await?;
    let mut unused = staging.select_unreferenced_keys().await?;
    unused.retain(|key| !live.contains(key));
    let removed = staging.delete_unreferenced_rows().await?;
    staging.drop_table().await?;

    tx.commit().await?;

    debug!(keys = unused.len(), rows = removed, "pruned unreferenced ledger rows");
    Ok(unused)
}

/// Errors worth another attempt: store and metadata failures.
fn is_transient(error: &BlobStoreError) -> bool {
    error.is_store_unavailable() || error.is_metadata_failure()
}

/// Run `task` until it succeeds or `policy` is exhausted.
///
/// Exhaustion, or an error that is not transient, abandons the task and
/// yields `None`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut task: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match task().await {
            Ok(value) => return Some(value),
            Err(e) if is_transient(&e) && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(operation, attempt, ?delay, error = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(operation, attempt, error = %e, "giving up");
                return None;
            }
        }
    }
    None
}
