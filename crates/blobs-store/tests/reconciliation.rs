//! Integration tests for blob reconciliation

mod common;

use std::time::Duration;

use blobs_store::{BlobKey, FieldTable, ReconcileStats, RetryPolicy, KEY_WIDTH};
use bytes::Bytes;
use chrono::Utc;
use common::SCOPE;
use uuid::Uuid;

async fn write(fx: &common::Fixture, key: &BlobKey) {
    fx.provider
        .set_blob_stream(Bytes::from_static(b"payload"), key)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreferenced_blob_is_deleted_from_both_stores() {
    let fx = common::setup().await;
    let field = common::blob_field(&fx.db, SCOPE).await;
    let (b1, b2, b3) = (BlobKey::new(), BlobKey::new(), BlobKey::new());

    for key in [&b1, &b2, &b3] {
        write(&fx, key).await;
    }
    common::reference(&fx.db, FieldTable::Versioned, field, &b1).await;
    common::reference(&fx.db, FieldTable::Versioned, field, &b2).await;

    let stats = fx.provider.cleanup_blobs().await.unwrap();
    assert_eq!(
        stats,
        ReconcileStats {
            live: 2,
            unused: 1,
            deleted: 1,
            ..Default::default()
        }
    );

    assert!(!fx.db.ledger_contains(&b3).await.unwrap());
    assert!(!fx.storage.contains(&b3).await);
    for key in [&b1, &b2] {
        assert!(fx.db.ledger_contains(key).await.unwrap());
        assert!(fx.storage.contains(key).await);
    }
}

#[tokio::test]
async fn test_deleted_set_is_ledger_minus_live() {
    let fx = common::setup().await;
    let field = common::blob_field(&fx.db, SCOPE).await;

    let ledgered: Vec<BlobKey> = (0..6).map(|_| BlobKey::new()).collect();
    for key in &ledgered {
        write(&fx, key).await;
    }

    // live through every table, plus one live key that was never ledgered
    let tables = [
        FieldTable::Shared,
        FieldTable::Unversioned,
        FieldTable::Archived,
    ];
    for (key, table) in ledgered.iter().zip(tables) {
        common::reference(&fx.db, table, field, key).await;
    }
    let unledgered = BlobKey::new();
    fx.storage.seed(&unledgered.to_string(), b"untracked").await;
    common::reference(&fx.db, FieldTable::Versioned, field, &unledgered).await;

    let job = fx.provider.reconciliation_job().unwrap();
    let stats = job.run().await.unwrap();
    assert_eq!(stats.live, 4);
    assert_eq!(stats.unused, 3);
    assert_eq!(stats.deleted, 3);

    let mut deleted = fx.storage.deleted_keys();
    deleted.sort();
    let mut expected: Vec<String> = ledgered[3..].iter().map(|k| k.to_string()).collect();
    expected.sort();
    assert_eq!(deleted, expected);

    assert!(fx.storage.contains(&unledgered).await);
    for key in &ledgered[..3] {
        assert!(fx.storage.contains(key).await);
    }
}

#[tokio::test]
async fn test_overlong_values_are_clamped_and_bad_values_skipped() {
    let fx = common::setup().await;
    let field = common::blob_field(&fx.db, SCOPE).await;
    let clamped = BlobKey::new();
    let dropped = BlobKey::new();

    write(&fx, &clamped).await;
    write(&fx, &dropped).await;

    let legacy = format!("{}|legacy-suffix", clamped.to_field_value());
    assert!(legacy.len() > KEY_WIDTH);
    fx.db
        .set_field_value(FieldTable::Shared, Uuid::new_v4(), field, Some(legacy.as_str()))
        .await
        .unwrap();
    fx.db
        .set_field_value(FieldTable::Shared, Uuid::new_v4(), field, Some("{not-a-key}"))
        .await
        .unwrap();

    let stats = fx.provider.cleanup_blobs().await.unwrap();
    assert_eq!(stats.live, 1);
    assert_eq!(stats.deleted, 1);
    assert!(fx.storage.contains(&clamped).await);
    assert!(!fx.storage.contains(&dropped).await);
}

#[tokio::test]
async fn test_other_scopes_do_not_keep_blobs_alive() {
    let fx = common::setup().await;
    let web_field = common::blob_field(&fx.db, "web").await;
    let key = BlobKey::new();

    write(&fx, &key).await;
    common::reference(&fx.db, FieldTable::Versioned, web_field, &key).await;

    let stats = fx.provider.cleanup_blobs().await.unwrap();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.deleted, 1);
}

#[tokio::test]
async fn test_failed_delete_does_not_abort_batch() {
    let fx = common::setup().await;
    common::blob_field(&fx.db, SCOPE).await;
    let stuck = BlobKey::new();
    let others: Vec<BlobKey> = (0..3).map(|_| BlobKey::new()).collect();

    write(&fx, &stuck).await;
    for key in &others {
        write(&fx, key).await;
    }
    fx.storage.fail_delete_of(&stuck);

    let stats = fx.provider.cleanup_blobs().await.unwrap();
    assert_eq!(stats.unused, 4);
    assert_eq!(stats.deleted, 3);
    assert_eq!(stats.failed, 1);

    // ledger row is gone, so only the sweep can find it now
    assert!(fx.storage.contains(&stuck).await);
    assert_eq!(fx.db.ledger_row_count().await.unwrap(), 0);
    assert_eq!(fx.provider.cleanup_blobs().await.unwrap().unused, 0);

    fx.storage.clear_delete_failures();
    let job = fx.provider.reconciliation_job().unwrap();
    let swept = job.sweep_orphans().await.unwrap();
    assert_eq!(swept.deleted, 1);
    assert!(!fx.storage.contains(&stuck).await);
}

#[tokio::test]
async fn test_sweep_only_deletes_unreferenced_unledgered_blobs() {
    let fx = common::setup().await;
    let field = common::blob_field(&fx.db, SCOPE).await;
    let live = BlobKey::new();
    let ledgered = BlobKey::new();
    let orphan = BlobKey::new();

    fx.storage.seed(&live.to_string(), b"live").await;
    common::reference(&fx.db, FieldTable::Shared, field, &live).await;
    write(&fx, &ledgered).await;
    fx.storage.seed(&orphan.to_string(), b"orphan").await;
    fx.storage.seed("thumbnails/cache.bin", b"other").await;

    let job = fx.provider.reconciliation_job().unwrap();
    let stats = job.sweep_orphans().await.unwrap();

    assert_eq!(stats.unused, 1);
    assert_eq!(stats.deleted, 1);
    assert_eq!(fx.storage.deleted_keys(), vec![orphan.to_string()]);
    assert!(fx.storage.contains(&live).await);
    assert!(fx.storage.contains(&ledgered).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_after_metadata_phase_is_not_deleted() {
    let fx = common::setup().await;
    common::blob_field(&fx.db, SCOPE).await;
    let key = BlobKey::new();
    write(&fx, &key).await;

    // hold the key's write lock so the job parks before its physical delete
    let lock = fx.provider.locks().get_lock(&key);
    let guard = lock.clone().lock_owned().await;

    let job = fx.provider.reconciliation_job().unwrap();
    let run = tokio::spawn(async move { job.run().await });

    while fx.db.ledger_contains(&key).await.unwrap() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // the concurrent writer lands while the job waits on the lock
    fx.db
        .insert_ledger_row(&key, 0, Utc::now(), &[])
        .await
        .unwrap();
    drop(guard);

    let stats = run.await.unwrap().unwrap();
    assert_eq!(stats.unused, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.deleted, 0);
    assert!(fx.storage.contains(&key).await);
    assert!(fx.storage.deleted_keys().is_empty());
}

#[tokio::test]
async fn test_cleanup_abandoned_after_retries() {
    let fx = common::setup().await;
    let provider = fx.provider.clone().with_cleanup_retry(RetryPolicy {
        max_attempts: 2,
        backoff_ms: 1,
        max_backoff_ms: 1,
    });

    sqlx::query("DROP TABLE templates")
        .execute(&*fx.db)
        .await
        .unwrap();

    assert!(provider.cleanup_blobs().await.is_none());
}

#[tokio::test]
async fn test_run_prunes_idle_locks() {
    let fx = common::setup().await;
    for _ in 0..3 {
        write(&fx, &BlobKey::new()).await;
    }
    assert_eq!(fx.provider.locks().len(), 3);

    fx.provider.cleanup_blobs().await.unwrap();
    assert!(fx.provider.locks().is_empty());
}

#[tokio::test]
async fn test_live_blob_with_uppercase_ledger_row_is_kept() {
    let fx = common::setup().await;
    let field = common::blob_field(&fx.db, SCOPE).await;

    let live = BlobKey::new();
    fx.storage.seed(&live.to_string(), b"still referenced").await;
    common::reference(&fx.db, FieldTable::Versioned, field, &live).await;

    sqlx::query("INSERT INTO blobs (id, blob_id, idx, created_at, data) VALUES (?1, ?2, 0, ?3, x'')")
        .bind(Uuid::new_v4().to_string())
        .bind(live.to_string().to_uppercase())
        .bind(Utc::now().timestamp())
        .execute(&*fx.db)
        .await
        .unwrap();

    let job = fx.provider.reconciliation_job().unwrap();
    let stats = job.run().await.unwrap();
    assert_eq!(
        stats,
        ReconcileStats {
            live: 1,
            ..Default::default()
        }
    );

    assert!(fx.storage.contains(&live).await);
    assert!(fx.storage.deleted_keys().is_empty());
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
        .fetch_one(&*fx.db)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}
