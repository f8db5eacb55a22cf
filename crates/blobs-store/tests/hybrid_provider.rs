//! Integration tests for the hybrid read/write paths

mod common;

use std::sync::Arc;
use std::time::Duration;

use blobs_store::{BlobKey, DefaultBlobPersistence};
use bytes::Bytes;
use common::MockProvider;

#[tokio::test]
async fn test_write_read_delete_scenario() {
    let fx = common::setup().await;
    let key = BlobKey::new();

    fx.provider
        .set_blob_stream(Bytes::from_static(&[0x01, 0x02, 0x03]), &key)
        .await
        .unwrap();

    let data = fx.provider.get_blob_stream(&key).await.unwrap().unwrap();
    assert_eq!(&data[..], &[0x01, 0x02, 0x03]);
    assert!(fx.provider.blob_stream_exists(&key).await.unwrap());

    assert!(fx.provider.remove_blob_stream(&key).await.unwrap());
    assert!(fx.provider.get_blob_stream(&key).await.unwrap().is_none());
    assert!(!fx.provider.blob_stream_exists(&key).await.unwrap());
    assert!(!fx.provider.remove_blob_stream(&key).await.unwrap());
}

#[tokio::test]
async fn test_write_inserts_one_ledger_row_per_write() {
    let fx = common::setup().await;
    let key = BlobKey::new();

    for payload in [&b"first"[..], &b"second"[..]] {
        fx.provider
            .set_blob_stream(Bytes::copy_from_slice(payload), &key)
            .await
            .unwrap();
    }

    assert_eq!(fx.db.ledger_row_count().await.unwrap(), 2);
    assert!(fx.db.ledger_contains(&key).await.unwrap());
    // ledger rows carry no payload
    assert!(!fx.db.blob_data_exists(&key).await.unwrap());
    assert_eq!(
        fx.provider.get_blob_stream(&key).await.unwrap().unwrap(),
        Bytes::from_static(b"second")
    );
}

#[tokio::test]
async fn test_unconfigured_delegates_everything() {
    let fx = common::setup_unconfigured().await;
    let key = BlobKey::new();

    assert!(!fx.provider.is_external_configured());
    fx.provider
        .set_blob_stream(Bytes::from_static(b"local"), &key)
        .await
        .unwrap();

    assert_eq!(
        fx.provider.get_blob_stream(&key).await.unwrap().unwrap(),
        Bytes::from_static(b"local")
    );
    assert!(fx.fallback.exists(&key).await.unwrap());

    // no lock taken, no ledger row, nothing uploaded
    assert!(fx.provider.locks().is_empty());
    assert_eq!(fx.db.ledger_row_count().await.unwrap(), 0);
    assert!(!fx.storage.contains(&key).await);

    assert!(fx.provider.remove_blob_stream(&key).await.unwrap());
    assert!(!fx.fallback.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_read_falls_back_on_external_miss() {
    let fx = common::setup().await;
    let key = BlobKey::new();

    fx.fallback
        .put(Bytes::from_static(b"legacy"), &key)
        .await
        .unwrap();

    assert!(fx.provider.blob_stream_exists(&key).await.unwrap());
    assert_eq!(
        fx.provider.get_blob_stream(&key).await.unwrap().unwrap(),
        Bytes::from_static(b"legacy")
    );
}

#[tokio::test]
async fn test_read_falls_back_when_store_unavailable() {
    let fx = common::setup().await;
    let key = BlobKey::new();

    fx.fallback
        .put(Bytes::from_static(b"legacy"), &key)
        .await
        .unwrap();
    fx.storage.fail_reads(true);

    assert!(fx.provider.blob_stream_exists(&key).await.unwrap());
    assert_eq!(
        fx.provider.get_blob_stream(&key).await.unwrap().unwrap(),
        Bytes::from_static(b"legacy")
    );
}

#[tokio::test]
async fn test_external_delete_is_final() {
    let fx = common::setup().await;
    let key = BlobKey::new();

    fx.fallback
        .put(Bytes::from_static(b"legacy"), &key)
        .await
        .unwrap();

    // nothing external to delete, and default persistence is not consulted
    assert!(!fx.provider.remove_blob_stream(&key).await.unwrap());
    assert!(fx.fallback.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_failed_put_surfaces_error_and_releases_lock() {
    let fx = common::setup().await;
    let key = BlobKey::new();
    fx.storage.fail_puts(true);

    let err = fx
        .provider
        .set_blob_stream(Bytes::from_static(b"data"), &key)
        .await
        .unwrap_err();

    assert!(err.is_store_unavailable());
    assert_eq!(fx.db.ledger_row_count().await.unwrap(), 0);
    assert!(fx.provider.locks().get_lock(&key).try_lock().is_ok());
}

#[tokio::test]
async fn test_failed_ledger_insert_keeps_payload_and_releases_lock() {
    let fx = common::setup().await;
    let key = BlobKey::new();

    sqlx::query("DROP TABLE blobs")
        .execute(&*fx.db)
        .await
        .unwrap();

    let err = fx
        .provider
        .set_blob_stream(Bytes::from_static(b"data"), &key)
        .await
        .unwrap_err();

    assert!(err.is_metadata_failure());
    assert!(fx.storage.contains(&key).await);
    assert!(fx.provider.locks().get_lock(&key).try_lock().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_writes_are_serialized() {
    let fx = common::setup_with(MockProvider::new().with_put_delay(Duration::from_millis(20))).await;
    let provider = Arc::new(fx.provider);
    let key = BlobKey::new();

    let tasks: Vec<_> = (0..4u8)
        .map(|i| {
            let provider = provider.clone();
            tokio::spawn(async move {
                provider
                    .set_blob_stream(Bytes::from(vec![i; 16]), &key)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(!fx.storage.saw_same_key_overlap());
    assert_eq!(fx.storage.max_concurrent_puts(), 1);
    assert_eq!(fx.db.ledger_row_count().await.unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_key_writes_overlap() {
    let fx = common::setup_with(MockProvider::new().with_put_delay(Duration::from_millis(100))).await;
    let provider = &fx.provider;
    let first = BlobKey::new();
    let second = BlobKey::new();

    let (a, b) = tokio::join!(
        provider.set_blob_stream(Bytes::from_static(b"a"), &first),
        provider.set_blob_stream(Bytes::from_static(b"b"), &second),
    );
    a.unwrap();
    b.unwrap();

    assert!(!fx.storage.saw_same_key_overlap());
    assert_eq!(fx.storage.max_concurrent_puts(), 2);
}

#[tokio::test]
async fn test_large_payload_round_trips() {
    let fx = common::setup().await;
    let key = BlobKey::new();
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    fx.provider
        .set_blob_stream(Bytes::from(payload.clone()), &key)
        .await
        .unwrap();
    assert_eq!(
        fx.provider.get_blob_stream(&key).await.unwrap().unwrap(),
        Bytes::from(payload)
    );
}
