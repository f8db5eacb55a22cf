use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use crate::database::Database;
use crate::key::BlobKey;

impl Database {
    /// Record a physical write of `key` in the `blobs` table.
    ///
    /// Writes through external storage pass an empty `data` payload; the
    /// row only exists to speed up reconciliation.
    pub async fn insert_ledger_row(
        &self,
        key: &BlobKey,
        index: i64,
        created_at: DateTime<Utc>,
        data: &[u8],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO blobs (id, blob_id, idx, created_at, data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key.to_string())
        .bind(index)
        .bind(created_at.timestamp())
        .bind(data)
        .execute(&**self)
        .await?;
        Ok(())
    }

    /// Whether any row for `key` exists in the `blobs` table.
    pub async fn ledger_contains(&self, key: &BlobKey) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM blobs WHERE blob_id = ?1) AS present")
            .bind(key.to_string())
            .fetch_one(&**self)
            .await?;
        Ok(row.get::<i64, _>("present") != 0)
    }

    /// Distinct keys present in the `blobs` table.
    pub async fn ledger_keys(&self) -> Result<Vec<BlobKey>, sqlx::Error> {
        let rows = sqlx::query("SELECT DISTINCT blob_id FROM blobs")
            .fetch_all(&**self)
            .await?;
        Ok(parse_keys(rows.iter().map(|row| row.get("blob_id"))))
    }

    /// Concatenated payload rows for `key`, ignoring empty ledger rows.
    pub async fn read_blob_data(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT data FROM blobs WHERE blob_id = ?1 AND length(data) > 0 ORDER BY idx",
        )
        .bind(key.to_string())
        .fetch_all(&**self)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut data = Vec::new();
        for row in rows {
            let chunk: Vec<u8> = row.get("data");
            data.extend_from_slice(&chunk);
        }
        Ok(Some(data))
    }

    /// Whether a non-empty payload row exists for `key`.
    pub async fn blob_data_exists(&self, key: &BlobKey) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM blobs WHERE blob_id = ?1 AND length(data) > 0) AS present",
        )
        .bind(key.to_string())
        .fetch_one(&**self)
        .await?;
        Ok(row.get::<i64, _>("present") != 0)
    }

    /// Replace every row for `key` with a single payload row.
    pub async fn replace_blob_data(&self, key: &BlobKey, data: &[u8]) -> Result<(), sqlx::Error> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM blobs WHERE blob_id = ?1")
            .bind(key.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO blobs (id, blob_id, idx, created_at, data)
            VALUES (?1, ?2, 0, ?3, ?4)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key.to_string())
        .bind(Utc::now().timestamp())
        .bind(data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    /// Delete every row for `key`. Returns whether anything was removed.
    pub async fn delete_blob_rows(&self, key: &BlobKey) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blobs WHERE blob_id = ?1")
            .bind(key.to_string())
            .execute(&**self)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Parse stored `blob_id` values, skipping rows that are not valid keys.
pub(crate) fn parse_keys<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<BlobKey> {
    raw.filter_map(|value| match value.parse::<BlobKey>() {
        Ok(key) => Some(key),
        Err(_) => {
            warn!(blob_id = %value, "invalid blob id in ledger, skipping");
            None
        }
    })
    .collect()
}
