use sqlx::{Row, SqliteConnection};

use crate::database::ledger_queries::parse_keys;
use crate::key::BlobKey;

const STAGING_TABLE: &str = "blobs_in_use";

/// Ledger id in the canonical rendering staged for live keys.
const LEDGER_ID: &str = "lower(trim(blob_id, '{}'))";

/// Temporary table of live keys, scoped to one connection.
///
/// Intended to run inside a transaction so the unused-set computation and
/// the ledger deletion see the same snapshot.
pub struct LiveKeyStaging<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LiveKeyStaging<'c> {
    /// (Re)create the staging table on `conn`.
    pub async fn create(conn: &'c mut SqliteConnection) -> Result<Self, sqlx::Error> {
        sqlx::query(&format!("DROP TABLE IF EXISTS temp.{STAGING_TABLE}"))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!(
            "CREATE TEMP TABLE {STAGING_TABLE} (id TEXT PRIMARY KEY)"
        ))
        .execute(&mut *conn)
        .await?;
        Ok(Self { conn })
    }

    /// Stage `keys` as live. Duplicates are ignored.
    pub async fn insert_live_keys<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k BlobKey>,
    ) -> Result<(), sqlx::Error> {
        let sql = format!("INSERT OR IGNORE INTO temp.{STAGING_TABLE} (id) VALUES (?1)");
        for key in keys {
            sqlx::query(&sql)
                .bind(key.to_string())
                .execute(&mut *self.conn)
                .await?;
        }
        Ok(())
    }

    /// Keys present in the ledger but not staged as live.
    ///
    /// Ledger ids are compared case-insensitively and without braces.
    pub async fn select_unreferenced_keys(&mut self) -> Result<Vec<BlobKey>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT blob_id FROM blobs WHERE {LEDGER_ID} NOT IN (SELECT id FROM temp.{STAGING_TABLE})"
        ))
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(parse_keys(rows.iter().map(|row| row.get("blob_id"))))
    }

    /// Delete every ledger row whose key is not staged as live.
    pub async fn delete_unreferenced_rows(&mut self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&format!(
            "DELETE FROM blobs WHERE {LEDGER_ID} NOT IN (SELECT id FROM temp.{STAGING_TABLE})"
        ))
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn drop_table(mut self) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("DROP TABLE IF EXISTS temp.{STAGING_TABLE}"))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
