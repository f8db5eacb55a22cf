use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use crate::database::Database;

pub type TemplateId = Uuid;
pub type FieldId = Uuid;

/// Physical field storage tables, split by versioning scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTable {
    Shared,
    Unversioned,
    Versioned,
    Archived,
}

impl FieldTable {
    pub const ALL: [FieldTable; 4] = [
        FieldTable::Shared,
        FieldTable::Unversioned,
        FieldTable::Versioned,
        FieldTable::Archived,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            FieldTable::Shared => "shared_fields",
            FieldTable::Unversioned => "unversioned_fields",
            FieldTable::Versioned => "versioned_fields",
            FieldTable::Archived => "archived_fields",
        }
    }
}

impl Database {
    /// Declare a template in `scope`.
    pub async fn create_template(&self, scope: &str, name: &str) -> Result<TemplateId, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO templates (id, name, scope) VALUES (?1, ?2, ?3)")
            .bind(id.to_string())
            .bind(name)
            .bind(scope)
            .execute(&**self)
            .await?;
        Ok(id)
    }

    /// Declare a field on a template.
    pub async fn add_template_field(
        &self,
        template_id: TemplateId,
        name: &str,
        is_blob: bool,
    ) -> Result<FieldId, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO template_fields (id, template_id, name, is_blob) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id.to_string())
        .bind(template_id.to_string())
        .bind(name)
        .bind(is_blob as i64)
        .execute(&**self)
        .await?;
        Ok(id)
    }

    /// Every blob-typed field declared by templates in `scope`.
    ///
    /// Templates without blob fields produce no rows.
    pub async fn enumerate_blob_fields(&self, scope: &str) -> Result<Vec<FieldId>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT f.id
            FROM template_fields f
            JOIN templates t ON t.id = f.template_id
            WHERE t.scope = ?1 AND f.is_blob = 1
            "#,
        )
        .bind(scope)
        .fetch_all(&**self)
        .await?;

        let mut fields = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get("id");
            match raw.parse::<Uuid>() {
                Ok(id) => fields.push(id),
                Err(_) => warn!(field_id = %raw, "invalid field id in template_fields, skipping"),
            }
        }
        Ok(fields)
    }

    /// Distinct non-null, non-empty values stored for `field_id` in `table`.
    pub async fn select_field_values(
        &self,
        table: FieldTable,
        field_id: FieldId,
    ) -> Result<Vec<String>, sqlx::Error> {
        let sql = format!(
            "SELECT DISTINCT value FROM {} WHERE field_id = ?1 AND value IS NOT NULL AND value != ''",
            table.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(field_id.to_string())
            .fetch_all(&**self)
            .await?;
        Ok(rows.iter().map(|row| row.get("value")).collect())
    }

    /// Replace the value of `field_id` on `item_id` in `table`.
    ///
    /// Language, version and archival columns take their defaults.
    pub async fn set_field_value(
        &self,
        table: FieldTable,
        item_id: Uuid,
        field_id: FieldId,
        value: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.begin().await?;

        let delete = format!(
            "DELETE FROM {} WHERE item_id = ?1 AND field_id = ?2",
            table.table_name()
        );
        sqlx::query(&delete)
            .bind(item_id.to_string())
            .bind(field_id.to_string())
            .execute(&mut *tx)
            .await?;

        let insert = format!(
            "INSERT INTO {} (item_id, field_id, value) VALUES (?1, ?2, ?3)",
            table.table_name()
        );
        sqlx::query(&insert)
            .bind(item_id.to_string())
            .bind(field_id.to_string())
            .bind(value)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    /// Remove the value of `field_id` on `item_id` from `table`.
    pub async fn clear_field_value(
        &self,
        table: FieldTable,
        item_id: Uuid,
        field_id: FieldId,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE item_id = ?1 AND field_id = ?2",
            table.table_name()
        );
        let result = sqlx::query(&sql)
            .bind(item_id.to_string())
            .bind(field_id.to_string())
            .execute(&**self)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
