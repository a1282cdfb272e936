//! Database operations for the documents table.

use daybook_engine::{Document, Fields, Snapshot, Timestamp};
use serde_json::Value;
use sqlx::{PgPool, Row};

/// A stored document row from the database.
#[derive(Debug)]
pub struct StoredDocument {
    pub collection: String,
    pub doc_id: String,
    pub fields: Value,
    #[allow(dead_code)]
    pub created_at: i64,
    #[allow(dead_code)]
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            collection: row.try_get("collection")?,
            doc_id: row.try_get("doc_id")?,
            fields: row.try_get("fields")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredDocument {
    /// Convert database row to an engine document.
    ///
    /// A `fields` column that is not a JSON object yields an empty field map.
    pub fn to_document(&self) -> Document {
        let fields = match &self.fields {
            Value::Object(map) => map.clone(),
            other => {
                tracing::warn!(
                    collection = %self.collection,
                    id = %self.doc_id,
                    kind = ?other,
                    "Stored fields are not an object"
                );
                Fields::new()
            }
        };
        Document::new(self.doc_id.clone(), fields)
    }
}

/// Insert a new document.
pub async fn insert_document(
    pool: &PgPool,
    collection: &str,
    doc_id: &str,
    fields: &Fields,
    now: Timestamp,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, doc_id, fields, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        "#,
    )
    .bind(collection)
    .bind(doc_id)
    .bind(Value::Object(fields.clone()))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Merge `fields` into an existing document.
///
/// Returns `false` if the document does not exist.
pub async fn update_fields(
    pool: &PgPool,
    collection: &str,
    doc_id: &str,
    fields: &Fields,
    now: Timestamp,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET fields = fields || $3, updated_at = $4
        WHERE collection = $1 AND doc_id = $2
        "#,
    )
    .bind(collection)
    .bind(doc_id)
    .bind(Value::Object(fields.clone()))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a document. Deleting a missing document is not an error.
///
/// Returns whether a row was removed.
pub async fn delete_document(
    pool: &PgPool,
    collection: &str,
    doc_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND doc_id = $2")
        .bind(collection)
        .bind(doc_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Read every document of a collection as a snapshot, oldest first.
pub async fn list_documents(
    pool: &PgPool,
    collection: &str,
    read_time: Timestamp,
) -> Result<Snapshot, sqlx::Error> {
    let rows: Vec<StoredDocument> = sqlx::query_as(
        r#"
        SELECT collection, doc_id, fields, created_at, updated_at
        FROM documents
        WHERE collection = $1
        ORDER BY created_at ASC, doc_id ASC
        "#,
    )
    .bind(collection)
    .fetch_all(pool)
    .await?;

    Ok(Snapshot {
        collection: collection.to_string(),
        documents: rows.iter().map(StoredDocument::to_document).collect(),
        read_time,
    })
}
