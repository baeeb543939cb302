//! Document store
//!
//! The reconciler only needs [`DocumentStore::upsert_by_id`]: one atomic
//! "update the document with this key, or insert it" operation.

use async_trait::async_trait;
use chrono::Utc;
use docsync_common::{Error, Result};
use serde_json::Value as JsonValue;
use sqlx::{Row, SqlitePool};

use crate::document::{Document, RecordId};
use crate::normalize::normalize;
use crate::utils::retry_on_lock;

/// Result of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

/// Key-addressed document storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Set `fields` on the document `id` in `collection`, creating it if absent
    ///
    /// Every supplied top-level field replaces the stored one; stored fields
    /// not named in `fields` are kept. Must be atomic per call.
    async fn upsert_by_id(
        &self,
        collection: &str,
        id: &RecordId,
        fields: &Document,
    ) -> Result<UpsertKind>;
}

/// SQLite-backed [`DocumentStore`]
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    lock_wait_ms: u64,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool, lock_wait_ms: u64) -> Self {
        Self { pool, lock_wait_ms }
    }

    /// Round-trip a trivial query to check the database is reachable
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Load a stored document, fields in stored order
    pub async fn find_by_id(&self, collection: &str, id: &RecordId) -> Result<Option<Document>> {
        let id = id.to_string();

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT name, value FROM document_fields
            WHERE collection = ? AND id = ?
            ORDER BY position
            "#,
        )
        .bind(collection)
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let mut document = Document::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get("name");
            let text: String = row.get("value");
            let raw: JsonValue = serde_json::from_str(&text).map_err(|e| {
                Error::Internal(format!("Corrupt stored field {}.{}: {}", id, name, e))
            })?;
            let value = normalize(raw).map_err(|e| {
                Error::Internal(format!("Corrupt stored field {}.{}: {}", id, name, e))
            })?;
            document.insert(name, value);
        }

        Ok(Some(document))
    }

    /// Number of documents in `collection`
    pub async fn count(&self, collection: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn upsert_by_id(
        &self,
        collection: &str,
        id: &RecordId,
        fields: &Document,
    ) -> Result<UpsertKind> {
        // Prepare all data BEFORE acquiring database connection
        let id = id.to_string();
        let encoded = fields
            .iter()
            .map(|(name, value)| {
                serde_json::to_string(&value.to_extended_json())
                    .map(|text| (name.clone(), text))
                    .map_err(|e| Error::Internal(format!("Failed to encode field {}: {}", name, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let pool = &self.pool;
        let id = id.as_str();
        let encoded = encoded.as_slice();
        retry_on_lock("upsert_by_id", self.lock_wait_ms, move || {
            upsert_fields(pool, collection, id, encoded)
        })
        .await
    }
}

/// One transaction per document.
///
/// The first statement is a write, so SQLite takes the write lock before
/// anything is read and holds it until commit.
async fn upsert_fields(
    pool: &SqlitePool,
    collection: &str,
    id: &str,
    fields: &[(String, String)],
) -> Result<UpsertKind> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO documents (collection, id, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(collection)
    .bind(id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    if !inserted {
        sqlx::query("UPDATE documents SET updated_at = ? WHERE collection = ? AND id = ?")
            .bind(&now)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    for (name, value) in fields {
        // New fields go after existing ones; replaced fields keep their slot
        sqlx::query(
            r#"
            INSERT INTO document_fields (collection, id, name, position, value)
            VALUES (
                ?1, ?2, ?3,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM document_fields
                 WHERE collection = ?1 AND id = ?2),
                ?4
            )
            ON CONFLICT (collection, id, name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(name)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(if inserted {
        UpsertKind::Inserted
    } else {
        UpsertKind::Updated
    })
}
