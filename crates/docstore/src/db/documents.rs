//! Per-user document repository.
//!
//! Queries are built at runtime (`sqlx::query_as`) since the document shape
//! is opaque JSON.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;

use atelier_core::{DocumentKind, UserId};

use super::RepositoryError;

/// A document as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub data: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    data: Json<Value>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for StoredDocument {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        match row.data.0 {
            Value::Object(data) => Ok(Self {
                data,
                updated_at: row.updated_at,
            }),
            other => Err(RepositoryError::DataCorruption(format!(
                "document is not an object: {other}"
            ))),
        }
    }
}

/// Repository for document operations.
pub struct DocumentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DocumentRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a document.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored value is not an object.
    pub async fn get(
        &self,
        user: &UserId,
        kind: DocumentKind,
    ) -> Result<Option<StoredDocument>, RepositoryError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r"
            SELECT data, updated_at
            FROM docstore.document
            WHERE user_id = $1 AND kind = $2
            ",
        )
        .bind(user.as_str())
        .bind(kind.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(StoredDocument::try_from).transpose()
    }

    /// Merge top-level `fields` into a document, creating it if absent.
    ///
    /// Fields present in `fields` replace stored ones; others are kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    /// Returns `RepositoryError::DataCorruption` if the result is not an object.
    pub async fn merge(
        &self,
        user: &UserId,
        kind: DocumentKind,
        fields: &Map<String, Value>,
    ) -> Result<StoredDocument, RepositoryError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r"
            INSERT INTO docstore.document (user_id, kind, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, kind) DO UPDATE
            SET data = docstore.document.data || EXCLUDED.data,
                updated_at = NOW()
            RETURNING data, updated_at
            ",
        )
        .bind(user.as_str())
        .bind(kind.as_str())
        .bind(Json(fields))
        .fetch_one(self.pool)
        .await?;

        StoredDocument::try_from(row)
    }

    /// Delete a document. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete(&self, user: &UserId, kind: DocumentKind) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM docstore.document
            WHERE user_id = $1 AND kind = $2
            ",
        )
        .bind(user.as_str())
        .bind(kind.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_must_hold_an_object() {
        let row = DocumentRow {
            data: Json(json!({"items": []})),
            updated_at: Utc::now(),
        };
        let doc = StoredDocument::try_from(row).unwrap();
        assert!(doc.data.contains_key("items"));

        let row = DocumentRow {
            data: Json(json!([1, 2])),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            StoredDocument::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
