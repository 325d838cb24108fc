use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{DocumentStore, HealthCheck, RepoError};
use crate::domain::{Document, Record};

use super::PostgresDocumentStore;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    body: Json<Value>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl DocumentRow {
    fn into_record<T: Document>(self) -> Result<Record<T>, RepoError> {
        let data = serde_json::from_value(self.body.0).map_err(|err| {
            RepoError::corrupt(format!("{} `{}`: {err}", T::COLLECTION, self.id))
        })?;
        Ok(Record {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            data,
        })
    }
}

fn encode<T: Document>(data: &T) -> Result<Json<Value>, RepoError> {
    serde_json::to_value(data)
        .map(Json)
        .map_err(RepoError::from_persistence)
}

#[async_trait]
impl<T: Document> DocumentStore<T> for PostgresDocumentStore {
    async fn find_all(&self) -> Result<Vec<Record<T>>, RepoError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, body, created_at, updated_at
            FROM documents
            WHERE collection = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(T::COLLECTION)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Record<T>>, RepoError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, body, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(T::COLLECTION)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(DocumentRow::into_record).transpose()
    }

    async fn create(&self, data: T) -> Result<Record<T>, RepoError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            RETURNING id, body, created_at, updated_at
            "#,
        )
        .bind(T::COLLECTION)
        .bind(Uuid::new_v4())
        .bind(encode(&data)?)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.into_record()
    }

    async fn update(&self, id: Uuid, data: T) -> Result<Option<Record<T>>, RepoError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            UPDATE documents
            SET body = $3, updated_at = now()
            WHERE collection = $1 AND id = $2
            RETURNING id, body, created_at, updated_at
            "#,
        )
        .bind(T::COLLECTION)
        .bind(id)
        .bind(encode(&data)?)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(DocumentRow::into_record).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(T::COLLECTION)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl HealthCheck for PostgresDocumentStore {
    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
