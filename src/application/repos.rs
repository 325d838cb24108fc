//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Document, Record};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("stored document is unreadable: {0}")]
    Corrupt(String),
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn corrupt(err: impl std::fmt::Display) -> Self {
        Self::Corrupt(err.to_string())
    }
}

/// Typed CRUD over one document collection.
///
/// `update` replaces the document body wholesale and bumps `updated_at`;
/// `update` and `delete` report a missing id as `None` / `false` rather than
/// an error.
#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Record<T>>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Record<T>>, RepoError>;

    async fn create(&self, data: T) -> Result<Record<T>, RepoError>;

    async fn update(&self, id: Uuid, data: T) -> Result<Option<Record<T>>, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
