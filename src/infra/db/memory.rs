use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{DocumentStore, HealthCheck, RepoError};
use crate::domain::{Document, Record};

#[derive(Debug, Clone)]
struct StoredDocument {
    body: Value,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl StoredDocument {
    fn to_record<T: Document>(&self, id: Uuid) -> Result<Record<T>, RepoError> {
        let data = serde_json::from_value(self.body.clone())
            .map_err(|err| RepoError::corrupt(format!("{} `{id}`: {err}", T::COLLECTION)))?;
        Ok(Record {
            id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            data,
        })
    }
}

/// Process-local store used when no database is configured, and in tests.
///
/// Documents are kept JSON-encoded per collection, the same shape the
/// Postgres store persists.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    collections: DashMap<&'static str, HashMap<Uuid, StoredDocument>>,
    available: AtomicBool,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            collections: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing store going away: every call fails until it is
    /// made available again.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), RepoError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepoError::from_persistence("document store unavailable"))
        }
    }
}

fn encode<T: Document>(data: &T) -> Result<Value, RepoError> {
    serde_json::to_value(data).map_err(RepoError::from_persistence)
}

#[async_trait]
impl<T: Document> DocumentStore<T> for InMemoryDocumentStore {
    async fn find_all(&self) -> Result<Vec<Record<T>>, RepoError> {
        self.ensure_available()?;
        let Some(collection) = self.collections.get(T::COLLECTION) else {
            return Ok(Vec::new());
        };
        let mut records = collection
            .iter()
            .map(|(id, stored)| stored.to_record(*id))
            .collect::<Result<Vec<Record<T>>, _>>()?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Record<T>>, RepoError> {
        self.ensure_available()?;
        self.collections
            .get(T::COLLECTION)
            .and_then(|collection| collection.get(&id).map(|stored| stored.to_record(id)))
            .transpose()
    }

    async fn create(&self, data: T) -> Result<Record<T>, RepoError> {
        self.ensure_available()?;
        let body = encode(&data)?;
        let record = Record::new(data);
        self.collections.entry(T::COLLECTION).or_default().insert(
            record.id,
            StoredDocument {
                body,
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
        );
        Ok(record)
    }

    async fn update(&self, id: Uuid, data: T) -> Result<Option<Record<T>>, RepoError> {
        self.ensure_available()?;
        let body = encode(&data)?;
        let Some(mut collection) = self.collections.get_mut(T::COLLECTION) else {
            return Ok(None);
        };
        let Some(stored) = collection.get_mut(&id) else {
            return Ok(None);
        };
        stored.body = body;
        stored.updated_at = OffsetDateTime::now_utc();

        Ok(Some(Record {
            id,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            data,
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        self.ensure_available()?;
        Ok(self
            .collections
            .get_mut(T::COLLECTION)
            .is_some_and(|mut collection| collection.remove(&id).is_some()))
    }
}

#[async_trait]
impl HealthCheck for InMemoryDocumentStore {
    async fn ping(&self) -> Result<(), RepoError> {
        self.ensure_available()
    }
}
