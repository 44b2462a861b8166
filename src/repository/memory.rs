//! In-memory object store. Backs tests and single-process setups; the trait
//! contract is the same as the Postgres backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::repository::{ObjectRecord, ObjectRepository, RepositoryError};

#[derive(Default)]
pub struct MemoryObjectRepository {
    objects: RwLock<HashMap<Uuid, ObjectRecord>>,
}

impl MemoryObjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("repository lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectRepository for MemoryObjectRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ObjectRecord>, RepositoryError> {
        let objects = self.objects.read().expect("repository lock poisoned");
        Ok(objects.get(&id).cloned())
    }

    async fn find_by_external_id(
        &self,
        entity: &str,
        external_id: &str,
    ) -> Result<Option<ObjectRecord>, RepositoryError> {
        let objects = self.objects.read().expect("repository lock poisoned");
        Ok(objects
            .values()
            .find(|record| {
                record.entity == entity && record.external_id.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn find_by_entity(&self, entity: &str) -> Result<Vec<ObjectRecord>, RepositoryError> {
        let objects = self.objects.read().expect("repository lock poisoned");
        Ok(objects.values().filter(|record| record.entity == entity).cloned().collect())
    }

    async fn find_by_attribute(
        &self,
        entity: &str,
        attribute: &str,
        value: &Json,
    ) -> Result<Vec<ObjectRecord>, RepositoryError> {
        let objects = self.objects.read().expect("repository lock poisoned");
        Ok(objects
            .values()
            .filter(|record| {
                record.entity == entity
                    && record.values.iter().any(|v| {
                        v.attribute == attribute
                            && match &v.scalar {
                                // Array-valued attributes match on containment
                                Some(Json::Array(items)) => items.contains(value),
                                Some(stored) => stored == value,
                                None => false,
                            }
                    })
            })
            .cloned()
            .collect())
    }

    async fn save_graph(&self, records: &[ObjectRecord]) -> Result<(), RepositoryError> {
        let mut objects = self.objects.write().expect("repository lock poisoned");
        for record in records {
            objects.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn update_sync_state(
        &self,
        id: Uuid,
        uri: Option<&str>,
        external_id: Option<&str>,
        has_errors: bool,
    ) -> Result<(), RepositoryError> {
        let mut objects = self.objects.write().expect("repository lock poisoned");
        let record = objects.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        record.uri = uri.map(|u| u.to_string());
        record.external_id = external_id.map(|e| e.to_string());
        record.has_errors = has_errors;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut objects = self.objects.write().expect("repository lock poisoned");
        objects.remove(&id).ok_or(RepositoryError::NotFound(id))?;
        Ok(())
    }
}
