//! In-memory effect implementations
//!
//! Fast doubles for tests and simulations: an entity store that keeps
//! everything in an insertion-ordered map, and a telemetry sink that
//! collects events for assertions.

use crate::effects::store::{EntityLookup, EntityStore, StoreError};
use crate::effects::telemetry::{MetricEvent, Telemetry};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct StoredEntity {
    data: String,
    tags: HashMap<String, String>,
}

/// Entity store backed by an insertion-ordered in-memory map.
#[derive(Debug)]
pub struct MemoryEntityStore {
    declared_tags: Vec<String>,
    entities: RwLock<IndexMap<String, StoredEntity>>,
}

impl MemoryEntityStore {
    /// Create a store declaring the given tag keys.
    pub fn new(declared_tags: &[&str]) -> Self {
        Self {
            declared_tags: declared_tags.iter().map(|t| (*t).to_owned()).collect(),
            entities: RwLock::new(IndexMap::new()),
        }
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Corrupt a stored payload, for cache-eviction tests.
    pub fn corrupt_entity(&self, uid: &str, data: impl Into<String>) {
        if let Some(entity) = self.entities.write().get_mut(uid) {
            entity.data = data.into();
        }
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn set_entity(
        &self,
        uid: &str,
        data: String,
        tags: &[(String, String)],
    ) -> Result<(), StoreError> {
        for (key, _) in tags {
            if !self.declared_tags.contains(key) {
                return Err(StoreError::UndeclaredTag(key.clone()));
            }
        }
        let tags = tags.iter().cloned().collect();
        self.entities
            .write()
            .insert(uid.to_owned(), StoredEntity { data, tags });
        Ok(())
    }

    async fn get_entity(&self, uid: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entities.read().get(uid).map(|e| e.data.clone()))
    }

    async fn entities(&self, uids: &[String]) -> Result<Vec<EntityLookup>, StoreError> {
        let entities = self.entities.read();
        Ok(uids
            .iter()
            .map(|uid| EntityLookup {
                uid: uid.clone(),
                data: entities
                    .get(uid)
                    .map(|e| e.data.clone())
                    .ok_or_else(|| StoreError::NotFound(uid.clone())),
            })
            .collect())
    }

    async fn entities_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<EntityLookup>, StoreError> {
        if !self.declared_tags.iter().any(|t| t == key) {
            return Err(StoreError::UndeclaredTag(key.to_owned()));
        }
        let entities = self.entities.read();
        Ok(entities
            .iter()
            .filter(|(_, e)| e.tags.get(key).map(String::as_str) == Some(value))
            .map(|(uid, e)| EntityLookup {
                uid: uid.clone(),
                data: Ok(e.data.clone()),
            })
            .collect())
    }

    async fn remove_entities(&self, uids: &[String]) -> Result<(), StoreError> {
        let mut entities = self.entities.write();
        for uid in uids {
            entities.shift_remove(uid);
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StoreError> {
        self.entities.write().clear();
        Ok(())
    }
}

/// Telemetry sink that collects events for assertions.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<MetricEvent>>,
}

impl MemoryTelemetry {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }
}

impl Telemetry for MemoryTelemetry {
    fn record(&self, event: MetricEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn rejects_undeclared_tags() {
        let store = MemoryEntityStore::new(&["volumeId"]);
        let err = store
            .set_entity("uid", "{}".to_owned(), &tags(&[("color", "red")]))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UndeclaredTag("color".to_owned()));
    }

    #[tokio::test]
    async fn batched_lookup_reports_missing_uids() {
        let store = MemoryEntityStore::new(&["volumeId"]);
        store
            .set_entity("a", "1".to_owned(), &tags(&[("volumeId", "v")]))
            .await
            .unwrap();
        let looked_up = store
            .entities(&["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();
        assert_eq!(looked_up[0].data, Ok("1".to_owned()));
        assert_eq!(
            looked_up[1].data,
            Err(StoreError::NotFound("b".to_owned()))
        );
    }

    #[tokio::test]
    async fn tag_queries_preserve_insertion_order() {
        let store = MemoryEntityStore::new(&["parentUid"]);
        for uid in ["x", "y", "z"] {
            store
                .set_entity(uid, uid.to_owned(), &tags(&[("parentUid", "p")]))
                .await
                .unwrap();
        }
        let children = store.entities_by_tag("parentUid", "p").await.unwrap();
        let uids: Vec<_> = children.iter().map(|l| l.uid.as_str()).collect();
        assert_eq!(uids, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn purge_drops_everything() {
        let store = MemoryEntityStore::new(&[]);
        store.set_entity("a", "1".to_owned(), &[]).await.unwrap();
        store.purge().await.unwrap();
        assert!(store.is_empty());
    }
}
