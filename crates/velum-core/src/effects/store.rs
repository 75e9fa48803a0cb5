//! Durable entity store interface
//!
//! The environment provides a document-oriented KV store that indexes
//! entities by a fixed set of tag keys chosen at construction. The node
//! cache serializes entries to JSON strings; the store treats them as
//! opaque.

use async_trait::async_trait;

/// Storage operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Entity absent.
    #[error("entity not found: {0}")]
    NotFound(String),
    /// A write used a tag key that was not declared at construction.
    #[error("tag key not declared: {0}")]
    UndeclaredTag(String),
    /// Stored payload could not be produced.
    #[error("corrupt entity {uid}: {message}")]
    Corrupt {
        /// Entity key
        uid: String,
        /// Underlying cause
        message: String,
    },
    /// Backend failure.
    #[error("store failure: {0}")]
    Backend(String),
}

/// Per-entity outcome of a batched lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLookup {
    /// Entity key that was looked up.
    pub uid: String,
    /// The payload, or why it is unavailable.
    pub data: Result<String, StoreError>,
}

/// Durable entity store with tag indexes.
///
/// Implementations declare their tag keys at construction (the node cache
/// requires at least `parentUid`, `isShared`, `isTrashed` and `volumeId`)
/// and must reject writes carrying undeclared keys. All operations are
/// individually atomic.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Write an entity, replacing data and tags. Idempotent.
    async fn set_entity(
        &self,
        uid: &str,
        data: String,
        tags: &[(String, String)],
    ) -> Result<(), StoreError>;

    /// Read one entity; `None` when absent.
    async fn get_entity(&self, uid: &str) -> Result<Option<String>, StoreError>;

    /// Read many entities, yielding one outcome per requested uid in
    /// request order.
    async fn entities(&self, uids: &[String]) -> Result<Vec<EntityLookup>, StoreError>;

    /// Read all entities carrying `value` under the declared tag `key`, in
    /// insertion order.
    async fn entities_by_tag(&self, key: &str, value: &str)
        -> Result<Vec<EntityLookup>, StoreError>;

    /// Remove entities; absent uids are ignored.
    async fn remove_entities(&self, uids: &[String]) -> Result<(), StoreError>;

    /// Drop everything.
    async fn purge(&self) -> Result<(), StoreError>;
}
