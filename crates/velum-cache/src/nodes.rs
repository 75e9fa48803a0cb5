//! Node cache over the durable entity store
//!
//! Entries are serialized to a versioned JSON record holding public
//! metadata only; keys and content-key packets never reach the store.
//! Deserialization failures evict the offending entry and report a miss.
//! Write failures are logged and swallowed: a cold cache degrades
//! performance, not correctness. Read failures that would lose data
//! (children listings) propagate instead.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use velum_core::effects::store::{EntityStore, StoreError};
use velum_core::{DecryptedNode, Error, NodeUid, Result, VolumeId};

/// Tag keys the entity store must declare for the node cache.
pub const NODE_CACHE_TAG_KEYS: &[&str] = &["parentUid", "isShared", "isTrashed", "volumeId"];

const RECORD_VERSION: u32 = 1;
const CHILDREN_LOADED_PREFIX: &str = "children-loaded:";

/// Everything the node cache persists, discriminated by kind so that tag
/// scans can tell marker entries from node entries.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum CachedRecord {
    /// A node entry.
    Node {
        version: u32,
        node: DecryptedNode,
    },
    /// Completeness marker: the folder's children were listed to the end.
    ChildrenLoaded { version: u32 },
}

/// Per-UID outcome of a batched cache lookup. A corrupt or unreadable entry
/// is evicted and reported as a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// The UID that was looked up.
    pub uid: NodeUid,
    /// The cached node, or `None` on a miss.
    pub node: Option<DecryptedNode>,
}

/// Cache of decrypted node metadata over the injected entity store.
pub struct NodeCache {
    store: Arc<dyn EntityStore>,
}

impl NodeCache {
    /// Wrap an entity store. The store must have been constructed with at
    /// least the [`NODE_CACHE_TAG_KEYS`] tag keys declared.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    fn node_tags(node: &DecryptedNode) -> Vec<(String, String)> {
        let mut tags = vec![
            (
                "isShared".to_owned(),
                if node.is_shared { "true" } else { "false" }.to_owned(),
            ),
            (
                "isTrashed".to_owned(),
                if node.is_trashed() { "true" } else { "false" }.to_owned(),
            ),
            (
                "volumeId".to_owned(),
                node.tree_event_scope_id.as_str().to_owned(),
            ),
        ];
        if let Some(parent) = &node.parent_uid {
            tags.push(("parentUid".to_owned(), parent.as_str().to_owned()));
        }
        tags
    }

    fn decode(uid: &str, data: &str) -> Option<DecryptedNode> {
        match serde_json::from_str::<CachedRecord>(data) {
            Ok(CachedRecord::Node { version, node }) if version == RECORD_VERSION => Some(node),
            Ok(CachedRecord::Node { version, .. }) => {
                warn!(uid, version, "cached node has unknown record version");
                None
            }
            Ok(CachedRecord::ChildrenLoaded { .. }) => {
                warn!(uid, "cached node entry holds a marker record");
                None
            }
            Err(error) => {
                warn!(uid, %error, "cached node entry is corrupt");
                None
            }
        }
    }

    async fn evict(&self, uid: &str) {
        if let Err(error) = self.store.remove_entities(&[uid.to_owned()]).await {
            warn!(uid, %error, "failed to evict corrupt cache entry");
        }
    }

    /// Read one node; `None` on a miss, a corrupt entry or a store failure.
    pub async fn get_node(&self, uid: &NodeUid) -> Option<DecryptedNode> {
        let data = match self.store.get_entity(uid.as_str()).await {
            Ok(data) => data?,
            Err(error) => {
                warn!(uid = %uid, %error, "node cache read failed");
                return None;
            }
        };
        match Self::decode(uid.as_str(), &data) {
            Some(node) => Some(node),
            None => {
                self.evict(uid.as_str()).await;
                None
            }
        }
    }

    /// Write one node. Idempotent; failures are logged and swallowed.
    pub async fn set_node(&self, node: &DecryptedNode) {
        let record = CachedRecord::Node {
            version: RECORD_VERSION,
            node: node.clone(),
        };
        let data = match serde_json::to_string(&record) {
            Ok(data) => data,
            Err(error) => {
                warn!(uid = %node.uid, %error, "failed to serialize node for cache");
                return;
            }
        };
        if let Err(error) = self
            .store
            .set_entity(node.uid.as_str(), data, &Self::node_tags(node))
            .await
        {
            warn!(uid = %node.uid, %error, "node cache write failed");
        }
    }

    /// Remove nodes. Resets the children-loaded bit of each removed node's
    /// parent, and drops the nodes' own marker entries.
    pub async fn remove_nodes(&self, uids: &[NodeUid]) {
        let mut keys: Vec<String> = Vec::with_capacity(uids.len() * 2);
        for uid in uids {
            if let Some(node) = self.get_node(uid).await {
                if let Some(parent) = &node.parent_uid {
                    self.reset_folder_children_loaded(parent).await;
                }
            }
            keys.push(uid.as_str().to_owned());
            keys.push(format!("{CHILDREN_LOADED_PREFIX}{uid}"));
        }
        if let Err(error) = self.store.remove_entities(&keys).await {
            warn!(%error, "node cache removal failed");
        }
    }

    /// Read many nodes, one outcome per UID in request order.
    pub async fn iterate_nodes(&self, uids: &[NodeUid]) -> Vec<CacheLookup> {
        let keys: Vec<String> = uids.iter().map(|u| u.as_str().to_owned()).collect();
        let looked_up = match self.store.entities(&keys).await {
            Ok(looked_up) => looked_up,
            Err(error) => {
                warn!(%error, "node cache batch read failed");
                return uids
                    .iter()
                    .map(|uid| CacheLookup {
                        uid: uid.clone(),
                        node: None,
                    })
                    .collect();
            }
        };
        let mut lookups = Vec::with_capacity(looked_up.len());
        for entry in looked_up {
            let uid = NodeUid::from_raw(entry.uid);
            let node = match entry.data {
                Ok(data) => {
                    let decoded = Self::decode(uid.as_str(), &data);
                    if decoded.is_none() {
                        self.evict(uid.as_str()).await;
                    }
                    decoded
                }
                Err(StoreError::NotFound(_)) => None,
                Err(error) => {
                    warn!(uid = %uid, %error, "node cache read failed");
                    None
                }
            };
            lookups.push(CacheLookup { uid, node });
        }
        lookups
    }

    /// All cached children of a folder, in cache insertion order.
    pub async fn iterate_children(&self, parent_uid: &NodeUid) -> Result<Vec<DecryptedNode>> {
        let entries = self
            .store
            .entities_by_tag("parentUid", parent_uid.as_str())
            .await
            .map_err(|error| Error::internal(format!("children listing failed: {error}")))?;
        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.data {
                Ok(data) => {
                    if let Some(node) = Self::decode(&entry.uid, &data) {
                        children.push(node);
                    } else {
                        self.evict(&entry.uid).await;
                    }
                }
                Err(error) => warn!(uid = %entry.uid, %error, "skipping unreadable child"),
            }
        }
        Ok(children)
    }

    /// Whether a full children listing of this folder completed.
    pub async fn is_folder_children_loaded(&self, parent_uid: &NodeUid) -> bool {
        let key = format!("{CHILDREN_LOADED_PREFIX}{parent_uid}");
        match self.store.get_entity(&key).await {
            Ok(Some(data)) => matches!(
                serde_json::from_str::<CachedRecord>(&data),
                Ok(CachedRecord::ChildrenLoaded { .. })
            ),
            Ok(None) => false,
            Err(error) => {
                warn!(parent = %parent_uid, %error, "children-loaded read failed");
                false
            }
        }
    }

    /// Mark a folder's children listing as complete.
    pub async fn set_folder_children_loaded(&self, parent_uid: &NodeUid) {
        let key = format!("{CHILDREN_LOADED_PREFIX}{parent_uid}");
        let record = CachedRecord::ChildrenLoaded {
            version: RECORD_VERSION,
        };
        let tags = match parent_uid.volume_id() {
            Ok(volume) => vec![("volumeId".to_owned(), volume.as_str().to_owned())],
            Err(_) => Vec::new(),
        };
        let data = match serde_json::to_string(&record) {
            Ok(data) => data,
            Err(_) => return,
        };
        if let Err(error) = self.store.set_entity(&key, data, &tags).await {
            warn!(parent = %parent_uid, %error, "children-loaded write failed");
        }
    }

    /// Clear a folder's children-loaded bit.
    pub async fn reset_folder_children_loaded(&self, parent_uid: &NodeUid) {
        let key = format!("{CHILDREN_LOADED_PREFIX}{parent_uid}");
        if let Err(error) = self.store.remove_entities(&[key]).await {
            warn!(parent = %parent_uid, %error, "children-loaded reset failed");
        }
    }

    /// Mark every cached node of a volume stale. Marker entries are left
    /// alone: cached children remain listable, stale ones get reloaded.
    pub async fn set_nodes_stale_from_volume(&self, volume_id: &VolumeId) {
        let entries = match self
            .store
            .entities_by_tag("volumeId", volume_id.as_str())
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                warn!(volume = %volume_id, %error, "stale marking failed");
                return;
            }
        };
        for entry in entries {
            let Ok(data) = entry.data else { continue };
            match serde_json::from_str::<CachedRecord>(&data) {
                Ok(CachedRecord::Node { mut node, .. }) => {
                    node.is_stale = true;
                    self.set_node(&node).await;
                }
                Ok(CachedRecord::ChildrenLoaded { .. }) => {}
                Err(error) => {
                    warn!(uid = %entry.uid, %error, "cached entry is corrupt");
                    self.evict(&entry.uid).await;
                }
            }
        }
    }

    /// Drop every cached entry of a volume, markers included.
    pub async fn remove_volume(&self, volume_id: &VolumeId) {
        let entries = match self
            .store
            .entities_by_tag("volumeId", volume_id.as_str())
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                warn!(volume = %volume_id, %error, "volume removal failed");
                return;
            }
        };
        let keys: Vec<String> = entries.into_iter().map(|e| e.uid).collect();
        if let Err(error) = self.store.remove_entities(&keys).await {
            warn!(volume = %volume_id, %error, "volume removal failed");
        }
    }

    /// Drop everything.
    pub async fn purge(&self) {
        if let Err(error) = self.store.purge().await {
            warn!(%error, "node cache purge failed");
        }
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache").finish_non_exhaustive()
    }
}
