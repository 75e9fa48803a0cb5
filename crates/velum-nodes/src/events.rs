//! Event handling and subscriptions
//!
//! Backend change events are applied to the caches in received order; each
//! application is idempotent and failures log and continue, never aborting
//! the stream. Subscriptions let clients observe the child-set of a folder,
//! the sharing collections and the trash.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use velum_cache::{CryptoCache, NodeCache, SharingCache};
use velum_core::{DecryptedNode, NodeUid, VolumeId};

/// A backend change event.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The volume's listing may have drifted; refetch lazily.
    TreeRefresh {
        /// Affected volume.
        volume_id: VolumeId,
    },
    /// The volume is gone (membership lost, volume deleted).
    TreeRemove {
        /// Affected volume.
        volume_id: VolumeId,
    },
    /// A node appeared. No partial record is synthesized; the parent's
    /// listing is invalidated instead.
    NodeCreated {
        /// Parent of the new node.
        parent_uid: NodeUid,
        /// The new node.
        node_uid: NodeUid,
    },
    /// A node changed.
    NodeUpdated {
        /// The changed node.
        node_uid: NodeUid,
        /// Its (possibly new) parent.
        parent_uid: Option<NodeUid>,
        /// Whether it is shared now.
        is_shared: bool,
        /// Whether it sits in the trash now.
        is_trashed: bool,
        /// When the event happened; used as the trash time.
        event_time: DateTime<Utc>,
    },
    /// A node is gone.
    NodeDeleted {
        /// The removed node.
        node_uid: NodeUid,
    },
    /// The shared-with-me collection changed.
    SharedWithMeUpdated,
}

/// What a subscription callback receives.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    /// Update or removal.
    pub kind: UpdateKind,
    /// Affected node; absent for collection-level pings.
    pub uid: Option<NodeUid>,
    /// The new record, when one is available.
    pub node: Option<DecryptedNode>,
}

/// Kind of a subscription update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// The entity changed or appeared.
    Update,
    /// The entity left the observed collection.
    Remove,
}

/// What a subscription observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionScope {
    /// Child-set of one folder.
    FolderChildren(NodeUid),
    /// Nodes the caller shared.
    SharedByMe,
    /// Nodes shared with the caller.
    SharedWithMe,
    /// Trashed nodes.
    Trash,
}

type Callback = Arc<dyn Fn(SubscriptionUpdate) + Send + Sync>;

/// Handle returned by [`NodesEvents::subscribe`]; pass it back to
/// [`NodesEvents::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

/// Event application and subscription dispatch.
pub struct NodesEvents {
    cache: Arc<NodeCache>,
    crypto_cache: Arc<CryptoCache>,
    sharing_cache: Arc<SharingCache>,
    subscriptions: RwLock<HashMap<u64, (SubscriptionScope, Callback)>>,
    next_id: AtomicU64,
}

impl NodesEvents {
    /// Build the handler over the caches it reconciles.
    pub fn new(
        cache: Arc<NodeCache>,
        crypto_cache: Arc<CryptoCache>,
        sharing_cache: Arc<SharingCache>,
    ) -> Self {
        Self {
            cache,
            crypto_cache,
            sharing_cache,
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for a scope.
    pub fn subscribe(
        &self,
        scope: SubscriptionScope,
        callback: impl Fn(SubscriptionUpdate) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions
            .write()
            .insert(id, (scope, Arc::new(callback)));
        SubscriptionHandle(id)
    }

    /// Drop a subscription. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscriptions.write().remove(&handle.0);
    }

    fn emit(&self, scope: &SubscriptionScope, update: SubscriptionUpdate) {
        let callbacks: Vec<Callback> = self
            .subscriptions
            .read()
            .values()
            .filter(|(s, _)| s == scope)
            .map(|(_, c)| c.clone())
            .collect();
        for callback in callbacks {
            callback(update.clone());
        }
    }

    /// Tell folder subscribers a node appeared or changed, and trash
    /// subscribers when its trash state is visible.
    pub fn notify_node_updated(&self, node: &DecryptedNode) {
        if let Some(parent) = &node.parent_uid {
            self.emit(
                &SubscriptionScope::FolderChildren(parent.clone()),
                SubscriptionUpdate {
                    kind: UpdateKind::Update,
                    uid: Some(node.uid.clone()),
                    node: Some(node.clone()),
                },
            );
        }
        let kind = if node.is_trashed() {
            UpdateKind::Update
        } else {
            UpdateKind::Remove
        };
        self.emit(
            &SubscriptionScope::Trash,
            SubscriptionUpdate {
                kind,
                uid: Some(node.uid.clone()),
                node: Some(node.clone()),
            },
        );
    }

    /// Tell folder subscribers a node was created.
    pub fn notify_node_created(&self, node: &DecryptedNode) {
        if let Some(parent) = &node.parent_uid {
            self.emit(
                &SubscriptionScope::FolderChildren(parent.clone()),
                SubscriptionUpdate {
                    kind: UpdateKind::Update,
                    uid: Some(node.uid.clone()),
                    node: Some(node.clone()),
                },
            );
        }
    }

    /// Tell folder subscribers a node moved between folders.
    pub fn notify_node_moved(&self, node: &DecryptedNode, old_parent: Option<&NodeUid>) {
        if let Some(old_parent) = old_parent {
            if node.parent_uid.as_ref() != Some(old_parent) {
                self.emit(
                    &SubscriptionScope::FolderChildren(old_parent.clone()),
                    SubscriptionUpdate {
                        kind: UpdateKind::Remove,
                        uid: Some(node.uid.clone()),
                        node: None,
                    },
                );
            }
        }
        self.notify_node_updated(node);
    }

    /// Tell subscribers nodes were permanently deleted.
    pub fn notify_nodes_deleted(&self, removed: &[(NodeUid, Option<NodeUid>)]) {
        for (uid, parent) in removed {
            if let Some(parent) = parent {
                self.emit(
                    &SubscriptionScope::FolderChildren(parent.clone()),
                    SubscriptionUpdate {
                        kind: UpdateKind::Remove,
                        uid: Some(uid.clone()),
                        node: None,
                    },
                );
            }
            self.emit(
                &SubscriptionScope::Trash,
                SubscriptionUpdate {
                    kind: UpdateKind::Remove,
                    uid: Some(uid.clone()),
                    node: None,
                },
            );
        }
    }

    /// Ping shared-collection subscribers.
    pub fn notify_sharing_changed(&self, scope: SubscriptionScope) {
        self.emit(
            &scope,
            SubscriptionUpdate {
                kind: UpdateKind::Update,
                uid: None,
                node: None,
            },
        );
    }

    /// Apply a batch of events in received order.
    pub async fn apply_events(&self, events: impl IntoIterator<Item = NodeEvent>) {
        for event in events {
            self.apply_event(event).await;
        }
    }

    /// Apply one event. Idempotent; failures log and continue.
    pub async fn apply_event(&self, event: NodeEvent) {
        debug!(?event, "applying node event");
        match event {
            NodeEvent::TreeRefresh { volume_id } => {
                self.cache.set_nodes_stale_from_volume(&volume_id).await;
            }
            NodeEvent::TreeRemove { volume_id } => {
                self.cache.remove_volume(&volume_id).await;
                self.crypto_cache.remove_volume(&volume_id);
            }
            NodeEvent::NodeCreated {
                parent_uid,
                node_uid,
            } => {
                if self.cache.get_node(&parent_uid).await.is_some() {
                    self.cache.reset_folder_children_loaded(&parent_uid).await;
                }
                self.emit(
                    &SubscriptionScope::FolderChildren(parent_uid),
                    SubscriptionUpdate {
                        kind: UpdateKind::Update,
                        uid: Some(node_uid),
                        node: None,
                    },
                );
            }
            NodeEvent::NodeUpdated {
                node_uid,
                parent_uid,
                is_shared,
                is_trashed,
                event_time,
            } => {
                let Some(mut node) = self.cache.get_node(&node_uid).await else {
                    return;
                };
                node.is_stale = true;
                node.parent_uid = parent_uid;
                node.is_shared = is_shared;
                if is_trashed {
                    if node.trash_time.is_none() {
                        node.trash_time = Some(event_time);
                    }
                } else {
                    node.trash_time = None;
                }
                self.cache.set_node(&node).await;
                self.notify_node_updated(&node);
            }
            NodeEvent::NodeDeleted { node_uid } => {
                let parent = self
                    .cache
                    .get_node(&node_uid)
                    .await
                    .and_then(|n| n.parent_uid);
                self.cache
                    .remove_nodes(std::slice::from_ref(&node_uid))
                    .await;
                self.crypto_cache.remove(&node_uid);
                self.notify_nodes_deleted(&[(node_uid, parent)]);
            }
            NodeEvent::SharedWithMeUpdated => {
                self.sharing_cache.reset();
                self.notify_sharing_changed(SubscriptionScope::SharedWithMe);
            }
        }
    }
}

impl std::fmt::Debug for NodesEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodesEvents")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish_non_exhaustive()
    }
}
