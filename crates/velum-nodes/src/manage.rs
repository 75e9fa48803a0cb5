//! Nodes management: the mutation paths
//!
//! Every mutation validates its input up front, fetches the current node
//! and the required keys, runs the crypto step, and only then calls the
//! API. Cache writes and event emission happen strictly after successful
//! API confirmation; a failed mutation never half-commits cache state.

use crate::access::NodesAccess;
use crate::events::NodesEvents;
use crate::parse::parse_revision;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use velum_api::{ApiService, CreateFolderPayload, MoveNodePayload, RenameNodePayload};
use velum_cache::CryptoCache;
use velum_core::effects::shares::ShareService;
use velum_core::xattr::ParsedFolderExtendedAttributes;
use velum_core::{
    validate_node_name, AbortSignal, DecryptedNode, DecryptedRevision, Error, HashKey, NodeType,
    NodeUid, PrivateKey, Result, RevisionUid, VolumeId,
};
use velum_crypto::CryptoService;

/// Options for [`NodesManagement::rename_node`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    /// Allow renaming a root node. Roots have no parent hash key, so no
    /// hash is computed or sent.
    pub allow_rename_root_node: bool,
}

/// Per-node outcome of a progress iterator.
#[derive(Debug)]
pub struct NodeOpOutcome {
    /// The node the outcome refers to.
    pub uid: NodeUid,
    /// Success, or the per-node failure.
    pub result: Result<()>,
}

/// The node mutation paths.
pub struct NodesManagement {
    api: ApiService,
    access: Arc<NodesAccess>,
    crypto: Arc<CryptoService>,
    crypto_cache: Arc<CryptoCache>,
    shares: Arc<dyn ShareService>,
    events: Arc<NodesEvents>,
}

impl NodesManagement {
    /// Build the mutation paths over their collaborators.
    pub fn new(
        api: ApiService,
        access: Arc<NodesAccess>,
        crypto: Arc<CryptoService>,
        crypto_cache: Arc<CryptoCache>,
        shares: Arc<dyn ShareService>,
        events: Arc<NodesEvents>,
    ) -> Self {
        Self {
            api,
            access,
            crypto,
            crypto_cache,
            shares,
            events,
        }
    }

    /// The parent key and hash key governing a node's name: the parent
    /// node's keys, or the share key (with no hash key) for roots.
    async fn parent_context(
        &self,
        node: &DecryptedNode,
        abort: &AbortSignal,
    ) -> Result<(PrivateKey, Option<HashKey>)> {
        if let Some(parent_uid) = &node.parent_uid {
            let keys = self.access.node_keys(parent_uid, abort).await?;
            Ok((keys.key, keys.hash_key))
        } else if let Some(share_id) = &node.share_id {
            Ok((self.shares.share_key(share_id).await?, None))
        } else {
            Err(Error::internal(format!(
                "node {} has neither a parent nor a share",
                node.uid
            )))
        }
    }

    /// Rename a node in place.
    pub async fn rename_node(
        &self,
        uid: &NodeUid,
        new_name: &str,
        options: RenameOptions,
        abort: &AbortSignal,
    ) -> Result<DecryptedNode> {
        validate_node_name(new_name).map_err(|error| Error::validation(error.to_string()))?;
        let node = self.access.get_node(uid, abort).await?;
        if node.parent_uid.is_none() && !options.allow_rename_root_node {
            return Err(Error::validation("cannot rename a root node"));
        }

        let (session_keys, (parent_key, parent_hash_key)) = futures::try_join!(
            self.access.node_session_keys(uid, abort),
            self.parent_context(&node, abort)
        )?;

        let material = self
            .crypto
            .encrypt_rename(
                new_name,
                &session_keys.name_session_key,
                &parent_key,
                parent_hash_key.as_ref(),
            )
            .await?;
        if material.hash.is_none() && !options.allow_rename_root_node {
            return Err(Error::validation(
                "parent hash key unavailable, cannot compute the name hash",
            ));
        }

        self.api
            .rename_node(
                uid,
                node.hash.clone(),
                RenameNodePayload {
                    encrypted_name: material.encrypted_name,
                    name_signature_email: Some(material.name_signature_email.clone()),
                    hash: material.hash.clone(),
                },
                abort,
            )
            .await?;

        let mut updated = node;
        updated.name = Ok(new_name.to_owned());
        updated.name_author = Ok(Some(material.name_signature_email));
        if material.hash.is_some() {
            updated.hash = material.hash;
        }
        self.access.cache().set_node(&updated).await;
        self.events.notify_node_updated(&updated);
        Ok(updated)
    }

    /// Move a node under a new parent folder.
    pub async fn move_node(
        &self,
        uid: &NodeUid,
        new_parent_uid: &NodeUid,
        abort: &AbortSignal,
    ) -> Result<DecryptedNode> {
        let node = self.access.get_node(uid, abort).await?;
        if node.parent_uid.is_none() {
            return Err(Error::validation("cannot move a root node"));
        }
        let target = self.access.get_node(new_parent_uid, abort).await?;
        if target.node_type != NodeType::Folder {
            return Err(Error::validation("move target is not a folder"));
        }

        let (node_keys, target_keys, session_keys) = futures::try_join!(
            self.access.node_keys(uid, abort),
            self.access.node_keys(new_parent_uid, abort),
            self.access.node_session_keys(uid, abort)
        )?;

        // Anonymous nodes get a fresh signature under the caller's address
        // key; authored nodes must keep their original one.
        let anonymous = node.key_author == Ok(None);
        let material = self
            .crypto
            .encrypt_move(
                node.name.as_deref().ok(),
                &node_keys,
                &session_keys.name_session_key,
                &target_keys.key,
                target_keys.hash_key.as_ref(),
                anonymous,
            )
            .await?;

        self.api
            .move_node(
                uid,
                node.hash.clone(),
                MoveNodePayload {
                    parent_uid: new_parent_uid.clone(),
                    armored_passphrase: material.armored_passphrase,
                    armored_passphrase_signature: material.armored_passphrase_signature,
                    signature_email: material.signature_email,
                    encrypted_name: material.encrypted_name,
                    name_signature_email: Some(material.name_signature_email.clone()),
                    hash: material.hash.clone(),
                    content_hash: None,
                },
                abort,
            )
            .await?;

        let old_parent = node.parent_uid.clone();
        let mut updated = node;
        updated.parent_uid = Some(new_parent_uid.clone());
        updated.hash = Some(material.hash);
        updated.name_author = Ok(Some(material.name_signature_email));
        self.access.cache().set_node(&updated).await;
        self.access.notify_child_created(new_parent_uid).await;
        self.events.notify_node_moved(&updated, old_parent.as_ref());
        Ok(updated)
    }

    /// Move several nodes, yielding one outcome per node.
    pub fn move_nodes<'a>(
        &'a self,
        uids: Vec<NodeUid>,
        new_parent_uid: NodeUid,
        abort: AbortSignal,
    ) -> MoveNodesIter<'a> {
        MoveNodesIter {
            management: self,
            new_parent_uid,
            queue: uids.into(),
            abort,
            done: false,
        }
    }

    /// Move nodes to the trash, yielding one outcome per node.
    pub fn trash_nodes<'a>(&'a self, uids: Vec<NodeUid>, abort: AbortSignal) -> BatchMutationIter<'a> {
        BatchMutationIter::new(self, BatchOp::Trash, uids, abort)
    }

    /// Restore trashed nodes, yielding one outcome per node.
    pub fn restore_nodes<'a>(
        &'a self,
        uids: Vec<NodeUid>,
        abort: AbortSignal,
    ) -> BatchMutationIter<'a> {
        BatchMutationIter::new(self, BatchOp::Restore, uids, abort)
    }

    /// Permanently delete trashed nodes, yielding one outcome per node.
    /// Deleted UIDs are aggregated and announced once the iteration ends.
    pub fn delete_nodes<'a>(
        &'a self,
        uids: Vec<NodeUid>,
        abort: AbortSignal,
    ) -> BatchMutationIter<'a> {
        BatchMutationIter::new(self, BatchOp::Delete, uids, abort)
    }

    /// Create a folder under `parent_uid`.
    pub async fn create_folder(
        &self,
        parent_uid: &NodeUid,
        name: &str,
        modification_time: Option<DateTime<Utc>>,
        abort: &AbortSignal,
    ) -> Result<DecryptedNode> {
        validate_node_name(name).map_err(|error| Error::validation(error.to_string()))?;
        let parent = self.access.get_node(parent_uid, abort).await?;
        if parent.node_type != NodeType::Folder {
            return Err(Error::validation("parent is not a folder"));
        }
        let parent_keys = self.access.node_keys(parent_uid, abort).await?;
        let parent_hash_key = parent_keys
            .hash_key
            .as_ref()
            .ok_or_else(|| Error::validation("parent folder has no hash key"))?;

        let (material, keys) = self
            .crypto
            .create_folder(name, modification_time, &parent_keys.key, parent_hash_key)
            .await?;

        let new_uid = self
            .api
            .create_folder(
                parent_uid,
                CreateFolderPayload {
                    armored_key: material.armored_key,
                    armored_passphrase: material.armored_passphrase,
                    armored_passphrase_signature: material.armored_passphrase_signature,
                    signature_email: material.signature_email.clone(),
                    encrypted_name: material.encrypted_name,
                    name_signature_email: material.name_signature_email.clone(),
                    hash: material.hash.clone(),
                    armored_hash_key: material.armored_hash_key,
                    armored_extended_attributes: material.armored_extended_attributes,
                },
                abort,
            )
            .await?;

        self.crypto_cache.set(&new_uid, keys);
        let node = DecryptedNode {
            uid: new_uid.clone(),
            parent_uid: Some(parent_uid.clone()),
            node_type: NodeType::Folder,
            media_type: None,
            creation_time: Utc::now(),
            trash_time: None,
            share_id: None,
            is_shared: false,
            direct_role: parent.direct_role,
            membership: None,
            hash: Some(material.hash),
            name: Ok(name.to_owned()),
            key_author: Ok(Some(material.signature_email)),
            name_author: Ok(Some(material.name_signature_email)),
            active_revision: None,
            folder_attributes: modification_time.map(|time| ParsedFolderExtendedAttributes {
                claimed_modification_time: Some(time),
            }),
            errors: Vec::new(),
            is_stale: false,
            tree_event_scope_id: new_uid.volume_id()?,
        };
        self.access.cache().set_node(&node).await;
        self.access.notify_child_created(parent_uid).await;
        self.events.notify_node_created(&node);
        Ok(node)
    }

    /// List and decrypt the revisions of a file, newest first.
    pub async fn iterate_revisions(
        &self,
        uid: &NodeUid,
        abort: &AbortSignal,
    ) -> Result<Vec<DecryptedRevision>> {
        let node = self.access.get_node(uid, abort).await?;
        if node.node_type != NodeType::File {
            return Err(Error::validation("only files have revisions"));
        }
        let keys = self.access.node_keys(uid, abort).await?;
        let encrypted = self.api.get_revisions(uid, abort).await?;
        let mut revisions = Vec::with_capacity(encrypted.len());
        for revision in &encrypted {
            let unparsed = self.crypto.decrypt_revision(revision, &keys.key).await;
            revisions.push(parse_revision(unparsed, node.creation_time));
        }
        Ok(revisions)
    }

    /// Restore a superseded revision as the active one. The node is marked
    /// stale so the next read picks up the new active revision.
    pub async fn restore_revision(
        &self,
        revision_uid: &RevisionUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        self.api.restore_revision(revision_uid, abort).await?;
        let node_uid = revision_uid.node_uid()?;
        self.access.notify_node_changed(&node_uid, None).await;
        if let Some(node) = self.access.cache().get_node(&node_uid).await {
            self.events.notify_node_updated(&node);
        }
        Ok(())
    }

    /// Permanently delete a superseded revision.
    pub async fn delete_revision(
        &self,
        revision_uid: &RevisionUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        self.api.delete_revision(revision_uid, abort).await
    }
}

impl std::fmt::Debug for NodesManagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodesManagement").finish_non_exhaustive()
    }
}

/// Progress iterator over per-node moves.
pub struct MoveNodesIter<'a> {
    management: &'a NodesManagement,
    new_parent_uid: NodeUid,
    queue: VecDeque<NodeUid>,
    abort: AbortSignal,
    done: bool,
}

impl MoveNodesIter<'_> {
    /// Next outcome, or `None` when every node was attempted.
    pub async fn next(&mut self) -> Option<Result<NodeOpOutcome>> {
        if self.done {
            return None;
        }
        if self.queue.is_empty() {
            return None;
        }
        if let Err(error) = self.abort.check("move nodes") {
            self.done = true;
            return Some(Err(error));
        }
        let uid = self.queue.pop_front()?;
        let result = self
            .management
            .move_node(&uid, &self.new_parent_uid, &self.abort)
            .await
            .map(|_| ());
        Some(Ok(NodeOpOutcome { uid, result }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOp {
    Trash,
    Restore,
    Delete,
}

/// Progress iterator over batched trash/restore/delete mutations.
pub struct BatchMutationIter<'a> {
    management: &'a NodesManagement,
    op: BatchOp,
    groups: VecDeque<(VolumeId, VecDeque<NodeUid>)>,
    results: VecDeque<NodeOpOutcome>,
    deleted: Vec<(NodeUid, Option<NodeUid>)>,
    abort: AbortSignal,
    done: bool,
}

impl<'a> BatchMutationIter<'a> {
    fn new(
        management: &'a NodesManagement,
        op: BatchOp,
        uids: Vec<NodeUid>,
        abort: AbortSignal,
    ) -> Self {
        let mut groups: VecDeque<(VolumeId, VecDeque<NodeUid>)> = VecDeque::new();
        let mut results = VecDeque::new();
        for uid in uids {
            match uid.volume_id() {
                Ok(volume) => {
                    if let Some((_, ids)) = groups.iter_mut().find(|(v, _)| *v == volume) {
                        ids.push_back(uid);
                    } else {
                        groups.push_back((volume, VecDeque::from([uid])));
                    }
                }
                Err(error) => results.push_back(NodeOpOutcome {
                    uid,
                    result: Err(error),
                }),
            }
        }
        Self {
            management,
            op,
            groups,
            results,
            deleted: Vec::new(),
            abort,
            done: false,
        }
    }

    async fn apply_success(&mut self, uid: &NodeUid) {
        let cache = self.management.access.cache();
        match self.op {
            BatchOp::Trash => {
                if let Some(mut node) = cache.get_node(uid).await {
                    node.trash_time = Some(Utc::now());
                    cache.set_node(&node).await;
                    self.management.events.notify_node_updated(&node);
                }
            }
            BatchOp::Restore => {
                if let Some(mut node) = cache.get_node(uid).await {
                    node.trash_time = None;
                    cache.set_node(&node).await;
                    self.management.events.notify_node_updated(&node);
                }
            }
            BatchOp::Delete => {
                let parent = cache.get_node(uid).await.and_then(|n| n.parent_uid);
                self.management.access.notify_node_deleted(uid).await;
                self.deleted.push((uid.clone(), parent));
            }
        }
    }

    /// Next outcome, or `None` when every node was attempted.
    pub async fn next(&mut self) -> Option<Result<NodeOpOutcome>> {
        loop {
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("batch mutation") {
                self.done = true;
                return Some(Err(error));
            }
            if let Some(outcome) = self.results.pop_front() {
                return Some(Ok(outcome));
            }
            let Some((_, ids)) = self.groups.front_mut() else {
                if self.op == BatchOp::Delete && !self.deleted.is_empty() {
                    self.management
                        .events
                        .notify_nodes_deleted(&std::mem::take(&mut self.deleted));
                }
                self.done = true;
                continue;
            };
            let take = ids.len().min(velum_core::constants::BATCH_LOADING_SIZE);
            let chunk: Vec<NodeUid> = ids.drain(..take).collect();
            if ids.is_empty() {
                self.groups.pop_front();
            }
            let api = &self.management.api;
            let call = match self.op {
                BatchOp::Trash => api.trash_nodes(&chunk, &self.abort).await,
                BatchOp::Restore => api.restore_nodes(&chunk, &self.abort).await,
                BatchOp::Delete => api.delete_nodes(&chunk, &self.abort).await,
            };
            match call {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        if outcome.result.is_ok() {
                            self.apply_success(&outcome.uid).await;
                        }
                        self.results.push_back(NodeOpOutcome {
                            uid: outcome.uid,
                            result: outcome.result,
                        });
                    }
                }
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}
