//! Nodes access: the fetch → decrypt → parse → cache pipeline
//!
//! Reads are cache-first: a cached, non-stale node is returned as-is;
//! everything else is fetched, decrypted with the parent key (resolved
//! recursively through the cache), parsed and written back. Listings batch
//! their cache misses up to [`velum_core::constants::BATCH_LOADING_SIZE`]
//! UIDs per API call and decrypt with bounded concurrency, preserving
//! backend order.
//!
//! An ancestor that cannot be decrypted degrades its descendants instead of
//! failing them: the caller still gets a record, with error authors and the
//! cause attached.

use crate::parse::parse_node;
use futures::future::BoxFuture;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;
use velum_api::{ApiService, ChildUidIter, TrashedUidIter};
use velum_cache::{CryptoCache, NodeCache};
use velum_core::effects::shares::ShareService;
use velum_core::{
    AbortSignal, ClientConfig, DecryptedNode, DecryptedNodeKeys, EncryptedNode, Error, NameError,
    NodeUid, Passphrase, PrivateKey, Result, SessionKey, VerificationError, VolumeId,
};
use velum_crypto::CryptoService;

/// One element of a batched node listing.
#[derive(Debug)]
pub enum MaybeNode {
    /// A decrypted (possibly degraded) node.
    Node(DecryptedNode),
    /// A UID the backend did not return; it was removed from the cache.
    Missing(NodeUid),
    /// A node that failed outside the degradation paths.
    Failed {
        /// The affected UID.
        uid: NodeUid,
        /// What went wrong.
        error: Error,
    },
}

/// Key material of one node, with the name session key resolved.
#[derive(Debug, Clone)]
pub struct NodeSessionKeys {
    /// Unlocked node private key.
    pub key: PrivateKey,
    /// The node passphrase.
    pub passphrase: Passphrase,
    /// Session key the passphrase is encrypted with.
    pub passphrase_session_key: SessionKey,
    /// Session key of the content-key packet, for files.
    pub content_key_packet_session_key: Option<SessionKey>,
    /// Session key the name is encrypted with.
    pub name_session_key: SessionKey,
}

/// The node read pipeline.
pub struct NodesAccess {
    api: ApiService,
    cache: Arc<NodeCache>,
    crypto_cache: Arc<CryptoCache>,
    crypto: Arc<CryptoService>,
    shares: Arc<dyn ShareService>,
    config: ClientConfig,
    inflight: Mutex<HashMap<NodeUid, Arc<tokio::sync::Mutex<()>>>>,
}

impl NodesAccess {
    /// Build the pipeline over its collaborators.
    pub fn new(
        api: ApiService,
        cache: Arc<NodeCache>,
        crypto_cache: Arc<CryptoCache>,
        crypto: Arc<CryptoService>,
        shares: Arc<dyn ShareService>,
        config: ClientConfig,
    ) -> Self {
        Self {
            api,
            cache,
            crypto_cache,
            crypto,
            shares,
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// The node cache this pipeline writes through.
    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    /// One node, from cache when fresh, else loaded.
    pub async fn get_node(&self, uid: &NodeUid, abort: &AbortSignal) -> Result<DecryptedNode> {
        if let Some(node) = self.cache.get_node(uid).await {
            if !node.is_stale {
                return Ok(node);
            }
        }
        self.load_node(uid, abort).await
    }

    /// Load one node from the backend, coalescing concurrent loads of the
    /// same UID.
    fn load_node<'a>(
        &'a self,
        uid: &'a NodeUid,
        abort: &'a AbortSignal,
    ) -> BoxFuture<'a, Result<DecryptedNode>> {
        Box::pin(async move {
            let guard = {
                let mut inflight = self.inflight.lock();
                inflight
                    .entry(uid.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone()
            };
            let _held = guard.lock().await;

            // A concurrent load may have finished while we waited.
            if let Some(node) = self.cache.get_node(uid).await {
                if !node.is_stale {
                    self.release_inflight(uid, &guard);
                    return Ok(node);
                }
            }

            let result = async {
                abort.check("node load")?;
                let encrypted = self.api.get_node(uid, abort).await?;
                self.decrypt_and_store(encrypted, abort).await
            }
            .await;
            self.release_inflight(uid, &guard);
            result
        })
    }

    fn release_inflight(&self, uid: &NodeUid, guard: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock();
        // Only drop the entry when nobody else is waiting on it.
        if Arc::strong_count(guard) <= 2 {
            inflight.remove(uid);
        }
    }

    /// Decrypt, parse and cache one fetched node.
    pub(crate) async fn decrypt_and_store(
        &self,
        encrypted: EncryptedNode,
        abort: &AbortSignal,
    ) -> Result<DecryptedNode> {
        let parent_key = match self.parent_key(&encrypted, abort).await {
            Ok(key) => key,
            Err(error) if matches!(error, Error::Decryption { .. }) => {
                // An undecryptable ancestor degrades the node, it does not
                // fail the read.
                let node = degraded_node(&encrypted, error);
                self.cache.set_node(&node).await;
                return Ok(node);
            }
            Err(error) => return Err(error),
        };
        let bundle = self.crypto.decrypt_node(&encrypted, &parent_key).await;
        let node = parse_node(bundle.node)?;
        if let Some(keys) = bundle.keys {
            self.crypto_cache.set(&node.uid, keys);
        }
        self.cache.set_node(&node).await;
        Ok(node)
    }

    /// The key a node's crypto bundle is encrypted to: the parent node's
    /// key, or the share key for root nodes. A node with neither is a hard
    /// bug.
    pub(crate) async fn parent_key(
        &self,
        encrypted: &EncryptedNode,
        abort: &AbortSignal,
    ) -> Result<PrivateKey> {
        if let Some(parent_uid) = &encrypted.parent_uid {
            let keys = self.node_keys(parent_uid, abort).await.map_err(|error| {
                Error::decryption(format!(
                    "parent {parent_uid} cannot be decrypted: {error}"
                ))
            })?;
            Ok(keys.key)
        } else if let Some(share_id) = &encrypted.share_id {
            self.shares.share_key(share_id).await
        } else {
            Err(Error::internal(format!(
                "node {} has neither a parent nor a share",
                encrypted.uid
            )))
        }
    }

    /// Decrypted keys of a node, loading it when they are not cached.
    pub async fn node_keys(
        &self,
        uid: &NodeUid,
        abort: &AbortSignal,
    ) -> Result<DecryptedNodeKeys> {
        if let Some(keys) = self.crypto_cache.get(uid) {
            return Ok(keys);
        }
        self.load_node(uid, abort).await?;
        self.crypto_cache
            .get(uid)
            .ok_or_else(|| Error::decryption(format!("item {uid} cannot be decrypted")))
    }

    /// Key material of a node including the name session key, which is
    /// recovered from the encrypted name under the parent key.
    pub async fn node_session_keys(
        &self,
        uid: &NodeUid,
        abort: &AbortSignal,
    ) -> Result<NodeSessionKeys> {
        let encrypted = self.api.get_node(uid, abort).await?;
        let keys = self.node_keys(uid, abort).await?;
        let parent_key = self.parent_key(&encrypted, abort).await?;
        let name_session_key = self
            .crypto
            .name_session_key(&encrypted.encrypted_name, &parent_key)
            .await?;
        Ok(NodeSessionKeys {
            key: keys.key,
            passphrase: keys.passphrase,
            passphrase_session_key: keys.passphrase_session_key,
            content_key_packet_session_key: keys.content_key_packet_session_key,
            name_session_key,
        })
    }

    /// Load a same-volume chunk of UIDs: one API call, bounded-concurrency
    /// decryption, backend order. UIDs the backend does not return are
    /// removed from the cache and reported as missing.
    pub(crate) async fn load_batch(
        &self,
        uids: Vec<NodeUid>,
        abort: &AbortSignal,
    ) -> Result<Vec<MaybeNode>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = uids.len(), "loading node batch");
        let encrypted = self.api.get_nodes(&uids, abort).await?;

        let returned: Vec<&str> = encrypted.iter().map(|n| n.uid.as_str()).collect();
        let missing: Vec<NodeUid> = uids
            .iter()
            .filter(|uid| !returned.contains(&uid.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.cache.remove_nodes(&missing).await;
        }

        let decrypted: Vec<(NodeUid, Result<DecryptedNode>)> =
            futures::stream::iter(encrypted.into_iter().map(|node| async move {
                let uid = node.uid.clone();
                (uid, self.decrypt_and_store(node, abort).await)
            }))
            .buffered(self.config.decryption_concurrency)
            .collect()
            .await;

        let mut out = Vec::with_capacity(decrypted.len() + missing.len());
        for (uid, result) in decrypted {
            out.push(match result {
                Ok(node) => MaybeNode::Node(node),
                Err(error) => MaybeNode::Failed { uid, error },
            });
        }
        out.extend(missing.into_iter().map(MaybeNode::Missing));
        Ok(out)
    }

    /// Iterate arbitrary nodes: cached-fresh ones first, the rest in
    /// batched loads.
    pub fn iterate_nodes<'a>(&'a self, uids: Vec<NodeUid>, abort: AbortSignal) -> NodesIter<'a> {
        NodesIter {
            access: self,
            abort,
            input: Some(uids),
            buffer: VecDeque::new(),
            groups: VecDeque::new(),
            done: false,
        }
    }

    /// Iterate the children of a folder, exactly once each per iteration.
    pub fn iterate_folder_children<'a>(
        &'a self,
        parent_uid: &NodeUid,
        abort: AbortSignal,
    ) -> FolderChildrenIter<'a> {
        FolderChildrenIter {
            access: self,
            parent_uid: parent_uid.clone(),
            abort,
            state: ChildrenState::Init,
            buffer: VecDeque::new(),
            queue: Vec::new(),
            done: false,
        }
    }

    /// Iterate the trashed nodes of a volume.
    pub fn iterate_trashed_nodes<'a>(
        &'a self,
        volume_id: &VolumeId,
        abort: AbortSignal,
    ) -> TrashedNodesIter<'a> {
        TrashedNodesIter {
            access: self,
            uid_iter: self.api.iterate_trashed_node_uids(volume_id, abort.clone()),
            abort,
            buffer: VecDeque::new(),
            queue: Vec::new(),
            listing_done: false,
            tail_flushed: false,
            done: false,
        }
    }

    /// A child was created under `parent_uid`; its listing is incomplete
    /// until walked again.
    pub async fn notify_child_created(&self, parent_uid: &NodeUid) {
        self.cache.reset_folder_children_loaded(parent_uid).await;
    }

    /// A node changed remotely; mark it stale (and re-parent it) so the
    /// next read refetches.
    pub async fn notify_node_changed(&self, uid: &NodeUid, new_parent_uid: Option<NodeUid>) {
        if let Some(mut node) = self.cache.get_node(uid).await {
            node.is_stale = true;
            if let Some(parent) = new_parent_uid {
                node.parent_uid = Some(parent);
            }
            self.cache.set_node(&node).await;
        }
    }

    /// A node is gone; drop it and its keys.
    pub async fn notify_node_deleted(&self, uid: &NodeUid) {
        self.cache.remove_nodes(std::slice::from_ref(uid)).await;
        self.crypto_cache.remove(uid);
    }
}

impl std::fmt::Debug for NodesAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodesAccess").finish_non_exhaustive()
    }
}

/// Synthesize the degraded record for a node whose parent key could not be
/// resolved.
fn degraded_node(encrypted: &EncryptedNode, cause: Error) -> DecryptedNode {
    let message = cause.to_string();
    let claimed_key = encrypted.crypto.signature_email.clone();
    let claimed_name = encrypted
        .crypto
        .name_signature_email
        .clone()
        .or_else(|| claimed_key.clone());
    DecryptedNode {
        uid: encrypted.uid.clone(),
        parent_uid: encrypted.parent_uid.clone(),
        node_type: encrypted.node_type,
        media_type: encrypted.media_type.clone(),
        creation_time: encrypted.creation_time,
        trash_time: encrypted.trash_time,
        share_id: encrypted.share_id.clone(),
        is_shared: encrypted.is_shared,
        direct_role: encrypted.direct_role,
        membership: encrypted.membership.as_ref().map(|m| {
            velum_core::DecryptedMembership {
                role: m.role,
                invite_time: m.invite_time,
                shared_by: Ok(m.inviter_email.clone()),
            }
        }),
        hash: encrypted.hash.clone(),
        name: Err(NameError::Undecryptable {
            message: message.clone(),
        }),
        key_author: Err(VerificationError::new(claimed_key, message.clone())),
        name_author: Err(VerificationError::new(claimed_name, message)),
        active_revision: None,
        folder_attributes: None,
        errors: vec![cause],
        is_stale: false,
        tree_event_scope_id: encrypted
            .uid
            .volume_id()
            .unwrap_or_else(|_| VolumeId::new("")),
    }
}

/// Iterator over arbitrary UIDs; see [`NodesAccess::iterate_nodes`].
pub struct NodesIter<'a> {
    access: &'a NodesAccess,
    abort: AbortSignal,
    input: Option<Vec<NodeUid>>,
    buffer: VecDeque<MaybeNode>,
    groups: VecDeque<(VolumeId, VecDeque<NodeUid>)>,
    done: bool,
}

impl NodesIter<'_> {
    /// Next element, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<MaybeNode>> {
        loop {
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("nodes iteration") {
                self.done = true;
                return Some(Err(error));
            }
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            if let Some(uids) = self.input.take() {
                let lookups = self.access.cache.iterate_nodes(&uids).await;
                for lookup in lookups {
                    match lookup.node {
                        Some(node) if !node.is_stale => {
                            self.buffer.push_back(MaybeNode::Node(node));
                        }
                        _ => match lookup.uid.volume_id() {
                            Ok(volume) => {
                                if let Some((_, ids)) =
                                    self.groups.iter_mut().find(|(v, _)| *v == volume)
                                {
                                    ids.push_back(lookup.uid);
                                } else {
                                    self.groups
                                        .push_back((volume, VecDeque::from([lookup.uid])));
                                }
                            }
                            Err(error) => self.buffer.push_back(MaybeNode::Failed {
                                uid: lookup.uid,
                                error,
                            }),
                        },
                    }
                }
                continue;
            }

            let Some((_, ids)) = self.groups.front_mut() else {
                self.done = true;
                continue;
            };
            let take = ids.len().min(self.access.config.batch_loading_size);
            let chunk: Vec<NodeUid> = ids.drain(..take).collect();
            if ids.is_empty() {
                self.groups.pop_front();
            }
            match self.access.load_batch(chunk, &self.abort).await {
                Ok(loaded) => self.buffer.extend(loaded),
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

enum ChildrenState {
    Init,
    Cached { children: VecDeque<DecryptedNode> },
    Listing { uid_iter: ChildUidIter },
    Draining,
    Exhausted,
    ListingComplete,
}

/// Iterator over the children of one folder; see
/// [`NodesAccess::iterate_folder_children`].
pub struct FolderChildrenIter<'a> {
    access: &'a NodesAccess,
    parent_uid: NodeUid,
    abort: AbortSignal,
    state: ChildrenState,
    buffer: VecDeque<MaybeNode>,
    queue: Vec<NodeUid>,
    done: bool,
}

impl FolderChildrenIter<'_> {
    /// Load the queued UIDs and append the results to the buffer. Takes the
    /// fields directly so it can run while the state is borrowed.
    async fn flush(
        access: &NodesAccess,
        abort: &AbortSignal,
        queue: &mut Vec<NodeUid>,
        buffer: &mut VecDeque<MaybeNode>,
    ) -> Result<()> {
        let chunk = std::mem::take(queue);
        let loaded = access.load_batch(chunk, abort).await?;
        buffer.extend(loaded);
        Ok(())
    }

    /// Next child, or `None` once the listing completed. On natural
    /// completion of an API-driven listing the folder's children-loaded bit
    /// is set.
    pub async fn next(&mut self) -> Option<Result<MaybeNode>> {
        loop {
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("children iteration") {
                self.done = true;
                return Some(Err(error));
            }
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            match &mut self.state {
                ChildrenState::Init => {
                    // The parent must be fresh before its listing is trusted.
                    if let Err(error) = self.access.get_node(&self.parent_uid, &self.abort).await
                    {
                        self.done = true;
                        return Some(Err(error));
                    }
                    if self
                        .access
                        .cache
                        .is_folder_children_loaded(&self.parent_uid)
                        .await
                    {
                        let children =
                            match self.access.cache.iterate_children(&self.parent_uid).await {
                                Ok(children) => children,
                                Err(error) => {
                                    self.done = true;
                                    return Some(Err(error));
                                }
                            };
                        self.state = ChildrenState::Cached {
                            children: children.into(),
                        };
                    } else {
                        let uid_iter = match self
                            .access
                            .api
                            .iterate_children_node_uids(&self.parent_uid, self.abort.clone())
                        {
                            Ok(iter) => iter,
                            Err(error) => {
                                self.done = true;
                                return Some(Err(error));
                            }
                        };
                        self.state = ChildrenState::Listing { uid_iter };
                    }
                }
                ChildrenState::Cached { children } => match children.pop_front() {
                    Some(child) => {
                        if child.is_stale {
                            self.queue.push(child.uid.clone());
                            if self.queue.len() >= self.access.config.batch_loading_size {
                                if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                                    self.done = true;
                                    return Some(Err(error));
                                }
                            }
                        } else {
                            self.buffer.push_back(MaybeNode::Node(child));
                        }
                    }
                    None => {
                        self.state = ChildrenState::Draining;
                    }
                },
                ChildrenState::Listing { uid_iter } => match uid_iter.next().await {
                    Some(Ok(uid)) => {
                        match self.access.cache.get_node(&uid).await {
                            Some(node) if !node.is_stale => {
                                self.buffer.push_back(MaybeNode::Node(node));
                            }
                            _ => {
                                self.queue.push(uid);
                                if self.queue.len() >= self.access.config.batch_loading_size {
                                    if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                                        self.done = true;
                                        return Some(Err(error));
                                    }
                                }
                            }
                        }
                    }
                    Some(Err(error)) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                    None => {
                        if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                            self.done = true;
                            return Some(Err(error));
                        }
                        self.state = ChildrenState::ListingComplete;
                    }
                },
                ChildrenState::Draining => {
                    if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                        self.done = true;
                        return Some(Err(error));
                    }
                    self.state = ChildrenState::Exhausted;
                }
                ChildrenState::Exhausted => {
                    self.done = true;
                }
                ChildrenState::ListingComplete => {
                    // Every child was yielded and the iteration was not
                    // aborted; the cache now holds the complete listing.
                    self.access
                        .cache
                        .set_folder_children_loaded(&self.parent_uid)
                        .await;
                    self.done = true;
                }
            }
        }
    }
}

/// Iterator over the trashed nodes of a volume; see
/// [`NodesAccess::iterate_trashed_nodes`].
pub struct TrashedNodesIter<'a> {
    access: &'a NodesAccess,
    uid_iter: TrashedUidIter,
    abort: AbortSignal,
    buffer: VecDeque<MaybeNode>,
    queue: Vec<NodeUid>,
    listing_done: bool,
    tail_flushed: bool,
    done: bool,
}

impl TrashedNodesIter<'_> {
    /// Next trashed node, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<MaybeNode>> {
        loop {
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("trash iteration") {
                self.done = true;
                return Some(Err(error));
            }
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.listing_done {
                if self.tail_flushed {
                    // Buffer drained after the final flush.
                    self.done = true;
                    continue;
                }
                let chunk = std::mem::take(&mut self.queue);
                match self.access.load_batch(chunk, &self.abort).await {
                    Ok(loaded) => self.buffer.extend(loaded),
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                }
                self.tail_flushed = true;
                continue;
            }
            match self.uid_iter.next().await {
                Some(Ok(uid)) => {
                    match self.access.cache.get_node(&uid).await {
                        Some(node) if !node.is_stale => {
                            self.buffer.push_back(MaybeNode::Node(node));
                        }
                        _ => {
                            self.queue.push(uid);
                            if self.queue.len() >= self.access.config.batch_loading_size {
                                let chunk = std::mem::take(&mut self.queue);
                                match self.access.load_batch(chunk, &self.abort).await {
                                    Ok(loaded) => self.buffer.extend(loaded),
                                    Err(error) => {
                                        self.done = true;
                                        return Some(Err(error));
                                    }
                                }
                            }
                        }
                    }
                }
                Some(Err(error)) => {
                    self.done = true;
                    return Some(Err(error));
                }
                None => {
                    self.listing_done = true;
                }
            }
        }
    }
}
