//! Node endpoints: fetch, listings, mutations
//!
//! Batched fetches are bounded to a single volume per call; the service
//! asserts this rather than silently splitting. Listing iterators are lazy,
//! finite and non-restartable, and check the abort handle between pages.

use super::ApiService;
use crate::proto::{
    check_code, AckResponse, ChildrenPage, CreateFolderRequest, CreateFolderResponse,
    MoveNodeRequest, MultiOpResponse, NodesResponse, RenameNodeRequest, TrashedPage,
};
use crate::transport::ApiRequest;
use serde_json::json;
use std::collections::VecDeque;
use velum_core::constants::BATCH_LOADING_SIZE;
use velum_core::{
    AbortSignal, ArmoredKey, ArmoredMessage, ArmoredSignature, EncryptedNode, Error, NodeUid,
    Result, VolumeId,
};

/// Fields of a rename request, produced by the crypto service.
#[derive(Debug, Clone)]
pub struct RenameNodePayload {
    /// Re-encrypted name.
    pub encrypted_name: ArmoredMessage,
    /// Name signing email.
    pub name_signature_email: Option<String>,
    /// New name hash; absent only when renaming a root.
    pub hash: Option<String>,
}

/// Fields of a move request, produced by the crypto service.
#[derive(Debug, Clone)]
pub struct MoveNodePayload {
    /// Target folder UID.
    pub parent_uid: NodeUid,
    /// Passphrase re-encrypted under the new parent key.
    pub armored_passphrase: ArmoredMessage,
    /// Fresh passphrase signature; anonymous nodes only.
    pub armored_passphrase_signature: Option<ArmoredSignature>,
    /// Fresh key signing email; anonymous nodes only.
    pub signature_email: Option<String>,
    /// Re-encrypted name.
    pub encrypted_name: ArmoredMessage,
    /// Name signing email.
    pub name_signature_email: Option<String>,
    /// New name hash under the target's hash key.
    pub hash: String,
    /// Content hash for photo de-duplication; never populated today.
    pub content_hash: Option<String>,
}

/// Fields of a folder creation request, produced by the crypto service.
#[derive(Debug, Clone)]
pub struct CreateFolderPayload {
    /// Armored locked node key.
    pub armored_key: ArmoredKey,
    /// Encrypted node passphrase.
    pub armored_passphrase: ArmoredMessage,
    /// Detached passphrase signature.
    pub armored_passphrase_signature: ArmoredSignature,
    /// Key signing email.
    pub signature_email: String,
    /// Encrypted folder name.
    pub encrypted_name: ArmoredMessage,
    /// Name signing email.
    pub name_signature_email: String,
    /// Name hash under the parent hash key.
    pub hash: String,
    /// Armored folder hash key.
    pub armored_hash_key: ArmoredMessage,
    /// Armored folder extended attributes.
    pub armored_extended_attributes: Option<ArmoredMessage>,
}

/// Per-node outcome of a batched mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOpResult {
    /// Node the outcome refers to.
    pub uid: NodeUid,
    /// Success, or the per-node failure.
    pub result: Result<()>,
}

/// Split a batch into `(volume, node ids)`, asserting a single volume.
fn single_volume(uids: &[NodeUid]) -> Result<(VolumeId, Vec<String>)> {
    let mut volume: Option<VolumeId> = None;
    let mut node_ids = Vec::with_capacity(uids.len());
    for uid in uids {
        let (v, node_id) = uid.split()?;
        match &volume {
            None => volume = Some(v),
            Some(existing) if *existing == v => {}
            Some(existing) => {
                return Err(Error::internal(format!(
                    "batched node call crosses volumes {existing} and {v}"
                )))
            }
        }
        node_ids.push(node_id);
    }
    let volume =
        volume.ok_or_else(|| Error::internal("batched node call with no UIDs"))?;
    Ok((volume, node_ids))
}

impl ApiService {
    /// Fetch one node.
    pub async fn get_node(&self, uid: &NodeUid, abort: &AbortSignal) -> Result<EncryptedNode> {
        let nodes = self.get_nodes(std::slice::from_ref(uid), abort).await?;
        nodes
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("node {uid}")))
    }

    /// Fetch a batch of nodes from a single volume, in backend order.
    /// Nodes the backend refuses are absent from the result.
    pub async fn get_nodes(
        &self,
        uids: &[NodeUid],
        abort: &AbortSignal,
    ) -> Result<Vec<EncryptedNode>> {
        let (volume, node_ids) = single_volume(uids)?;
        let request = ApiRequest::post(
            format!("drive/v1/volumes/{volume}/nodes/fetch"),
            json!({ "NodeIds": node_ids }),
        );
        let response: NodesResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .nodes
            .into_iter()
            .map(|dto| dto.into_encrypted_node())
            .collect()
    }

    /// Iterate nodes across any volumes, paging under the hood.
    pub fn iterate_nodes(&self, uids: Vec<NodeUid>, abort: AbortSignal) -> EncryptedNodeIter {
        EncryptedNodeIter::new(self.clone(), uids, abort)
    }

    /// Iterate the child UIDs of a folder, anchor-paginated.
    pub fn iterate_children_node_uids(
        &self,
        parent_uid: &NodeUid,
        abort: AbortSignal,
    ) -> Result<ChildUidIter> {
        let (volume, node_id) = parent_uid.split()?;
        Ok(ChildUidIter {
            service: self.clone(),
            volume,
            node_id,
            anchor: None,
            done: false,
            buffer: VecDeque::new(),
            abort,
        })
    }

    /// Iterate the trashed node UIDs of a volume, page-paginated.
    pub fn iterate_trashed_node_uids(
        &self,
        volume_id: &VolumeId,
        abort: AbortSignal,
    ) -> TrashedUidIter {
        TrashedUidIter {
            service: self.clone(),
            volume: volume_id.clone(),
            page: 0,
            done: false,
            buffer: VecDeque::new(),
            abort,
        }
    }

    /// Rename a node in place.
    pub async fn rename_node(
        &self,
        uid: &NodeUid,
        original_hash: Option<String>,
        payload: RenameNodePayload,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (volume, node_id) = uid.split()?;
        let body = RenameNodeRequest {
            original_hash,
            encrypted_name: payload.encrypted_name.0,
            name_signature_email: payload.name_signature_email,
            hash: payload.hash,
        };
        let request = ApiRequest::put(
            format!("drive/v1/volumes/{volume}/nodes/{node_id}/rename"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode rename request: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Move a node to a new parent.
    pub async fn move_node(
        &self,
        uid: &NodeUid,
        original_hash: Option<String>,
        payload: MoveNodePayload,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (volume, node_id) = uid.split()?;
        let body = MoveNodeRequest {
            original_hash,
            parent_uid: payload.parent_uid.as_str().to_owned(),
            armored_passphrase: payload.armored_passphrase.0,
            armored_passphrase_signature: payload.armored_passphrase_signature.map(|s| s.0),
            signature_email: payload.signature_email,
            encrypted_name: payload.encrypted_name.0,
            name_signature_email: payload.name_signature_email,
            hash: payload.hash,
            content_hash: payload.content_hash,
        };
        let request = ApiRequest::put(
            format!("drive/v1/volumes/{volume}/nodes/{node_id}/move"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode move request: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Move a batch of nodes to the trash.
    pub async fn trash_nodes(
        &self,
        uids: &[NodeUid],
        abort: &AbortSignal,
    ) -> Result<Vec<NodeOpResult>> {
        self.multi_op("trash", uids, abort).await
    }

    /// Restore a batch of trashed nodes.
    pub async fn restore_nodes(
        &self,
        uids: &[NodeUid],
        abort: &AbortSignal,
    ) -> Result<Vec<NodeOpResult>> {
        self.multi_op("restore", uids, abort).await
    }

    /// Permanently delete a batch of trashed nodes.
    pub async fn delete_nodes(
        &self,
        uids: &[NodeUid],
        abort: &AbortSignal,
    ) -> Result<Vec<NodeOpResult>> {
        self.multi_op("delete", uids, abort).await
    }

    async fn multi_op(
        &self,
        op: &str,
        uids: &[NodeUid],
        abort: &AbortSignal,
    ) -> Result<Vec<NodeOpResult>> {
        let (volume, node_ids) = single_volume(uids)?;
        let request = ApiRequest::post(
            format!("drive/v1/volumes/{volume}/nodes/{op}"),
            json!({ "NodeIds": node_ids }),
        );
        let response: MultiOpResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        Ok(response
            .results
            .into_iter()
            .map(|item| NodeOpResult {
                uid: NodeUid::from_raw(&*item.uid),
                result: check_code(item.code, item.error.as_deref()),
            })
            .collect())
    }

    /// Create a folder under `parent_uid`, returning the new node's UID.
    pub async fn create_folder(
        &self,
        parent_uid: &NodeUid,
        payload: CreateFolderPayload,
        abort: &AbortSignal,
    ) -> Result<NodeUid> {
        let (volume, parent_id) = parent_uid.split()?;
        let body = CreateFolderRequest {
            armored_key: payload.armored_key.0,
            armored_passphrase: payload.armored_passphrase.0,
            armored_passphrase_signature: payload.armored_passphrase_signature.0,
            signature_email: payload.signature_email,
            encrypted_name: payload.encrypted_name.0,
            name_signature_email: payload.name_signature_email,
            hash: payload.hash,
            armored_hash_key: payload.armored_hash_key.0,
            armored_extended_attributes: payload.armored_extended_attributes.map(|m| m.0),
        };
        let request = ApiRequest::post(
            format!("drive/v1/volumes/{volume}/folders/{parent_id}/children"),
            serde_json::to_value(body).map_err(|error| {
                Error::internal(format!("encode create folder request: {error}"))
            })?,
        );
        let response: CreateFolderResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        Ok(NodeUid::from_raw(response.node_uid))
    }
}

/// Iterator over encrypted nodes, paging batched fetches under the hood.
///
/// Input UIDs are grouped per volume (batched calls are volume-bound) and
/// fetched in chunks of [`BATCH_LOADING_SIZE`]. Nodes the backend refuses
/// are simply not yielded.
pub struct EncryptedNodeIter {
    service: ApiService,
    groups: VecDeque<(VolumeId, VecDeque<String>)>,
    buffer: VecDeque<EncryptedNode>,
    abort: AbortSignal,
    failed: bool,
}

impl EncryptedNodeIter {
    fn new(service: ApiService, uids: Vec<NodeUid>, abort: AbortSignal) -> Self {
        let mut groups: VecDeque<(VolumeId, VecDeque<String>)> = VecDeque::new();
        let mut failed = false;
        for uid in uids {
            match uid.split() {
                Ok((volume, node_id)) => {
                    if let Some((_, ids)) = groups.iter_mut().find(|(v, _)| *v == volume) {
                        ids.push_back(node_id);
                    } else {
                        groups.push_back((volume, VecDeque::from([node_id])));
                    }
                }
                Err(_) => failed = true,
            }
        }
        Self {
            service,
            groups,
            buffer: VecDeque::new(),
            abort,
            failed,
        }
    }

    /// Next node, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<EncryptedNode>> {
        if self.failed {
            self.groups.clear();
            self.buffer.clear();
            return Some(Err(Error::validation("malformed node UID in batch")));
        }
        loop {
            if let Some(node) = self.buffer.pop_front() {
                return Some(Ok(node));
            }
            if let Err(error) = self.abort.check("node batch iteration") {
                self.groups.clear();
                return Some(Err(error));
            }
            let (volume, ids) = self.groups.front_mut()?;
            let chunk: Vec<NodeUid> = ids
                .drain(..ids.len().min(BATCH_LOADING_SIZE))
                .map(|node_id| NodeUid::make(volume, &node_id))
                .collect();
            if ids.is_empty() {
                self.groups.pop_front();
            }
            match self.service.get_nodes(&chunk, &self.abort).await {
                Ok(nodes) => self.buffer.extend(nodes),
                Err(error) => {
                    self.groups.clear();
                    return Some(Err(error));
                }
            }
        }
    }
}

/// Anchor-paginated iterator over the child UIDs of a folder.
pub struct ChildUidIter {
    service: ApiService,
    volume: VolumeId,
    node_id: String,
    anchor: Option<String>,
    done: bool,
    buffer: VecDeque<NodeUid>,
    abort: AbortSignal,
}

impl ChildUidIter {
    /// Next child UID, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<NodeUid>> {
        loop {
            if let Some(uid) = self.buffer.pop_front() {
                return Some(Ok(uid));
            }
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("children listing") {
                self.done = true;
                return Some(Err(error));
            }
            let mut path = format!(
                "drive/v1/volumes/{}/folders/{}/children",
                self.volume, self.node_id
            );
            if let Some(anchor) = &self.anchor {
                path.push_str("?Anchor=");
                path.push_str(anchor);
            }
            let page: Result<ChildrenPage> =
                self.service.call(ApiRequest::get(path), &self.abort).await;
            match page.and_then(|p| check_code(p.code, None).map(|()| p)) {
                Ok(page) => {
                    self.anchor = page.next_anchor;
                    self.done = self.anchor.is_none();
                    self.buffer
                        .extend(page.node_uids.into_iter().map(NodeUid::from_raw));
                }
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

/// Page-paginated iterator over the trashed node UIDs of a volume.
///
/// Stops on the first fully empty page. The backend can in principle return
/// an empty page with more data behind it; this quirk is load-bearing until
/// the trash endpoint switches to anchor pagination.
pub struct TrashedUidIter {
    service: ApiService,
    volume: VolumeId,
    page: u32,
    done: bool,
    buffer: VecDeque<NodeUid>,
    abort: AbortSignal,
}

impl TrashedUidIter {
    /// Next trashed UID, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<NodeUid>> {
        loop {
            if let Some(uid) = self.buffer.pop_front() {
                return Some(Ok(uid));
            }
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("trash listing") {
                self.done = true;
                return Some(Err(error));
            }
            let path = format!(
                "drive/v1/volumes/{}/trash?Page={}",
                self.volume, self.page
            );
            let page: Result<TrashedPage> =
                self.service.call(ApiRequest::get(path), &self.abort).await;
            match page.and_then(|p| check_code(p.code, None).map(|()| p)) {
                Ok(page) => {
                    if page.node_uids.is_empty() {
                        self.done = true;
                        return None;
                    }
                    self.page += 1;
                    self.buffer
                        .extend(page.node_uids.into_iter().map(NodeUid::from_raw));
                }
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}
