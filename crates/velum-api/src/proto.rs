//! Wire payload shapes and their adaptation to internal records
//!
//! The backend speaks PascalCase JSON with unix-second timestamps and an
//! integer `Code` on every response. Response error codes map `OK` /
//! `OK_MANY` to success; any other code or a non-empty error string is
//! surfaced to the caller, per-UID for batched operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use velum_core::sharing::{
    EncryptedBookmark, EncryptedExternalInvitation, EncryptedInvitation, EncryptedMember,
    EncryptedPublicLink, ExternalInvitationState, PublicLinkPasswordType, SharedByMeEntry,
};
use velum_core::{
    ArmoredKey, ArmoredMessage, ArmoredSignature, EncryptedCrypto, EncryptedMembership,
    EncryptedNode, EncryptedNodeVariant, EncryptedRevision, Error, FileCrypto, FolderCrypto,
    InvitationUid, MemberRole, MemberUid, NodeType, NodeUid, PublicLinkUid, Result, RevisionState,
    RevisionUid, ShareId, Thumbnail,
};

/// Success code for single-entity responses.
pub const CODE_OK: i64 = 1000;
/// Success code for multi-entity responses.
pub const CODE_OK_MANY: i64 = 1001;

/// Whether a response (or per-item) code plus error string means success.
pub fn check_code(code: i64, error: Option<&str>) -> Result<()> {
    let failed = !matches!(code, CODE_OK | CODE_OK_MANY) || error.is_some_and(|e| !e.is_empty());
    if failed {
        Err(Error::api(code, error.unwrap_or("request failed").to_owned()))
    } else {
        Ok(())
    }
}

fn time_from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::internal(format!("backend returned timestamp {secs} out of range")))
}

fn opt_time_from_unix(secs: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    secs.map(time_from_unix).transpose()
}

/// Parse a wire role name.
pub fn parse_role(role: &str) -> Result<MemberRole> {
    match role {
        "Viewer" => Ok(MemberRole::Viewer),
        "Editor" => Ok(MemberRole::Editor),
        "Admin" => Ok(MemberRole::Admin),
        other => Err(Error::internal(format!(
            "backend returned unknown member role {other:?}"
        ))),
    }
}

/// Wire name of a role, for request bodies.
pub fn role_name(role: MemberRole) -> &'static str {
    match role {
        MemberRole::Viewer => "Viewer",
        MemberRole::Editor => "Editor",
        MemberRole::Admin => "Admin",
    }
}

// ===== Nodes =====

/// Membership record on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MembershipDto {
    /// Granted role.
    pub role: String,
    /// Invite time, unix seconds.
    pub invite_time: i64,
    /// Inviter email.
    #[serde(default)]
    pub inviter_email: Option<String>,
}

/// Folder crypto branch on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FolderCryptoDto {
    /// Armored hash key message.
    pub armored_hash_key: String,
    /// Armored folder extended attributes.
    #[serde(default)]
    pub armored_extended_attributes: Option<String>,
}

/// Thumbnail descriptor on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThumbnailDto {
    /// Blob identifier.
    pub id: String,
    /// Size class.
    pub size_class: String,
}

/// Revision descriptor on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RevisionDto {
    /// Composite revision UID.
    pub uid: String,
    /// `Active` or `Superseded`.
    pub state: String,
    /// Upload time, unix seconds.
    pub creation_time: i64,
    /// Size on storage in bytes.
    pub storage_size: u64,
    /// Signing email of the revision.
    #[serde(default)]
    pub signature_email: Option<String>,
    /// Armored revision extended attributes.
    #[serde(default)]
    pub armored_extended_attributes: Option<String>,
    /// Thumbnails.
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailDto>,
}

impl RevisionDto {
    /// Adapt to the internal encrypted revision record.
    pub fn into_encrypted_revision(self) -> Result<EncryptedRevision> {
        let state = match self.state.as_str() {
            "Active" => RevisionState::Active,
            "Superseded" => RevisionState::Superseded,
            other => {
                return Err(Error::internal(format!(
                    "backend returned unknown revision state {other:?}"
                )))
            }
        };
        Ok(EncryptedRevision {
            uid: RevisionUid::from_raw(self.uid),
            state,
            creation_time: time_from_unix(self.creation_time)?,
            storage_size: self.storage_size,
            signature_email: self.signature_email,
            armored_extended_attributes: self.armored_extended_attributes.map(ArmoredMessage),
            thumbnails: self
                .thumbnails
                .into_iter()
                .map(|t| Thumbnail {
                    id: t.id,
                    size_class: t.size_class,
                })
                .collect(),
        })
    }
}

/// File crypto branch on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileCryptoDto {
    /// Base64 content-key packet.
    pub content_key_packet: String,
    /// Detached signature over the packet.
    #[serde(default)]
    pub content_key_packet_signature: Option<String>,
    /// Active revision descriptor.
    #[serde(default)]
    pub active_revision: Option<RevisionDto>,
}

/// Node crypto bundle on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CryptoDto {
    /// Armored locked node key.
    pub armored_key: String,
    /// Encrypted node passphrase.
    pub armored_passphrase: String,
    /// Detached passphrase signature.
    pub armored_passphrase_signature: String,
    /// Key signing email.
    #[serde(default)]
    pub signature_email: Option<String>,
    /// Name signing email.
    #[serde(default)]
    pub name_signature_email: Option<String>,
    /// Folder branch.
    #[serde(default)]
    pub folder: Option<FolderCryptoDto>,
    /// File branch.
    #[serde(default)]
    pub file: Option<FileCryptoDto>,
}

/// Node record on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeDto {
    /// Composite node UID.
    pub uid: String,
    /// Parent node UID.
    #[serde(default)]
    pub parent_uid: Option<String>,
    /// `File` or `Folder`.
    #[serde(rename = "Type")]
    pub node_type: String,
    /// Uploader-reported media type.
    #[serde(default)]
    pub media_type: Option<String>,
    /// Creation time, unix seconds.
    pub creation_time: i64,
    /// Trash time, unix seconds.
    #[serde(default)]
    pub trash_time: Option<i64>,
    /// Attached share id.
    #[serde(default)]
    pub share_id: Option<String>,
    /// Whether the node is shared.
    #[serde(default)]
    pub is_shared: bool,
    /// Caller's direct role.
    pub direct_member_role: String,
    /// Membership record.
    #[serde(default)]
    pub membership: Option<MembershipDto>,
    /// Name hash under the parent hash key.
    #[serde(default)]
    pub hash: Option<String>,
    /// Armored encrypted name.
    pub encrypted_name: String,
    /// Crypto bundle.
    pub encrypted_crypto: CryptoDto,
}

impl NodeDto {
    /// Adapt to the internal encrypted node record.
    pub fn into_encrypted_node(self) -> Result<EncryptedNode> {
        let node_type = match self.node_type.as_str() {
            "File" => NodeType::File,
            "Folder" => NodeType::Folder,
            other => {
                return Err(Error::internal(format!(
                    "backend returned unknown node type {other:?}"
                )))
            }
        };
        let variant = match (node_type, self.encrypted_crypto.folder, self.encrypted_crypto.file)
        {
            (NodeType::Folder, Some(folder), None) => {
                EncryptedNodeVariant::Folder(FolderCrypto {
                    armored_hash_key: ArmoredMessage(folder.armored_hash_key),
                    armored_extended_attributes: folder
                        .armored_extended_attributes
                        .map(ArmoredMessage),
                })
            }
            (NodeType::File, None, Some(file)) => EncryptedNodeVariant::File(FileCrypto {
                content_key_packet: file.content_key_packet,
                content_key_packet_signature: file
                    .content_key_packet_signature
                    .map(ArmoredSignature),
                active_revision: file
                    .active_revision
                    .map(RevisionDto::into_encrypted_revision)
                    .transpose()?,
            }),
            _ => {
                return Err(Error::internal(format!(
                    "node {} crypto branch does not match its type",
                    self.uid
                )))
            }
        };
        let membership = self
            .membership
            .map(|m| {
                Ok::<_, Error>(EncryptedMembership {
                    role: parse_role(&m.role)?,
                    invite_time: time_from_unix(m.invite_time)?,
                    inviter_email: m.inviter_email,
                })
            })
            .transpose()?;
        Ok(EncryptedNode {
            uid: NodeUid::from_raw(self.uid),
            parent_uid: self.parent_uid.map(NodeUid::from_raw),
            node_type,
            media_type: self.media_type,
            creation_time: time_from_unix(self.creation_time)?,
            trash_time: opt_time_from_unix(self.trash_time)?,
            share_id: self.share_id.map(ShareId),
            is_shared: self.is_shared,
            direct_role: parse_role(&self.direct_member_role)?,
            membership,
            hash: self.hash,
            encrypted_name: ArmoredMessage(self.encrypted_name),
            crypto: EncryptedCrypto {
                armored_key: ArmoredKey(self.encrypted_crypto.armored_key),
                armored_passphrase: ArmoredMessage(self.encrypted_crypto.armored_passphrase),
                armored_passphrase_signature: ArmoredSignature(
                    self.encrypted_crypto.armored_passphrase_signature,
                ),
                signature_email: self.encrypted_crypto.signature_email,
                name_signature_email: self.encrypted_crypto.name_signature_email,
                variant,
            },
        })
    }
}

/// Response holding a list of nodes; refused nodes are simply absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodesResponse {
    /// Response code.
    pub code: i64,
    /// Returned nodes, in backend order.
    #[serde(default)]
    pub nodes: Vec<NodeDto>,
}

/// One anchor-paginated page of child node UIDs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChildrenPage {
    /// Response code.
    pub code: i64,
    /// Child UIDs on this page.
    #[serde(default)]
    pub node_uids: Vec<String>,
    /// Anchor of the next page; absent on the last page.
    #[serde(default)]
    pub next_anchor: Option<String>,
}

/// One page-paginated page of trashed node UIDs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrashedPage {
    /// Response code.
    pub code: i64,
    /// Trashed UIDs on this page.
    #[serde(default)]
    pub node_uids: Vec<String>,
}

/// Response of a batched per-node mutation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MultiOpResponse {
    /// Response code.
    pub code: i64,
    /// Per-node outcomes.
    #[serde(default)]
    pub results: Vec<OpResultDto>,
}

/// Per-node outcome inside a batched mutation response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OpResultDto {
    /// Node the outcome refers to.
    pub uid: String,
    /// Per-node code.
    pub code: i64,
    /// Per-node error string.
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of a folder creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFolderResponse {
    /// Response code.
    pub code: i64,
    /// UID of the created folder.
    pub node_uid: String,
}

/// Response holding revisions of one node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RevisionsResponse {
    /// Response code.
    pub code: i64,
    /// Revisions, newest first.
    #[serde(default)]
    pub revisions: Vec<RevisionDto>,
}

/// Bare acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AckResponse {
    /// Response code.
    pub code: i64,
    /// Error string for non-success codes.
    #[serde(default)]
    pub error: Option<String>,
}

/// Rename request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RenameNodeRequest {
    /// Hash the backend should verify before applying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<String>,
    /// Re-encrypted name.
    pub encrypted_name: String,
    /// Name signing email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_signature_email: Option<String>,
    /// New name hash under the parent hash key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Move request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MoveNodeRequest {
    /// Hash the backend should verify before applying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<String>,
    /// Target folder UID.
    pub parent_uid: String,
    /// Passphrase re-encrypted under the new parent key.
    pub armored_passphrase: String,
    /// Fresh passphrase signature; only sent for anonymous nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub armored_passphrase_signature: Option<String>,
    /// Fresh key signing email; only sent for anonymous nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_email: Option<String>,
    /// Re-encrypted name.
    pub encrypted_name: String,
    /// Name signing email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_signature_email: Option<String>,
    /// New name hash under the target's hash key.
    pub hash: String,
    /// Content hash for photo de-duplication.
    // TODO: populate once the content digest is exposed by the download
    // pipeline; photo moves are refused by the backend without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Folder creation request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFolderRequest {
    /// Armored locked node key.
    pub armored_key: String,
    /// Encrypted node passphrase.
    pub armored_passphrase: String,
    /// Detached passphrase signature.
    pub armored_passphrase_signature: String,
    /// Key signing email.
    pub signature_email: String,
    /// Encrypted folder name.
    pub encrypted_name: String,
    /// Name signing email.
    pub name_signature_email: String,
    /// Name hash under the parent hash key.
    pub hash: String,
    /// Armored folder hash key.
    pub armored_hash_key: String,
    /// Armored folder extended attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub armored_extended_attributes: Option<String>,
}

// ===== Sharing =====

/// Invitation on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvitationDto {
    /// Composite invitation UID.
    pub uid: String,
    /// Invited email.
    pub invitee_email: String,
    /// Inviting email.
    pub inviter_email: String,
    /// Offered role.
    pub role: String,
    /// Invitation time, unix seconds.
    pub invitation_time: i64,
    /// Base64 share session key packet for the invitee.
    pub key_packet: String,
    /// Inviter signature over the key packet.
    #[serde(default)]
    pub key_packet_signature: Option<String>,
}

impl InvitationDto {
    /// Adapt to the internal encrypted invitation record.
    pub fn into_encrypted_invitation(self) -> Result<EncryptedInvitation> {
        Ok(EncryptedInvitation {
            uid: InvitationUid::from_raw(self.uid),
            invitee_email: self.invitee_email,
            inviter_email: self.inviter_email,
            role: parse_role(&self.role)?,
            invitation_time: time_from_unix(self.invitation_time)?,
            key_packet: self.key_packet,
            key_packet_signature: self.key_packet_signature.map(ArmoredSignature),
        })
    }
}

/// External invitation on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalInvitationDto {
    /// Composite invitation UID.
    pub uid: String,
    /// Invited email.
    pub invitee_email: String,
    /// Inviting email.
    pub inviter_email: String,
    /// Offered role.
    pub role: String,
    /// Invitation time, unix seconds.
    pub invitation_time: i64,
    /// `Pending` or `Registered`.
    pub state: String,
    /// Inviter signature binding the invitee email.
    #[serde(default)]
    pub signature: Option<String>,
}

impl ExternalInvitationDto {
    /// Adapt to the internal encrypted external invitation record.
    pub fn into_encrypted_external_invitation(self) -> Result<EncryptedExternalInvitation> {
        let state = match self.state.as_str() {
            "Pending" => ExternalInvitationState::Pending,
            "Registered" => ExternalInvitationState::Registered,
            other => {
                return Err(Error::internal(format!(
                    "backend returned unknown external invitation state {other:?}"
                )))
            }
        };
        Ok(EncryptedExternalInvitation {
            uid: InvitationUid::from_raw(self.uid),
            invitee_email: self.invitee_email,
            inviter_email: self.inviter_email,
            role: parse_role(&self.role)?,
            invitation_time: time_from_unix(self.invitation_time)?,
            state,
            signature: self.signature.map(ArmoredSignature),
        })
    }
}

/// Member on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemberDto {
    /// Composite member UID.
    pub uid: String,
    /// Member email.
    pub email: String,
    /// Inviter email.
    pub inviter_email: String,
    /// Held role.
    pub role: String,
    /// Invitation time, unix seconds.
    pub invitation_time: i64,
}

impl MemberDto {
    /// Adapt to the internal encrypted member record.
    pub fn into_encrypted_member(self) -> Result<EncryptedMember> {
        Ok(EncryptedMember {
            uid: MemberUid::from_raw(self.uid),
            email: self.email,
            inviter_email: self.inviter_email,
            role: parse_role(&self.role)?,
            invitation_time: time_from_unix(self.invitation_time)?,
        })
    }
}

/// Public link on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicLinkDto {
    /// Composite public link UID.
    pub uid: String,
    /// URL token.
    pub token: String,
    /// Creator email.
    pub creator_email: String,
    /// Granted role.
    pub role: String,
    /// Creation time, unix seconds.
    pub creation_time: i64,
    /// Expiration time, unix seconds.
    #[serde(default)]
    pub expiration_time: Option<i64>,
    /// `Legacy`, `Generated` or `GeneratedAndCustom`.
    pub password_type: String,
    /// Encrypted link password.
    #[serde(default)]
    pub encrypted_url_password: Option<String>,
}

impl PublicLinkDto {
    /// Adapt to the internal encrypted public link record.
    pub fn into_encrypted_public_link(self) -> Result<EncryptedPublicLink> {
        let password_type = match self.password_type.as_str() {
            "Legacy" => PublicLinkPasswordType::Legacy,
            "Generated" => PublicLinkPasswordType::Generated,
            "GeneratedAndCustom" => PublicLinkPasswordType::GeneratedAndCustom,
            other => {
                return Err(Error::internal(format!(
                    "backend returned unknown public link password type {other:?}"
                )))
            }
        };
        Ok(EncryptedPublicLink {
            uid: PublicLinkUid::from_raw(self.uid),
            token: self.token,
            creator_email: self.creator_email,
            role: parse_role(&self.role)?,
            creation_time: time_from_unix(self.creation_time)?,
            expiration_time: opt_time_from_unix(self.expiration_time)?,
            password_type,
            encrypted_url_password: self.encrypted_url_password.map(ArmoredMessage),
        })
    }
}

/// Bookmark on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookmarkDto {
    /// URL token of the bookmarked link.
    pub token: String,
    /// Creation time, unix seconds.
    pub creation_time: i64,
    /// Armored bookmarked node name.
    #[serde(default)]
    pub encrypted_node_name: Option<String>,
}

impl BookmarkDto {
    /// Adapt to the internal encrypted bookmark record.
    pub fn into_encrypted_bookmark(self) -> Result<EncryptedBookmark> {
        Ok(EncryptedBookmark {
            token: self.token,
            creation_time: time_from_unix(self.creation_time)?,
            encrypted_node_name: self.encrypted_node_name.map(ArmoredMessage),
        })
    }
}

/// Entry of the shared-by-me listing on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharedByMeDto {
    /// Shared node UID.
    pub node_uid: String,
    /// Its share id.
    pub share_id: String,
}

impl SharedByMeDto {
    /// Adapt to the internal entry.
    pub fn into_entry(self) -> SharedByMeEntry {
        SharedByMeEntry {
            node_uid: NodeUid::from_raw(self.node_uid),
            share_id: ShareId(self.share_id),
        }
    }
}

/// Invitation addressed to the caller, on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceivedInvitationDto {
    /// Composite invitation UID.
    pub uid: String,
    /// UID of the shared node.
    pub node_uid: String,
    /// Inviting email.
    pub inviter_email: String,
    /// Invited email (one of the caller's addresses).
    pub invitee_email: String,
    /// Offered role.
    pub role: String,
    /// Invitation time, unix seconds.
    pub invitation_time: i64,
    /// Base64 share session key packet for the caller.
    pub key_packet: String,
}

/// One anchor-paginated page of shared-by-me entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharedByMePage {
    /// Response code.
    pub code: i64,
    /// Entries on this page.
    #[serde(default)]
    pub items: Vec<SharedByMeDto>,
    /// Anchor of the next page; absent on the last page.
    #[serde(default)]
    pub next_anchor: Option<String>,
}

/// One anchor-paginated page of shared-with-me node UIDs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharedWithMePage {
    /// Response code.
    pub code: i64,
    /// Node UIDs on this page.
    #[serde(default)]
    pub node_uids: Vec<String>,
    /// Anchor of the next page; absent on the last page.
    #[serde(default)]
    pub next_anchor: Option<String>,
}

/// One anchor-paginated page of invitations addressed to the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceivedInvitationsPage {
    /// Response code.
    pub code: i64,
    /// Invitations on this page.
    #[serde(default)]
    pub invitations: Vec<ReceivedInvitationDto>,
    /// Anchor of the next page; absent on the last page.
    #[serde(default)]
    pub next_anchor: Option<String>,
}

/// Share listing response: invitations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvitationsResponse {
    /// Response code.
    pub code: i64,
    /// Invitations on the share.
    #[serde(default)]
    pub invitations: Vec<InvitationDto>,
}

/// Share listing response: external invitations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalInvitationsResponse {
    /// Response code.
    pub code: i64,
    /// External invitations on the share.
    #[serde(default)]
    pub external_invitations: Vec<ExternalInvitationDto>,
}

/// Share listing response: members.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MembersResponse {
    /// Response code.
    pub code: i64,
    /// Members of the share.
    #[serde(default)]
    pub members: Vec<MemberDto>,
}

/// Share listing response: public links.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicLinksResponse {
    /// Response code.
    pub code: i64,
    /// Public links of the share; more than one is possible on the wire.
    #[serde(default)]
    pub public_links: Vec<PublicLinkDto>,
}

/// Bookmarks listing response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookmarksResponse {
    /// Response code.
    pub code: i64,
    /// Saved bookmarks.
    #[serde(default)]
    pub bookmarks: Vec<BookmarkDto>,
}

/// Response carrying one invitation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvitationResponse {
    /// Response code.
    pub code: i64,
    /// The invitation.
    pub invitation: InvitationDto,
}

/// Response carrying one external invitation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExternalInvitationResponse {
    /// Response code.
    pub code: i64,
    /// The external invitation.
    pub external_invitation: ExternalInvitationDto,
}

/// Response carrying one public link.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicLinkResponse {
    /// Response code.
    pub code: i64,
    /// The public link.
    pub public_link: PublicLinkDto,
}

/// Invitation creation request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateInvitationRequest {
    /// Invited email.
    pub invitee_email: String,
    /// Offered role.
    pub role: String,
    /// Base64 share session key packet for the invitee.
    pub key_packet: String,
    /// Inviter signature over the key packet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_packet_signature: Option<String>,
}

/// External invitation creation request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateExternalInvitationRequest {
    /// Invited email.
    pub invitee_email: String,
    /// Offered role.
    pub role: String,
    /// Inviter signature binding the invitee email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Role update request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateRoleRequest {
    /// New role.
    pub role: String,
}

/// Public link creation request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePublicLinkRequest {
    /// Granted role.
    pub role: String,
    /// Expiration time, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    /// `Generated` or `GeneratedAndCustom`.
    pub password_type: String,
    /// Encrypted link password.
    pub encrypted_url_password: String,
}

/// Public link update request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdatePublicLinkRequest {
    /// New role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// New expiration time, unix seconds; explicit null clears it on the
    /// backend, which is why the field is double-optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<Option<i64>>,
    /// Re-encrypted link password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_url_password: Option<String>,
    /// New password mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_type: Option<String>,
}

/// Invitation acceptance request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AcceptInvitationRequest {
    /// Signature over the share session key with the member's address key.
    pub session_key_signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_codes_pass() {
        assert!(check_code(CODE_OK, None).is_ok());
        assert!(check_code(CODE_OK_MANY, None).is_ok());
        assert!(check_code(CODE_OK, Some("")).is_ok());
    }

    #[test]
    fn failure_codes_surface_as_api_errors() {
        assert!(matches!(
            check_code(2501, Some("does not exist")),
            Err(Error::Api { code: 2501, .. })
        ));
        assert!(matches!(
            check_code(CODE_OK, Some("partial failure")),
            Err(Error::Api { .. })
        ));
    }

    #[test]
    fn node_dto_adapts_folder_branch() {
        let dto: NodeDto = serde_json::from_value(json!({
            "Uid": "v1~n1",
            "ParentUid": "v1~root",
            "Type": "Folder",
            "CreationTime": 1_700_000_000,
            "DirectMemberRole": "Admin",
            "Hash": "abc",
            "EncryptedName": "-----NAME-----",
            "EncryptedCrypto": {
                "ArmoredKey": "-----KEY-----",
                "ArmoredPassphrase": "-----PASS-----",
                "ArmoredPassphraseSignature": "-----SIG-----",
                "SignatureEmail": "alice@example.com",
                "Folder": { "ArmoredHashKey": "-----HK-----" }
            }
        }))
        .unwrap();
        let node = dto.into_encrypted_node().unwrap();
        assert_eq!(node.uid.as_str(), "v1~n1");
        assert_eq!(node.node_type, NodeType::Folder);
        assert!(matches!(
            node.crypto.variant,
            EncryptedNodeVariant::Folder(_)
        ));
    }

    #[test]
    fn mismatched_crypto_branch_is_rejected() {
        let dto: NodeDto = serde_json::from_value(json!({
            "Uid": "v1~n1",
            "Type": "File",
            "CreationTime": 1_700_000_000,
            "DirectMemberRole": "Viewer",
            "EncryptedName": "-----NAME-----",
            "EncryptedCrypto": {
                "ArmoredKey": "k",
                "ArmoredPassphrase": "p",
                "ArmoredPassphraseSignature": "s",
                "Folder": { "ArmoredHashKey": "hk" }
            }
        }))
        .unwrap();
        assert!(matches!(
            dto.into_encrypted_node(),
            Err(Error::Internal { .. })
        ));
    }

    #[test]
    fn move_request_omits_absent_signature_fields() {
        let request = MoveNodeRequest {
            original_hash: Some("h".into()),
            parent_uid: "v~p".into(),
            armored_passphrase: "pp".into(),
            armored_passphrase_signature: None,
            signature_email: None,
            encrypted_name: "n".into(),
            name_signature_email: Some("a@example.com".into()),
            hash: "h2".into(),
            content_hash: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("ArmoredPassphraseSignature"));
        assert!(!object.contains_key("SignatureEmail"));
        assert!(!object.contains_key("ContentHash"));
        assert_eq!(object["Hash"], "h2");
    }
}
