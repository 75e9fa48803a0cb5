//! Crypto service output types
//!
//! Decryption produces an *unparsed* node: names are decrypted but not yet
//! validated, and extended attributes are decrypted JSON text. The nodes
//! module turns this into the caller-visible record.

use chrono::{DateTime, Utc};
use velum_core::{
    ArmoredKey, ArmoredMessage, ArmoredSignature, Author, DecryptedMembership, DecryptedNodeKeys,
    Error, MemberRole, NameError, NodeType, NodeUid, RevisionState, RevisionUid, ShareId,
    Thumbnail,
};

/// A decrypted revision whose extended attributes are still JSON text.
#[derive(Debug, Clone)]
pub struct UnparsedRevision {
    /// Composite revision UID.
    pub uid: RevisionUid,
    /// Active or superseded.
    pub state: RevisionState,
    /// When the revision was uploaded.
    pub creation_time: DateTime<Utc>,
    /// Encrypted size on storage, in bytes.
    pub storage_size: u64,
    /// Who signed the revision content.
    pub content_author: Author,
    /// Decrypted extended-attributes JSON, when present and decryptable.
    pub attributes_raw: Option<String>,
    /// Thumbnails available for the revision.
    pub thumbnails: Vec<Thumbnail>,
}

/// A decrypted node before parsing.
#[derive(Debug, Clone)]
pub struct UnparsedNode {
    /// Composite node UID.
    pub uid: NodeUid,
    /// Parent node UID; absent on roots.
    pub parent_uid: Option<NodeUid>,
    /// File or folder.
    pub node_type: NodeType,
    /// Uploader-reported media type.
    pub media_type: Option<String>,
    /// When the node was created.
    pub creation_time: DateTime<Utc>,
    /// When the node was trashed, if it is in the trash.
    pub trash_time: Option<DateTime<Utc>>,
    /// Share attached to the node, if any.
    pub share_id: Option<ShareId>,
    /// Whether the node is shared.
    pub is_shared: bool,
    /// Caller's direct role.
    pub direct_role: MemberRole,
    /// Membership record for shared-with-me nodes.
    pub membership: Option<DecryptedMembership>,
    /// Name hash under the parent hash key.
    pub hash: Option<String>,
    /// Decrypted name, not yet validated.
    pub name: Result<String, NameError>,
    /// Worst-of key author across node key, content key, hash key and
    /// folder attributes.
    pub key_author: Author,
    /// Who signed the name.
    pub name_author: Author,
    /// Active revision, for files.
    pub active_revision: Option<UnparsedRevision>,
    /// Decrypted folder extended-attributes JSON, for folders carrying any.
    pub folder_attributes_raw: Option<String>,
    /// Decryption failures collected while producing this record.
    pub errors: Vec<Error>,
}

/// Decryption result: the unparsed node plus its keys when the node key
/// itself could be decrypted.
#[derive(Debug)]
pub struct DecryptedNodeBundle {
    /// The decrypted record.
    pub node: UnparsedNode,
    /// Key material; `None` when the node key failed to decrypt.
    pub keys: Option<DecryptedNodeKeys>,
}

/// Encrypted material for a folder creation.
#[derive(Debug, Clone)]
pub struct EncryptedFolderMaterial {
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

/// Encrypted material for a rename.
#[derive(Debug, Clone)]
pub struct RenameMaterial {
    /// Re-encrypted name.
    pub encrypted_name: ArmoredMessage,
    /// Name signing email.
    pub name_signature_email: String,
    /// New name hash; absent when the parent hash key is unavailable
    /// (root rename).
    pub hash: Option<String>,
}

/// Encrypted material for a move.
#[derive(Debug, Clone)]
pub struct MoveMaterial {
    /// Passphrase re-encrypted under the new parent key.
    pub armored_passphrase: ArmoredMessage,
    /// Fresh passphrase signature; anonymous nodes only.
    pub armored_passphrase_signature: Option<ArmoredSignature>,
    /// Fresh key signing email; anonymous nodes only.
    pub signature_email: Option<String>,
    /// Re-encrypted name.
    pub encrypted_name: ArmoredMessage,
    /// Name signing email.
    pub name_signature_email: String,
    /// Name hash under the new parent's hash key.
    pub hash: String,
}
