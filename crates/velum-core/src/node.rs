//! Node records in encrypted and decrypted form
//!
//! [`EncryptedNode`] is the record as delivered by the backend; the
//! folder/file split is a tagged union ([`EncryptedNodeVariant`]), not a
//! class hierarchy. [`DecryptedNode`] is what callers see after the crypto
//! service has run: names and authors are carried as results so a record
//! degraded by a verification or decryption failure is still usable.
//!
//! Parent links are UIDs, never owning pointers; parent look-ups go through
//! the cache.

use crate::crypto::keys::{
    ArmoredKey, ArmoredMessage, ArmoredSignature, HashKey, Passphrase, PrivateKey, SessionKey,
};
use crate::crypto::verification::{Author, NameError};
use crate::error::Error;
use crate::id::{NodeUid, RevisionUid, ShareId, VolumeId};
use crate::xattr::{ParsedFileExtendedAttributes, ParsedFolderExtendedAttributes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Leaf node with content revisions.
    File,
    /// Container node with a hash key for child names.
    Folder,
}

/// A user's role on a share or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Read-only access.
    Viewer,
    /// Read-write access.
    Editor,
    /// Full control, including sharing.
    Admin,
}

/// State of a file revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionState {
    /// The revision currently served for the file.
    Active,
    /// An older revision kept for restore.
    Superseded,
}

/// Thumbnail descriptor attached to a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Backend identifier of the thumbnail blob.
    pub id: String,
    /// Thumbnail size class as reported by the backend.
    pub size_class: String,
}

/// Membership record as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMembership {
    /// Role granted by the membership.
    pub role: MemberRole,
    /// When the user was invited.
    pub invite_time: DateTime<Utc>,
    /// Email of the inviter.
    pub inviter_email: Option<String>,
}

/// Membership record after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedMembership {
    /// Role granted by the membership.
    pub role: MemberRole,
    /// When the user was invited.
    pub invite_time: DateTime<Utc>,
    /// Who shared the node. Verification of this author is not performed
    /// today; the result is always `Ok`.
    pub shared_by: Author,
}

/// Crypto material specific to folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCrypto {
    /// Armored message holding the per-folder HMAC hash key.
    pub armored_hash_key: ArmoredMessage,
    /// Armored extended attributes, if the folder carries any.
    pub armored_extended_attributes: Option<ArmoredMessage>,
}

/// Crypto material specific to files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCrypto {
    /// Base64 session-key packet for the file content.
    pub content_key_packet: String,
    /// Detached signature over the content-key packet, when present.
    pub content_key_packet_signature: Option<ArmoredSignature>,
    /// Descriptor of the active revision, when the file has one.
    pub active_revision: Option<EncryptedRevision>,
}

/// Folder/file branch of a node's crypto bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptedNodeVariant {
    /// Folder branch.
    Folder(FolderCrypto),
    /// File branch.
    File(FileCrypto),
}

/// The crypto bundle of an encrypted node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCrypto {
    /// Armored locked node key.
    pub armored_key: ArmoredKey,
    /// Node passphrase, encrypted to the parent key (or share key for
    /// roots).
    pub armored_passphrase: ArmoredMessage,
    /// Detached signature over the passphrase.
    pub armored_passphrase_signature: ArmoredSignature,
    /// Email whose keys signed the passphrase; absent on anonymous nodes.
    pub signature_email: Option<String>,
    /// Email whose keys signed the name, when different from the key signer.
    pub name_signature_email: Option<String>,
    /// Folder or file branch.
    pub variant: EncryptedNodeVariant,
}

/// Revision descriptor as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRevision {
    /// Composite revision UID.
    pub uid: RevisionUid,
    /// Active or superseded.
    pub state: RevisionState,
    /// When the revision was uploaded.
    pub creation_time: DateTime<Utc>,
    /// Encrypted size on storage, in bytes.
    pub storage_size: u64,
    /// Email whose keys signed the revision content and attributes.
    pub signature_email: Option<String>,
    /// Armored extended attributes of the revision.
    pub armored_extended_attributes: Option<ArmoredMessage>,
    /// Thumbnails available for the revision.
    pub thumbnails: Vec<Thumbnail>,
}

/// Node record as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNode {
    /// Composite node UID.
    pub uid: NodeUid,
    /// Parent node UID; absent on root nodes, which must carry a share id.
    pub parent_uid: Option<NodeUid>,
    /// File or folder.
    pub node_type: NodeType,
    /// Media type reported by the uploader.
    pub media_type: Option<String>,
    /// When the node was created.
    pub creation_time: DateTime<Utc>,
    /// When the node was trashed, if it is in the trash.
    pub trash_time: Option<DateTime<Utc>>,
    /// Share attached to the node, if any.
    pub share_id: Option<ShareId>,
    /// Whether the node is shared.
    pub is_shared: bool,
    /// The caller's direct role on the node.
    pub direct_role: MemberRole,
    /// Membership record for shared-with-me nodes.
    pub membership: Option<EncryptedMembership>,
    /// Keyed HMAC of the name under the parent hash key; absent on roots.
    pub hash: Option<String>,
    /// Armored encrypted node name.
    pub encrypted_name: ArmoredMessage,
    /// Crypto bundle.
    pub crypto: EncryptedCrypto,
}

impl EncryptedNode {
    /// Folder crypto branch, or an internal error for files.
    pub fn folder_crypto(&self) -> Result<&FolderCrypto, Error> {
        match &self.crypto.variant {
            EncryptedNodeVariant::Folder(folder) => Ok(folder),
            EncryptedNodeVariant::File(_) => Err(Error::internal(format!(
                "node {} is a file, expected a folder",
                self.uid
            ))),
        }
    }

    /// File crypto branch, or an internal error for folders.
    pub fn file_crypto(&self) -> Result<&FileCrypto, Error> {
        match &self.crypto.variant {
            EncryptedNodeVariant::File(file) => Ok(file),
            EncryptedNodeVariant::Folder(_) => Err(Error::internal(format!(
                "node {} is a folder, expected a file",
                self.uid
            ))),
        }
    }
}

/// Revision after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedRevision {
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
    /// Parsed extended attributes.
    pub attributes: ParsedFileExtendedAttributes,
    /// Thumbnails available for the revision.
    pub thumbnails: Vec<Thumbnail>,
}

/// Node record visible to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedNode {
    /// Composite node UID.
    pub uid: NodeUid,
    /// Parent node UID; absent on root nodes.
    pub parent_uid: Option<NodeUid>,
    /// File or folder.
    pub node_type: NodeType,
    /// Media type reported by the uploader.
    pub media_type: Option<String>,
    /// When the node was created.
    pub creation_time: DateTime<Utc>,
    /// When the node was trashed, if it is in the trash.
    pub trash_time: Option<DateTime<Utc>>,
    /// Share attached to the node, if any.
    pub share_id: Option<ShareId>,
    /// Whether the node is shared.
    pub is_shared: bool,
    /// The caller's direct role on the node.
    pub direct_role: MemberRole,
    /// Membership record for shared-with-me nodes.
    pub membership: Option<DecryptedMembership>,
    /// Keyed HMAC of the name under the parent hash key; absent on roots.
    pub hash: Option<String>,
    /// Decrypted and validated name, or why it is unavailable.
    pub name: Result<String, NameError>,
    /// Who signed the node keys; the worst of the node-key, content-key,
    /// hash-key and folder-attributes signatures.
    pub key_author: Author,
    /// Who signed the name.
    pub name_author: Author,
    /// Active revision, for files.
    pub active_revision: Option<DecryptedRevision>,
    /// Parsed folder attributes, for folders that carry them.
    pub folder_attributes: Option<ParsedFolderExtendedAttributes>,
    /// Decryption failures collected while producing this record.
    pub errors: Vec<Error>,
    /// Stale records must not be returned to callers; they are refetched.
    pub is_stale: bool,
    /// Volume id used as the routing key for tree refresh/remove events.
    pub tree_event_scope_id: VolumeId,
}

impl DecryptedNode {
    /// Whether the node sits in the trash.
    pub fn is_trashed(&self) -> bool {
        self.trash_time.is_some()
    }
}

/// Decrypted key material of one node. In-memory only, never persisted.
#[derive(Debug, Clone)]
pub struct DecryptedNodeKeys {
    /// The node passphrase.
    pub passphrase: Passphrase,
    /// Unlocked node private key.
    pub key: PrivateKey,
    /// Session key the passphrase was encrypted with.
    pub passphrase_session_key: SessionKey,
    /// Session key of the content-key packet, for files.
    pub content_key_packet_session_key: Option<SessionKey>,
    /// Per-folder HMAC key, for folders.
    pub hash_key: Option<HashKey>,
}
