//! Sharing records: invitations, members, public links, bookmarks
//!
//! Each record exists in an encrypted form keyed by its share and a
//! decrypted form exposing `added_by_email` as an [`Author`] result.
//! Verification of these authors is not performed today; decrypt paths build
//! them as `Ok` until a policy is defined.

use crate::crypto::keys::{ArmoredMessage, ArmoredSignature};
use crate::crypto::verification::{Author, NameError};
use crate::id::{InvitationUid, MemberUid, NodeUid, PublicLinkUid, ShareId};
use crate::node::MemberRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Invitation to a service user, as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInvitation {
    /// Composite invitation UID.
    pub uid: InvitationUid,
    /// Invited email.
    pub invitee_email: String,
    /// Inviting email.
    pub inviter_email: String,
    /// Role offered by the invitation.
    pub role: MemberRole,
    /// When the invitation was created.
    pub invitation_time: DateTime<Utc>,
    /// Share session key encrypted to the invitee, base64.
    pub key_packet: String,
    /// Inviter's signature over the key packet.
    pub key_packet_signature: Option<ArmoredSignature>,
}

/// Invitation after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedInvitation {
    /// Composite invitation UID.
    pub uid: InvitationUid,
    /// Invited email.
    pub invitee_email: String,
    /// Who invited. Always `Ok` today; see module docs.
    pub added_by_email: Author,
    /// Role offered by the invitation.
    pub role: MemberRole,
    /// When the invitation was created.
    pub invitation_time: DateTime<Utc>,
}

/// Registration state of an invitation sent to a non-service email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalInvitationState {
    /// The address has not created an account yet.
    Pending,
    /// The address registered; the invitation can be converted.
    Registered,
}

/// Invitation to a non-service email, as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedExternalInvitation {
    /// Composite invitation UID.
    pub uid: InvitationUid,
    /// Invited email.
    pub invitee_email: String,
    /// Inviting email.
    pub inviter_email: String,
    /// Role offered by the invitation.
    pub role: MemberRole,
    /// When the invitation was created.
    pub invitation_time: DateTime<Utc>,
    /// Registration state of the invited address.
    pub state: ExternalInvitationState,
    /// Inviter's signature binding the invitee email to the share.
    pub signature: Option<ArmoredSignature>,
}

/// External invitation after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedExternalInvitation {
    /// Composite invitation UID.
    pub uid: InvitationUid,
    /// Invited email.
    pub invitee_email: String,
    /// Who invited. Always `Ok` today; see module docs.
    pub added_by_email: Author,
    /// Role offered by the invitation.
    pub role: MemberRole,
    /// When the invitation was created.
    pub invitation_time: DateTime<Utc>,
    /// Registration state of the invited address.
    pub state: ExternalInvitationState,
}

/// Share member, as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMember {
    /// Composite member UID.
    pub uid: MemberUid,
    /// Member email.
    pub email: String,
    /// Email of whoever added the member.
    pub inviter_email: String,
    /// Role held by the member.
    pub role: MemberRole,
    /// When the member was invited.
    pub invitation_time: DateTime<Utc>,
}

/// Share member after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedMember {
    /// Composite member UID.
    pub uid: MemberUid,
    /// Member email.
    pub email: String,
    /// Who added the member. Always `Ok` today; see module docs.
    pub added_by_email: Author,
    /// Role held by the member.
    pub role: MemberRole,
    /// When the member was invited.
    pub invitation_time: DateTime<Utc>,
}

/// How a public link is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicLinkPasswordType {
    /// Pre-generated-password link; cannot be updated.
    Legacy,
    /// Protected by the generated password only.
    Generated,
    /// Generated password plus a caller-chosen custom part.
    GeneratedAndCustom,
}

/// Public link, as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPublicLink {
    /// Composite public link UID.
    pub uid: PublicLinkUid,
    /// URL token of the link.
    pub token: String,
    /// Email of the link creator.
    pub creator_email: String,
    /// Role granted through the link.
    pub role: MemberRole,
    /// When the link was created.
    pub creation_time: DateTime<Utc>,
    /// When the link expires, if ever.
    pub expiration_time: Option<DateTime<Utc>>,
    /// Password protection mode.
    pub password_type: PublicLinkPasswordType,
    /// Link password (generated, optionally concatenated with the custom
    /// part), encrypted to the share creator.
    pub encrypted_url_password: Option<ArmoredMessage>,
}

/// Public link after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedPublicLink {
    /// Composite public link UID.
    pub uid: PublicLinkUid,
    /// Full public URL including the password fragment.
    pub url: String,
    /// Who created the link. Always `Ok` today; see module docs.
    pub added_by_email: Author,
    /// Role granted through the link.
    pub role: MemberRole,
    /// When the link was created.
    pub creation_time: DateTime<Utc>,
    /// When the link expires, if ever.
    pub expiration_time: Option<DateTime<Utc>>,
    /// Password protection mode.
    pub password_type: PublicLinkPasswordType,
    /// Custom password part, when one is set and decryptable.
    pub custom_password: Option<String>,
}

/// Bookmark of a public link saved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBookmark {
    /// URL token of the bookmarked link.
    pub token: String,
    /// When the bookmark was saved.
    pub creation_time: DateTime<Utc>,
    /// Armored name of the bookmarked node, encrypted under the link
    /// password.
    pub encrypted_node_name: Option<ArmoredMessage>,
}

/// Bookmark after decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedBookmark {
    /// URL token of the bookmarked link.
    pub token: String,
    /// When the bookmark was saved.
    pub creation_time: DateTime<Utc>,
    /// Name of the bookmarked node, when decryptable.
    pub node_name: Result<String, NameError>,
}

/// Everything shared on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SharingInfo {
    /// Pending invitations to service users.
    pub invitations: Vec<DecryptedInvitation>,
    /// Pending invitations to external emails.
    pub external_invitations: Vec<DecryptedExternalInvitation>,
    /// Accepted members.
    pub members: Vec<DecryptedMember>,
    /// The share's public link; the backend may return several, the core
    /// uses the first.
    pub public_link: Option<DecryptedPublicLink>,
}

/// A node shared by the caller, with its share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedByMeEntry {
    /// The shared node.
    pub node_uid: NodeUid,
    /// Its share.
    pub share_id: ShareId,
}
