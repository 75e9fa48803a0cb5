//! Wire-JSON rendering of encrypted fixtures
//!
//! Turns internal encrypted records back into the PascalCase JSON the
//! backend would deliver, so the in-memory server can serve seeded
//! fixtures through the real DTO path.

use serde_json::{json, Value};
use velum_core::{EncryptedNode, EncryptedNodeVariant, EncryptedRevision, MemberRole, NodeType};

fn role_json(role: MemberRole) -> &'static str {
    match role {
        MemberRole::Viewer => "Viewer",
        MemberRole::Editor => "Editor",
        MemberRole::Admin => "Admin",
    }
}

fn revision_json(revision: &EncryptedRevision) -> Value {
    json!({
        "Uid": revision.uid.as_str(),
        "State": match revision.state {
            velum_core::RevisionState::Active => "Active",
            velum_core::RevisionState::Superseded => "Superseded",
        },
        "CreationTime": revision.creation_time.timestamp(),
        "StorageSize": revision.storage_size,
        "SignatureEmail": revision.signature_email,
        "ArmoredExtendedAttributes": revision
            .armored_extended_attributes
            .as_ref()
            .map(|m| m.as_str()),
        "Thumbnails": revision
            .thumbnails
            .iter()
            .map(|t| json!({ "Id": t.id, "SizeClass": t.size_class }))
            .collect::<Vec<_>>(),
    })
}

/// Render one node as its wire DTO.
pub fn node_json(node: &EncryptedNode) -> Value {
    let crypto = &node.crypto;
    let (folder, file) = match &crypto.variant {
        EncryptedNodeVariant::Folder(folder) => (
            Some(json!({
                "ArmoredHashKey": folder.armored_hash_key.as_str(),
                "ArmoredExtendedAttributes": folder
                    .armored_extended_attributes
                    .as_ref()
                    .map(|m| m.as_str()),
            })),
            None,
        ),
        EncryptedNodeVariant::File(file) => (
            None,
            Some(json!({
                "ContentKeyPacket": file.content_key_packet,
                "ContentKeyPacketSignature": file
                    .content_key_packet_signature
                    .as_ref()
                    .map(|s| s.as_str()),
                "ActiveRevision": file.active_revision.as_ref().map(revision_json),
            })),
        ),
    };
    json!({
        "Uid": node.uid.as_str(),
        "ParentUid": node.parent_uid.as_ref().map(|u| u.as_str()),
        "Type": match node.node_type {
            NodeType::File => "File",
            NodeType::Folder => "Folder",
        },
        "MediaType": node.media_type,
        "CreationTime": node.creation_time.timestamp(),
        "TrashTime": node.trash_time.map(|t| t.timestamp()),
        "ShareId": node.share_id.as_ref().map(|s| s.as_str()),
        "IsShared": node.is_shared,
        "DirectMemberRole": role_json(node.direct_role),
        "Membership": node.membership.as_ref().map(|m| json!({
            "Role": role_json(m.role),
            "InviteTime": m.invite_time.timestamp(),
            "InviterEmail": m.inviter_email,
        })),
        "Hash": node.hash,
        "EncryptedName": node.encrypted_name.as_str(),
        "EncryptedCrypto": {
            "ArmoredKey": crypto.armored_key.as_str(),
            "ArmoredPassphrase": crypto.armored_passphrase.as_str(),
            "ArmoredPassphraseSignature": crypto.armored_passphrase_signature.as_str(),
            "SignatureEmail": crypto.signature_email,
            "NameSignatureEmail": crypto.name_signature_email,
            "Folder": folder,
            "File": file,
        },
    })
}
