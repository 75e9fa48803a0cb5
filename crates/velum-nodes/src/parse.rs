//! Parsing: crypto output → caller-visible node
//!
//! Normalizes an [`UnparsedNode`] into a [`DecryptedNode`]: validates the
//! decrypted name, parses extended attributes (folder and active-revision),
//! clears the stale flag and derives the tree event scope from the UID.

use velum_core::xattr::{parse_file_extended_attributes, parse_folder_extended_attributes};
use velum_core::{validate_node_name, DecryptedNode, DecryptedRevision, NameError, Result};
use velum_crypto::{UnparsedNode, UnparsedRevision};

/// Turn crypto output into the cacheable node record.
pub fn parse_node(unparsed: UnparsedNode) -> Result<DecryptedNode> {
    let tree_event_scope_id = unparsed.uid.volume_id()?;

    let name = match unparsed.name {
        Ok(name) => match validate_node_name(&name) {
            Ok(()) => Ok(name),
            Err(error) => Err(NameError::Invalid { name, error }),
        },
        Err(error) => Err(error),
    };

    let creation_time = unparsed.creation_time;
    let active_revision = unparsed
        .active_revision
        .map(|revision| parse_revision(revision, creation_time));

    let folder_attributes = unparsed
        .folder_attributes_raw
        .map(|raw| parse_folder_extended_attributes(Some(&raw)));

    Ok(DecryptedNode {
        uid: unparsed.uid,
        parent_uid: unparsed.parent_uid,
        node_type: unparsed.node_type,
        media_type: unparsed.media_type,
        creation_time: unparsed.creation_time,
        trash_time: unparsed.trash_time,
        share_id: unparsed.share_id,
        is_shared: unparsed.is_shared,
        direct_role: unparsed.direct_role,
        membership: unparsed.membership,
        hash: unparsed.hash,
        name,
        key_author: unparsed.key_author,
        name_author: unparsed.name_author,
        active_revision,
        folder_attributes,
        errors: unparsed.errors,
        is_stale: false,
        tree_event_scope_id,
    })
}

/// Parse one revision's extended attributes. The legacy block-size resort
/// keys off the *node's* creation time, not the revision's.
pub fn parse_revision(
    revision: UnparsedRevision,
    node_creation_time: chrono::DateTime<chrono::Utc>,
) -> DecryptedRevision {
    DecryptedRevision {
        uid: revision.uid,
        state: revision.state,
        creation_time: revision.creation_time,
        storage_size: revision.storage_size,
        content_author: revision.content_author,
        attributes: parse_file_extended_attributes(
            node_creation_time,
            revision.attributes_raw.as_deref(),
        ),
        thumbnails: revision.thumbnails,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use velum_core::{MemberRole, NameValidationError, NodeType, NodeUid};

    fn unparsed(uid: &str, name: &str) -> UnparsedNode {
        UnparsedNode {
            uid: NodeUid::from_raw(uid),
            parent_uid: Some(NodeUid::from_raw("v~p")),
            node_type: NodeType::Folder,
            media_type: None,
            creation_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap(),
            trash_time: None,
            share_id: None,
            is_shared: false,
            direct_role: MemberRole::Admin,
            membership: None,
            hash: Some("h".to_owned()),
            name: Ok(name.to_owned()),
            key_author: Ok(Some("a@example.com".to_owned())),
            name_author: Ok(Some("a@example.com".to_owned())),
            active_revision: None,
            folder_attributes_raw: None,
            errors: Vec::new(),
        }
    }

    #[test]
    fn derives_tree_event_scope_from_uid() {
        let node = parse_node(unparsed("vol1~n1", "ok")).unwrap();
        assert_eq!(node.tree_event_scope_id.as_str(), "vol1");
        assert!(!node.is_stale);
    }

    #[test]
    fn invalid_name_is_downgraded_not_dropped() {
        let node = parse_node(unparsed("v~n", "a/b")).unwrap();
        match node.name {
            Err(NameError::Invalid { name, error }) => {
                assert_eq!(name, "a/b");
                assert_eq!(error, NameValidationError::IllegalCharacter);
            }
            other => panic!("expected invalid name, got {other:?}"),
        }
    }

    #[test]
    fn folder_attributes_are_parsed() {
        let mut input = unparsed("v~n", "ok");
        input.folder_attributes_raw =
            Some(r#"{"Common":{"ModificationTime":"2024-06-01T12:00:00.000Z"}}"#.to_owned());
        let node = parse_node(input).unwrap();
        assert!(node
            .folder_attributes
            .unwrap()
            .claimed_modification_time
            .is_some());
    }
}
