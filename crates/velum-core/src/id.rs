//! Composite identifier types used across the Velum platform
//!
//! All external identifiers are opaque composite strings joined by a single
//! tilde. Recognized forms are `<volumeId>~<nodeId>`,
//! `<volumeId>~<nodeId>~<revisionId>`, `<shareId>~<invitationId>`,
//! `<shareId>~<memberId>`, `<shareId>~<publicLinkId>` and
//! `<volumeId>~<deviceId>`. Splitting a UID of the wrong arity fails with a
//! validation error. The codec is pure and never logs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '~';

/// Split `uid` into exactly `N` non-empty parts.
fn split_exact<const N: usize>(uid: &str, kind: &str) -> Result<[String; N]> {
    let parts: Vec<&str> = uid.split(SEPARATOR).collect();
    if parts.len() != N || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::validation(format!(
            "malformed {kind} UID: expected {N} parts"
        )));
    }
    Ok(std::array::from_fn(|i| parts[i].to_owned()))
}

fn join(parts: &[&str]) -> String {
    parts.join(&SEPARATOR.to_string())
}

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw backend identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }
    };
}

opaque_id! {
    /// Top-level unit of ownership; a user has at least one volume and
    /// external shares can cross volumes.
    VolumeId
}

opaque_id! {
    /// Access-control object attached to a node.
    ShareId
}

macro_rules! composite_uid {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $arity:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an already-assembled UID without checking its arity.
            ///
            /// Use this only for identifiers received opaquely (backend
            /// payloads, cache keys). Locally assembled UIDs go through the
            /// typed constructor.
            pub fn from_raw(uid: impl Into<String>) -> Self {
                Self(uid.into())
            }

            /// Borrow the raw UID string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                split_exact::<{ $arity }>(s, $kind)?;
                Ok(Self(s.to_owned()))
            }
        }
    };
}

composite_uid! {
    /// `<volumeId>~<nodeId>`: a file or folder record.
    NodeUid, "node", 2
}

impl NodeUid {
    /// Assemble a node UID from its parts.
    pub fn make(volume_id: &VolumeId, node_id: &str) -> Self {
        Self(join(&[volume_id.as_str(), node_id]))
    }

    /// Split into `(volumeId, nodeId)`.
    pub fn split(&self) -> Result<(VolumeId, String)> {
        let [volume, node] = split_exact::<2>(&self.0, "node")?;
        Ok((VolumeId(volume), node))
    }

    /// The volume component, used as the tree event scope.
    pub fn volume_id(&self) -> Result<VolumeId> {
        Ok(self.split()?.0)
    }

    /// Whether this UID belongs to `volume_id`.
    pub fn in_volume(&self, volume_id: &VolumeId) -> bool {
        self.split()
            .map(|(v, _)| v == *volume_id)
            .unwrap_or(false)
    }
}

composite_uid! {
    /// `<volumeId>~<nodeId>~<revisionId>`: one stored version of a file.
    RevisionUid, "revision", 3
}

impl RevisionUid {
    /// Assemble a revision UID from its parts.
    pub fn make(volume_id: &VolumeId, node_id: &str, revision_id: &str) -> Self {
        Self(join(&[volume_id.as_str(), node_id, revision_id]))
    }

    /// Split into `(volumeId, nodeId, revisionId)`.
    pub fn split(&self) -> Result<(VolumeId, String, String)> {
        let [volume, node, revision] = split_exact::<3>(&self.0, "revision")?;
        Ok((VolumeId(volume), node, revision))
    }

    /// UID of the node this revision belongs to.
    pub fn node_uid(&self) -> Result<NodeUid> {
        let (volume, node, _) = self.split()?;
        Ok(NodeUid::make(&volume, &node))
    }
}

composite_uid! {
    /// `<shareId>~<invitationId>`: a pending invitation on a share.
    InvitationUid, "invitation", 2
}

impl InvitationUid {
    /// Assemble an invitation UID from its parts.
    pub fn make(share_id: &ShareId, invitation_id: &str) -> Self {
        Self(join(&[share_id.as_str(), invitation_id]))
    }

    /// Split into `(shareId, invitationId)`.
    pub fn split(&self) -> Result<(ShareId, String)> {
        let [share, invitation] = split_exact::<2>(&self.0, "invitation")?;
        Ok((ShareId(share), invitation))
    }
}

composite_uid! {
    /// `<shareId>~<memberId>`: an accepted membership on a share.
    MemberUid, "member", 2
}

impl MemberUid {
    /// Assemble a member UID from its parts.
    pub fn make(share_id: &ShareId, member_id: &str) -> Self {
        Self(join(&[share_id.as_str(), member_id]))
    }

    /// Split into `(shareId, memberId)`.
    pub fn split(&self) -> Result<(ShareId, String)> {
        let [share, member] = split_exact::<2>(&self.0, "member")?;
        Ok((ShareId(share), member))
    }
}

composite_uid! {
    /// `<shareId>~<publicLinkId>`: a tokenized URL granting access to a share.
    PublicLinkUid, "public link", 2
}

impl PublicLinkUid {
    /// Assemble a public link UID from its parts.
    pub fn make(share_id: &ShareId, public_link_id: &str) -> Self {
        Self(join(&[share_id.as_str(), public_link_id]))
    }

    /// Split into `(shareId, publicLinkId)`.
    pub fn split(&self) -> Result<(ShareId, String)> {
        let [share, link] = split_exact::<2>(&self.0, "public link")?;
        Ok((ShareId(share), link))
    }
}

composite_uid! {
    /// `<volumeId>~<deviceId>`: a registered sync device.
    DeviceUid, "device", 2
}

impl DeviceUid {
    /// Assemble a device UID from its parts.
    pub fn make(volume_id: &VolumeId, device_id: &str) -> Self {
        Self(join(&[volume_id.as_str(), device_id]))
    }

    /// Split into `(volumeId, deviceId)`.
    pub fn split(&self) -> Result<(VolumeId, String)> {
        let [volume, device] = split_exact::<2>(&self.0, "device")?;
        Ok((VolumeId(volume), device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn node_uid_round_trip() {
        let uid = NodeUid::make(&VolumeId::new("vol1"), "node1");
        assert_eq!(uid.as_str(), "vol1~node1");
        let (volume, node) = uid.split().unwrap();
        assert_eq!(volume.as_str(), "vol1");
        assert_eq!(node, "node1");
    }

    #[test]
    fn revision_uid_knows_its_node() {
        let uid = RevisionUid::make(&VolumeId::new("v"), "n", "r");
        assert_eq!(uid.node_uid().unwrap().as_str(), "v~n");
    }

    #[test]
    fn wrong_arity_is_a_validation_error() {
        assert!(matches!(
            NodeUid::from_raw("only-one-part").split(),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            NodeUid::from_raw("a~b~c").split(),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            RevisionUid::from_raw("a~b").split(),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            NodeUid::from_raw("a~").split(),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn from_str_validates() {
        assert!("v~n".parse::<NodeUid>().is_ok());
        assert!("v".parse::<NodeUid>().is_err());
        assert!("v~n~r".parse::<RevisionUid>().is_ok());
    }

    #[test]
    fn volume_membership() {
        let uid = NodeUid::from_raw("V1~n1");
        assert!(uid.in_volume(&VolumeId::new("V1")));
        assert!(!uid.in_volume(&VolumeId::new("V2")));
    }

    proptest! {
        #[test]
        fn make_split_inverse(volume in "[^~]+", node in "[^~]+") {
            let uid = NodeUid::make(&VolumeId::new(volume.clone()), &node);
            let (v, n) = uid.split().unwrap();
            prop_assert_eq!(v.as_str(), volume.as_str());
            prop_assert_eq!(n, node);
        }

        #[test]
        fn split_make_inverse(volume in "[^~]+", node in "[^~]+", revision in "[^~]+") {
            let raw = format!("{volume}~{node}~{revision}");
            let uid = RevisionUid::from_raw(raw.clone());
            let (v, n, r) = uid.split().unwrap();
            let made = RevisionUid::make(&v, &n, &r);
            prop_assert_eq!(made.as_str(), raw.as_str());
        }
    }
}
