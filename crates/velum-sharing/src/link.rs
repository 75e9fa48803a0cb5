//! Public-link URLs and passwords
//!
//! Regular nodes share as `https://<host>/<shareId>/<type>/<nodeId>`;
//! document nodes open through the docs application instead. The generated
//! password is always [`GENERATED_PASSWORD_LENGTH`] characters and rides as
//! the URL fragment, with any custom part appended.

use rand::distributions::Alphanumeric;
use rand::Rng;
use velum_core::constants::GENERATED_PASSWORD_LENGTH;
use velum_core::{ClientConfig, DecryptedNode, NodeType, Result, ShareId};

/// Document kinds that open through the docs application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    /// Rich-text document.
    Doc,
    /// Spreadsheet.
    Sheet,
}

impl DocKind {
    /// Recognize a document media type.
    pub fn from_media_type(media_type: Option<&str>) -> Option<Self> {
        match media_type {
            Some("application/vnd.docs.document") => Some(Self::Doc),
            Some("application/vnd.docs.spreadsheet") => Some(Self::Sheet),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Sheet => "sheet",
        }
    }
}

/// The public URL of a shared node, without the password fragment.
pub fn public_link_url(
    config: &ClientConfig,
    share_id: &ShareId,
    node: &DecryptedNode,
) -> Result<String> {
    let (volume_id, node_id) = node.uid.split()?;
    if let Some(kind) = DocKind::from_media_type(node.media_type.as_deref()) {
        return Ok(format!(
            "https://docs.{}/doc?type={}&mode=open&volumeId={}&linkId={}",
            config.public_link_host,
            kind.as_str(),
            volume_id,
            node_id
        ));
    }
    let node_type = match node.node_type {
        NodeType::File => "file",
        NodeType::Folder => "folder",
    };
    Ok(format!(
        "https://{}/{}/{}/{}",
        config.public_link_host, share_id, node_type, node_id
    ))
}

/// Append the link password as the URL fragment.
pub fn with_password_fragment(url: &str, password: &str) -> String {
    format!("{url}#{password}")
}

/// A fresh generated password part.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Split a full link password into its generated and custom parts, or
/// `None` for legacy passwords of unexpected length.
pub fn split_password(password: &str) -> Option<(&str, Option<&str>)> {
    if password.len() < GENERATED_PASSWORD_LENGTH {
        return None;
    }
    let (generated, custom) = password.split_at(GENERATED_PASSWORD_LENGTH);
    Some((generated, (!custom.is_empty()).then_some(custom)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_have_the_fixed_length() {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn split_recognizes_custom_parts() {
        assert_eq!(
            split_password("abcdefghijkl"),
            Some(("abcdefghijkl", None))
        );
        assert_eq!(
            split_password("abcdefghijklsecret"),
            Some(("abcdefghijkl", Some("secret")))
        );
        assert_eq!(split_password("short"), None);
    }

    #[test]
    fn password_rides_as_fragment() {
        assert_eq!(
            with_password_fragment("https://drive.velum.io/s1/file/n1", "abcdefghijkl"),
            "https://drive.velum.io/s1/file/n1#abcdefghijkl"
        );
    }
}
