//! Shares service interface
//!
//! Share lifecycle and share key management live outside the metadata core.
//! The core needs share private keys to decrypt root nodes and to run
//! sharing mutations, and delegates share creation/deletion when a node is
//! shared or fully unshared.

use crate::crypto::keys::{PrivateKey, SessionKey};
use crate::error::Result;
use crate::id::{NodeUid, ShareId};
use async_trait::async_trait;

/// Shares service operations required by the metadata core.
#[async_trait]
pub trait ShareService: Send + Sync {
    /// Decrypted private key of a share.
    async fn share_key(&self, share_id: &ShareId) -> Result<PrivateKey>;

    /// Session key of the share passphrase, used to build invitation key
    /// packets.
    async fn share_session_key(&self, share_id: &ShareId) -> Result<SessionKey>;

    /// Create a standard share on a node, returning its id.
    async fn create_share(&self, node_uid: &NodeUid) -> Result<ShareId>;

    /// Delete a share once its last collaborator is removed.
    async fn delete_share(&self, share_id: &ShareId) -> Result<()>;
}
