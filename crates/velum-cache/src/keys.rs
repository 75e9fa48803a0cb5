//! Crypto cache: decrypted node keys
//!
//! Process-local map from node UID to decrypted key material. Populated
//! opportunistically whenever a node is decrypted, evicted on logout or
//! purge, and never persisted in clear.

use parking_lot::RwLock;
use std::collections::HashMap;
use velum_core::{DecryptedNodeKeys, NodeUid};

/// Short-lived in-memory store of decrypted node keys.
#[derive(Debug, Default)]
pub struct CryptoCache {
    keys: RwLock<HashMap<NodeUid, DecryptedNodeKeys>>,
}

impl CryptoCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the keys of a node.
    pub fn set(&self, uid: &NodeUid, keys: DecryptedNodeKeys) {
        self.keys.write().insert(uid.clone(), keys);
    }

    /// Keys of a node, if cached.
    pub fn get(&self, uid: &NodeUid) -> Option<DecryptedNodeKeys> {
        self.keys.read().get(uid).cloned()
    }

    /// Drop the keys of a node.
    pub fn remove(&self, uid: &NodeUid) {
        self.keys.write().remove(uid);
    }

    /// Drop the keys of every node in a volume.
    pub fn remove_volume(&self, volume_id: &velum_core::VolumeId) {
        self.keys
            .write()
            .retain(|uid, _| !uid.in_volume(volume_id));
    }

    /// Drop everything; called on logout.
    pub fn purge(&self) {
        self.keys.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velum_core::{Passphrase, PrivateKey, SessionKey};

    fn keys() -> DecryptedNodeKeys {
        DecryptedNodeKeys {
            passphrase: Passphrase::new("secret"),
            key: PrivateKey::new("fp", vec![1, 2, 3]),
            passphrase_session_key: SessionKey::new(vec![4, 5], None),
            content_key_packet_session_key: None,
            hash_key: None,
        }
    }

    #[test]
    fn set_get_remove() {
        let cache = CryptoCache::new();
        let uid = NodeUid::from_raw("v~n");
        assert!(cache.get(&uid).is_none());
        cache.set(&uid, keys());
        assert_eq!(cache.get(&uid).unwrap().key.key_id(), "fp");
        cache.remove(&uid);
        assert!(cache.get(&uid).is_none());
    }

    #[test]
    fn purge_clears_all() {
        let cache = CryptoCache::new();
        cache.set(&NodeUid::from_raw("v~a"), keys());
        cache.set(&NodeUid::from_raw("v~b"), keys());
        cache.purge();
        assert!(cache.get(&NodeUid::from_raw("v~a")).is_none());
    }
}
