//! Sharing listings cache
//!
//! The shared-by-me and shared-with-me collections are cached as *full
//! lists*: incremental `add`/`remove` are only meaningful once a complete
//! listing has been stored with `set`, and calling them earlier is a bug
//! surfaced as an error. Iterators populate the cache only after their
//! backend iteration completed.

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use velum_core::sharing::SharedByMeEntry;
use velum_core::{Error, NodeUid, Result};

/// Process-local cache of the sharing listings.
#[derive(Debug, Default)]
pub struct SharingCache {
    shared_by_me: RwLock<Option<IndexMap<NodeUid, SharedByMeEntry>>>,
    shared_with_me: RwLock<Option<IndexSet<NodeUid>>>,
}

impl SharingCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The full shared-by-me listing, if one was stored.
    pub fn shared_by_me(&self) -> Option<Vec<SharedByMeEntry>> {
        self.shared_by_me
            .read()
            .as_ref()
            .map(|entries| entries.values().cloned().collect())
    }

    /// Store a complete shared-by-me listing.
    pub fn set_shared_by_me(&self, entries: Vec<SharedByMeEntry>) {
        let map = entries
            .into_iter()
            .map(|entry| (entry.node_uid.clone(), entry))
            .collect();
        *self.shared_by_me.write() = Some(map);
    }

    /// Add one entry to a previously stored listing.
    pub fn add_shared_by_me(&self, entry: SharedByMeEntry) -> Result<()> {
        let mut guard = self.shared_by_me.write();
        let entries = guard.as_mut().ok_or_else(|| {
            Error::internal("shared-by-me cache updated before a full listing was set")
        })?;
        entries.insert(entry.node_uid.clone(), entry);
        Ok(())
    }

    /// Remove one entry from a previously stored listing.
    pub fn remove_shared_by_me(&self, node_uid: &NodeUid) -> Result<()> {
        let mut guard = self.shared_by_me.write();
        let entries = guard.as_mut().ok_or_else(|| {
            Error::internal("shared-by-me cache updated before a full listing was set")
        })?;
        entries.shift_remove(node_uid);
        Ok(())
    }

    /// The full shared-with-me listing, if one was stored.
    pub fn shared_with_me(&self) -> Option<Vec<NodeUid>> {
        self.shared_with_me
            .read()
            .as_ref()
            .map(|uids| uids.iter().cloned().collect())
    }

    /// Store a complete shared-with-me listing.
    pub fn set_shared_with_me(&self, uids: Vec<NodeUid>) {
        *self.shared_with_me.write() = Some(uids.into_iter().collect());
    }

    /// Add one node to a previously stored listing.
    pub fn add_shared_with_me(&self, uid: NodeUid) -> Result<()> {
        let mut guard = self.shared_with_me.write();
        let uids = guard.as_mut().ok_or_else(|| {
            Error::internal("shared-with-me cache updated before a full listing was set")
        })?;
        uids.insert(uid);
        Ok(())
    }

    /// Remove one node from a previously stored listing.
    pub fn remove_shared_with_me(&self, uid: &NodeUid) -> Result<()> {
        let mut guard = self.shared_with_me.write();
        let uids = guard.as_mut().ok_or_else(|| {
            Error::internal("shared-with-me cache updated before a full listing was set")
        })?;
        uids.shift_remove(uid);
        Ok(())
    }

    /// Forget both listings; the next iteration goes to the backend.
    pub fn reset(&self) {
        *self.shared_by_me.write() = None;
        *self.shared_with_me.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velum_core::ShareId;

    fn entry(uid: &str, share: &str) -> SharedByMeEntry {
        SharedByMeEntry {
            node_uid: NodeUid::from_raw(uid),
            share_id: ShareId::new(share),
        }
    }

    #[test]
    fn add_before_set_is_an_error() {
        let cache = SharingCache::new();
        assert!(cache.add_shared_by_me(entry("v~a", "s1")).is_err());
        assert!(cache.remove_shared_with_me(&NodeUid::from_raw("v~a")).is_err());
    }

    #[test]
    fn set_then_add_and_remove() {
        let cache = SharingCache::new();
        cache.set_shared_by_me(vec![entry("v~a", "s1")]);
        cache.add_shared_by_me(entry("v~b", "s2")).unwrap();
        cache.remove_shared_by_me(&NodeUid::from_raw("v~a")).unwrap();
        let listed: Vec<_> = cache
            .shared_by_me()
            .unwrap()
            .into_iter()
            .map(|e| e.node_uid.as_str().to_owned())
            .collect();
        assert_eq!(listed, vec!["v~b"]);
    }

    #[test]
    fn listings_keep_insertion_order() {
        let cache = SharingCache::new();
        cache.set_shared_with_me(vec![
            NodeUid::from_raw("v~c"),
            NodeUid::from_raw("v~a"),
            NodeUid::from_raw("v~b"),
        ]);
        let listed: Vec<_> = cache
            .shared_with_me()
            .unwrap()
            .into_iter()
            .map(|u| u.as_str().to_owned())
            .collect();
        assert_eq!(listed, vec!["v~c", "v~a", "v~b"]);
    }

    #[test]
    fn reset_forgets_listings() {
        let cache = SharingCache::new();
        cache.set_shared_with_me(vec![]);
        cache.reset();
        assert!(cache.shared_with_me().is_none());
    }
}
