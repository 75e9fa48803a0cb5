//! Node cache behavior over the in-memory entity store

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use velum_cache::{NodeCache, NODE_CACHE_TAG_KEYS};
use velum_core::effects::store::EntityStore;
use velum_core::memory::MemoryEntityStore;
use velum_core::{DecryptedNode, MemberRole, NodeType, NodeUid, VolumeId};

fn folder(uid: &str, parent: Option<&str>) -> DecryptedNode {
    let uid = NodeUid::from_raw(uid);
    let volume = uid.volume_id().unwrap();
    DecryptedNode {
        uid,
        parent_uid: parent.map(NodeUid::from_raw),
        node_type: NodeType::Folder,
        media_type: None,
        creation_time: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().unwrap(),
        trash_time: None,
        share_id: None,
        is_shared: false,
        direct_role: MemberRole::Admin,
        membership: None,
        hash: Some("abc".to_owned()),
        name: Ok("folder".to_owned()),
        key_author: Ok(Some("alice@example.com".to_owned())),
        name_author: Ok(Some("alice@example.com".to_owned())),
        active_revision: None,
        folder_attributes: None,
        errors: Vec::new(),
        is_stale: false,
        tree_event_scope_id: volume,
    }
}

fn cache() -> (NodeCache, Arc<MemoryEntityStore>) {
    let store = Arc::new(MemoryEntityStore::new(NODE_CACHE_TAG_KEYS));
    (NodeCache::new(store.clone()), store)
}

#[tokio::test]
async fn set_then_get_returns_equal_content() {
    let (cache, _store) = cache();
    let node = folder("v1~n1", Some("v1~root"));
    cache.set_node(&node).await;
    let cached = cache.get_node(&node.uid).await.unwrap();
    assert_eq!(cached, node);
}

#[tokio::test]
async fn corrupt_entries_are_evicted_and_reported_as_miss() {
    let (cache, store) = cache();
    let node = folder("v1~n1", None);
    cache.set_node(&node).await;
    store.corrupt_entity("v1~n1", "not json");
    assert!(cache.get_node(&node.uid).await.is_none());
    // The corrupt payload was removed, not retried forever.
    assert!(store.get_entity("v1~n1").await.unwrap().is_none());
}

#[tokio::test]
async fn children_listing_and_completeness_bit() {
    let (cache, _store) = cache();
    let parent = NodeUid::from_raw("v1~p");
    for child in ["v1~a", "v1~b"] {
        cache.set_node(&folder(child, Some("v1~p"))).await;
    }
    assert!(!cache.is_folder_children_loaded(&parent).await);
    cache.set_folder_children_loaded(&parent).await;
    assert!(cache.is_folder_children_loaded(&parent).await);

    let children = cache.iterate_children(&parent).await.unwrap();
    let uids: Vec<_> = children.iter().map(|n| n.uid.as_str()).collect();
    assert_eq!(uids, vec!["v1~a", "v1~b"]);
}

#[tokio::test]
async fn removing_a_child_resets_the_parents_bit() {
    let (cache, _store) = cache();
    let parent = NodeUid::from_raw("v1~p");
    cache.set_node(&folder("v1~a", Some("v1~p"))).await;
    cache.set_folder_children_loaded(&parent).await;

    cache.remove_nodes(&[NodeUid::from_raw("v1~a")]).await;
    assert!(!cache.is_folder_children_loaded(&parent).await);
    assert!(cache.get_node(&NodeUid::from_raw("v1~a")).await.is_none());
}

#[tokio::test]
async fn stale_marking_covers_the_whole_volume() {
    let (cache, _store) = cache();
    cache.set_node(&folder("V1~a", None)).await;
    cache.set_node(&folder("V1~b", Some("V1~a"))).await;
    cache.set_node(&folder("V2~c", None)).await;

    cache.set_nodes_stale_from_volume(&VolumeId::new("V1")).await;

    assert!(cache.get_node(&NodeUid::from_raw("V1~a")).await.unwrap().is_stale);
    assert!(cache.get_node(&NodeUid::from_raw("V1~b")).await.unwrap().is_stale);
    assert!(!cache.get_node(&NodeUid::from_raw("V2~c")).await.unwrap().is_stale);
}

#[tokio::test]
async fn volume_removal_drops_nodes_and_markers() {
    let (cache, store) = cache();
    cache.set_node(&folder("V1~a", None)).await;
    cache.set_folder_children_loaded(&NodeUid::from_raw("V1~a")).await;
    cache.set_node(&folder("V2~b", None)).await;

    cache.remove_volume(&VolumeId::new("V1")).await;

    assert!(cache.get_node(&NodeUid::from_raw("V1~a")).await.is_none());
    assert!(!cache.is_folder_children_loaded(&NodeUid::from_raw("V1~a")).await);
    assert!(cache.get_node(&NodeUid::from_raw("V2~b")).await.is_some());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn batched_lookup_preserves_request_order() {
    let (cache, _store) = cache();
    cache.set_node(&folder("v1~b", None)).await;
    let lookups = cache
        .iterate_nodes(&[NodeUid::from_raw("v1~a"), NodeUid::from_raw("v1~b")])
        .await;
    assert_eq!(lookups[0].uid.as_str(), "v1~a");
    assert!(lookups[0].node.is_none());
    assert_eq!(lookups[1].uid.as_str(), "v1~b");
    assert!(lookups[1].node.is_some());
}
