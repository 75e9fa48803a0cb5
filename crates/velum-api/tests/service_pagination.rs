//! API service behavior against a scripted transport

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use velum_api::{ApiRequest, ApiService, DriveTransport, TransportError};
use velum_core::{AbortSignal, Error, NodeUid, VolumeId};

/// Transport double that serves a scripted sequence of responses and
/// records the requests it saw.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Value>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn push(&self, response: Value) {
        self.responses.lock().push_back(response);
    }

    fn seen_paths(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl DriveTransport for ScriptedTransport {
    async fn request(
        &self,
        request: ApiRequest,
        _abort: &AbortSignal,
    ) -> Result<Value, TransportError> {
        self.seen.lock().push(request.path.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Network("unexpected request".to_owned()))
    }
}

fn service() -> (ApiService, std::sync::Arc<ScriptedTransport>) {
    let transport = std::sync::Arc::new(ScriptedTransport::default());
    (ApiService::new(transport.clone()), transport)
}

#[tokio::test]
async fn children_iterator_follows_anchors() {
    let (service, transport) = service();
    transport.push(json!({
        "Code": 1000,
        "NodeUids": ["v~a", "v~b"],
        "NextAnchor": "anchor-1"
    }));
    transport.push(json!({
        "Code": 1000,
        "NodeUids": ["v~c"]
    }));

    let parent = NodeUid::from_raw("v~parent");
    let mut iter = service
        .iterate_children_node_uids(&parent, AbortSignal::new())
        .unwrap();
    let mut uids = Vec::new();
    while let Some(uid) = iter.next().await {
        uids.push(uid.unwrap().as_str().to_owned());
    }
    assert_eq!(uids, vec!["v~a", "v~b", "v~c"]);
    let paths = transport.seen_paths();
    assert_eq!(paths.len(), 2);
    assert!(paths[1].ends_with("Anchor=anchor-1"));
}

#[tokio::test]
async fn trash_iterator_stops_on_first_empty_page() {
    let (service, transport) = service();
    transport.push(json!({ "Code": 1000, "NodeUids": ["v~t1"] }));
    transport.push(json!({ "Code": 1000, "NodeUids": [] }));
    // A further page exists but must never be requested.
    transport.push(json!({ "Code": 1000, "NodeUids": ["v~t2"] }));

    let mut iter = service.iterate_trashed_node_uids(&VolumeId::new("v"), AbortSignal::new());
    let mut uids = Vec::new();
    while let Some(uid) = iter.next().await {
        uids.push(uid.unwrap().as_str().to_owned());
    }
    assert_eq!(uids, vec!["v~t1"]);
    assert_eq!(transport.seen_paths().len(), 2);
}

#[tokio::test]
async fn batched_fetch_rejects_mixed_volumes() {
    let (service, _transport) = service();
    let err = service
        .get_nodes(
            &[NodeUid::from_raw("v1~a"), NodeUid::from_raw("v2~b")],
            &AbortSignal::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal { .. }));
}

#[tokio::test]
async fn multi_op_surfaces_per_node_failures() {
    let (service, transport) = service();
    transport.push(json!({
        "Code": 1001,
        "Results": [
            { "Uid": "v~a", "Code": 1000 },
            { "Uid": "v~b", "Code": 2501, "Error": "does not exist" }
        ]
    }));

    let results = service
        .trash_nodes(
            &[NodeUid::from_raw("v~a"), NodeUid::from_raw("v~b")],
            &AbortSignal::new(),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].result.is_ok());
    assert!(matches!(
        results[1].result,
        Err(Error::Api { code: 2501, .. })
    ));
}

#[tokio::test]
async fn aborted_iteration_raises_abort_error() {
    let (service, transport) = service();
    transport.push(json!({
        "Code": 1000,
        "NodeUids": ["v~a"],
        "NextAnchor": "next"
    }));

    let abort = AbortSignal::new();
    let parent = NodeUid::from_raw("v~parent");
    let mut iter = service
        .iterate_children_node_uids(&parent, abort.clone())
        .unwrap();
    assert!(iter.next().await.unwrap().is_ok());
    abort.abort();
    let err = iter.next().await.unwrap().unwrap_err();
    assert!(err.is_abort());
}
