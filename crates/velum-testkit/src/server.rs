//! In-memory drive backend
//!
//! A [`DriveTransport`] implementation serving node and sharing state from
//! memory, with the same response envelopes the real backend uses. Tests
//! seed it with encrypted fixtures and assert against the requests it saw.

use crate::wire::node_json;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use velum_api::{ApiRequest, DriveTransport, Method, TransportError};
use velum_core::{AbortSignal, EncryptedNode};

/// Scriptable in-memory backend.
#[derive(Default)]
pub struct FakeDriveServer {
    nodes: Mutex<HashMap<String, EncryptedNode>>,
    children: Mutex<HashMap<String, Vec<String>>>,
    trash: Mutex<HashMap<String, Vec<String>>>,
    children_page_size: Mutex<usize>,
    extra_routes: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<(Method, String, Option<Value>)>>,
    fetch_calls: AtomicU64,
    counter: AtomicU64,
}

impl FakeDriveServer {
    /// An empty backend.
    pub fn new() -> Self {
        let server = Self::default();
        *server.children_page_size.lock() = 100;
        server
    }

    /// Seed a node record.
    pub fn insert_node(&self, node: EncryptedNode) {
        let uid = node.uid.as_str().to_owned();
        if let Some(parent) = &node.parent_uid {
            self.children
                .lock()
                .entry(parent.as_str().to_owned())
                .or_default()
                .push(uid.clone());
        }
        self.nodes.lock().insert(uid, node);
    }

    /// Seed the trash listing of a volume.
    pub fn set_trash(&self, volume_id: &str, uids: Vec<String>) {
        self.trash.lock().insert(volume_id.to_owned(), uids);
    }

    /// Page size of the children listing.
    pub fn set_children_page_size(&self, size: usize) {
        *self.children_page_size.lock() = size;
    }

    /// Script a verbatim response for a path (exact match, query included).
    pub fn set_route(&self, path: &str, response: Value) {
        self.extra_routes.lock().insert(path.to_owned(), response);
    }

    /// Every request the server saw.
    pub fn requests(&self) -> Vec<(Method, String, Option<Value>)> {
        self.requests.lock().clone()
    }

    /// How many batched node fetches were issued.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    fn handle(&self, request: &ApiRequest) -> Value {
        if let Some(response) = self.extra_routes.lock().get(&request.path) {
            return response.clone();
        }
        let path = request.path.clone();
        let segments: Vec<&str> = path.split('?').next().unwrap_or("").split('/').collect();
        // drive/v1/volumes/{v}/...
        match segments.as_slice() {
            ["drive", "v1", "volumes", volume, "nodes", "fetch"] => {
                self.fetch_calls.fetch_add(1, Ordering::Relaxed);
                let ids: Vec<String> = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("NodeIds"))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let nodes = self.nodes.lock();
                let found: Vec<Value> = ids
                    .iter()
                    .filter_map(|id| nodes.get(&format!("{volume}~{id}")))
                    .map(node_json)
                    .collect();
                json!({ "Code": 1001, "Nodes": found })
            }
            ["drive", "v1", "volumes", volume, "folders", folder, "children"] => {
                if request.method == Method::Post {
                    let id = self.counter.fetch_add(1, Ordering::Relaxed);
                    return json!({ "Code": 1000, "NodeUid": format!("{volume}~created-{id}") });
                }
                let parent = format!("{volume}~{folder}");
                let all = self.children.lock().get(&parent).cloned().unwrap_or_default();
                let page_size = *self.children_page_size.lock();
                let offset: usize = path
                    .split("Anchor=")
                    .nth(1)
                    .and_then(|a| a.parse().ok())
                    .unwrap_or(0);
                let page: Vec<String> =
                    all.iter().skip(offset).take(page_size).cloned().collect();
                let next = offset + page.len();
                let next_anchor = (next < all.len()).then(|| next.to_string());
                json!({ "Code": 1001, "NodeUids": page, "NextAnchor": next_anchor })
            }
            ["drive", "v1", "volumes", volume, "trash"] => {
                let page: usize = path
                    .split("Page=")
                    .nth(1)
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0);
                let all = self.trash.lock().get(*volume).cloned().unwrap_or_default();
                let uids: Vec<String> = all.iter().skip(page * 50).take(50).cloned().collect();
                json!({ "Code": 1001, "NodeUids": uids })
            }
            ["drive", "v1", "volumes", _volume, "nodes", _node, "rename" | "move"] => {
                json!({ "Code": 1000 })
            }
            ["drive", "v1", "volumes", volume, "nodes", "trash" | "restore" | "delete"] => {
                let ids: Vec<String> = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("NodeIds"))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let results: Vec<Value> = ids
                    .iter()
                    .map(|id| json!({ "Uid": format!("{volume}~{id}"), "Code": 1000 }))
                    .collect();
                json!({ "Code": 1001, "Results": results })
            }
            ["drive", "v1", "volumes", _volume, "files", _node, "revisions"] => {
                json!({ "Code": 1001, "Revisions": [] })
            }
            ["drive", "v1", "volumes", _volume, "files", _node, "revisions", _rev, "restore"]
            | ["drive", "v1", "volumes", _volume, "files", _node, "revisions", _rev] => {
                json!({ "Code": 1000 })
            }
            _ => json!({ "Code": 1000 }),
        }
    }
}

#[async_trait]
impl DriveTransport for FakeDriveServer {
    async fn request(
        &self,
        request: ApiRequest,
        _abort: &AbortSignal,
    ) -> Result<Value, TransportError> {
        let response = self.handle(&request);
        self.requests
            .lock()
            .push((request.method, request.path, request.body));
        Ok(response)
    }
}
