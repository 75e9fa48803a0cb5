//! Wire transport interface
//!
//! The embedding application provides the HTTP client; it owns
//! authentication, retries and rate limiting, and it honors the abort
//! handle at the network layer. The metadata core only builds requests and
//! interprets JSON responses.

use async_trait::async_trait;
use serde_json::Value;
use velum_core::AbortSignal;

/// Network-layer failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request could not be delivered or the response never arrived.
    #[error("network failure: {0}")]
    Network(String),
    /// The request was cancelled through the abort handle.
    #[error("request aborted")]
    Aborted,
    /// The response body was not valid JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create or act.
    Post,
    /// Replace or update.
    Put,
    /// Remove.
    Delete,
}

/// One backend request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API root, query included.
    pub path: String,
    /// JSON body, for methods that carry one.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Build a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Build a POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// Build a PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
        }
    }

    /// Build a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// Wire transport to the backend.
#[async_trait]
pub trait DriveTransport: Send + Sync {
    /// Perform one request and return the parsed JSON response body.
    async fn request(
        &self,
        request: ApiRequest,
        abort: &AbortSignal,
    ) -> Result<Value, TransportError>;
}
