//! Stateless API service
//!
//! Wraps the injected transport with the route table, request/response
//! adaptation and pagination. Every operation may fail with a transport or
//! API error surfaced to the caller; batched mutations surface failures
//! per UID instead of aborting the batch.

mod nodes;
mod revisions;
mod sharing;

pub use nodes::{
    ChildUidIter, CreateFolderPayload, EncryptedNodeIter, MoveNodePayload, NodeOpResult,
    RenameNodePayload, TrashedUidIter,
};
pub use sharing::{
    CreatePublicLinkPayload, ReceivedInvitation, ReceivedInvitationIter, SharedByMeIter,
    SharedWithMeIter, UpdatePublicLinkPayload,
};

use crate::transport::{ApiRequest, DriveTransport, TransportError};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use velum_core::{AbortSignal, Error, Result};

fn from_transport(error: TransportError) -> Error {
    match error {
        TransportError::Aborted => Error::aborted("api request"),
        TransportError::Network(message) => Error::transport(message),
        TransportError::MalformedResponse(message) => {
            Error::transport(format!("malformed response: {message}"))
        }
    }
}

/// Stateless adapter over the wire transport.
#[derive(Clone)]
pub struct ApiService {
    transport: Arc<dyn DriveTransport>,
}

impl ApiService {
    /// Wrap a transport.
    pub fn new(transport: Arc<dyn DriveTransport>) -> Self {
        Self { transport }
    }

    /// Perform a request and deserialize the response body.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        abort: &AbortSignal,
    ) -> Result<T> {
        abort.check("api request")?;
        let value = self
            .transport
            .request(request, abort)
            .await
            .map_err(from_transport)?;
        serde_json::from_value(value)
            .map_err(|error| Error::transport(format!("malformed response: {error}")))
    }
}

impl std::fmt::Debug for ApiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiService").finish_non_exhaustive()
    }
}
