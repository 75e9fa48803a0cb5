//! Velum API: stateless adapter between the wire transport and the
//! metadata core
//!
//! The transport itself (HTTP, retries, authentication) is an injected
//! collaborator behind [`transport::DriveTransport`]. This crate owns the
//! route table, the wire payload shapes, the success-code mapping, and the
//! pagination iterators; it holds no state beyond the transport handle.

pub mod proto;
pub mod service;
pub mod transport;

pub use service::{
    ApiService, ChildUidIter, CreateFolderPayload, CreatePublicLinkPayload, EncryptedNodeIter,
    MoveNodePayload, NodeOpResult, ReceivedInvitation, ReceivedInvitationIter, RenameNodePayload,
    SharedByMeIter, SharedWithMeIter, TrashedUidIter, UpdatePublicLinkPayload,
};
pub use transport::{ApiRequest, DriveTransport, Method, TransportError};
