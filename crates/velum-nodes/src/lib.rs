//! Velum Nodes: the node metadata pipeline
//!
//! Everything between the API service and the caller lives here: the
//! fetch → decrypt → parse → cache pipeline with batched concurrent loads
//! ([`access`]), the mutation paths ([`manage`]), and the event-driven
//! reconciliation loop with its subscriptions ([`events`]).

pub mod access;
pub mod events;
pub mod manage;
pub mod parse;

pub use access::{
    FolderChildrenIter, MaybeNode, NodeSessionKeys, NodesAccess, NodesIter, TrashedNodesIter,
};
pub use events::{
    NodeEvent, NodesEvents, SubscriptionHandle, SubscriptionScope, SubscriptionUpdate, UpdateKind,
};
pub use manage::{BatchMutationIter, MoveNodesIter, NodeOpOutcome, NodesManagement, RenameOptions};
pub use parse::parse_node;
