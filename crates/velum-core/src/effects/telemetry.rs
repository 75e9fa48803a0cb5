//! Telemetry sink interface
//!
//! Metric emission is fire-and-forget and best-effort; the crypto service
//! already de-duplicates per node UID and kind before calling the sink.

use serde::{Deserialize, Serialize};

/// Which field of a node a metric refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    /// The node private key.
    NodeKey,
    /// The encrypted name.
    Name,
    /// The folder hash key.
    HashKey,
    /// The file content-key packet.
    ContentKey,
    /// Extended attributes (folder or revision).
    ExtendedAttributes,
    /// A file revision.
    Revision,
}

/// A telemetry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricEvent {
    /// A payload failed to decrypt.
    DecryptionError {
        /// UID of the affected entity.
        uid: String,
        /// Which field failed.
        field: MetricField,
    },
    /// A signature failed to verify.
    VerificationError {
        /// UID of the affected entity.
        uid: String,
        /// Which field failed.
        field: MetricField,
    },
}

/// Telemetry sink.
pub trait Telemetry: Send + Sync {
    /// Record one event. Must not block.
    fn record(&self, event: MetricEvent);
}
