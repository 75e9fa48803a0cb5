//! Effect traits for injected collaborators
//!
//! Every external dependency of the metadata core is a trait injected at
//! construction: the durable entity store, the OpenPGP primitives, the
//! account/key directory, the shares service, and the telemetry sink.
//! No implementation here performs I/O; production implementations live in
//! the embedding application and test doubles in [`crate::memory`] or next
//! to the tests that need them.

pub mod directory;
pub mod pgp;
pub mod shares;
pub mod store;
pub mod telemetry;

pub use directory::{AddressKey, DirectoryError, KeyDirectory};
pub use pgp::{DecryptedMessage, GeneratedKey, PgpError, PgpProvider, VerificationOutcome};
pub use shares::ShareService;
pub use store::{EntityLookup, EntityStore, StoreError};
pub use telemetry::{MetricEvent, MetricField, Telemetry};
