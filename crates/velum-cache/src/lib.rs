//! Velum Cache: the caching layers of the metadata pipeline
//!
//! Three caches with different lifetimes:
//!
//! - [`NodeCache`] wraps the injected durable entity store and holds public
//!   node metadata (never key material), stale flags and the per-folder
//!   children-loaded bits.
//! - [`CryptoCache`] is a process-local map of decrypted node keys,
//!   populated opportunistically on decrypt and never persisted.
//! - [`SharingCache`] holds the full shared-by-me / shared-with-me listings
//!   once an iteration has completed them.

pub mod keys;
pub mod nodes;
pub mod sharing;

pub use keys::CryptoCache;
pub use nodes::{CacheLookup, NodeCache, NODE_CACHE_TAG_KEYS};
pub use sharing::SharingCache;
