//! Client configuration
//!
//! Pure data structures; all I/O goes through effects. One config is built
//! per client instance; multiple instances are allowed and isolated.

use serde::{Deserialize, Serialize};

use crate::constants::{BATCH_LOADING_SIZE, DECRYPTION_CONCURRENCY};

/// Configuration for one Velum client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host used when formatting public-link URLs, e.g. `drive.example.com`.
    pub public_link_host: String,
    /// UIDs accumulated before a batched metadata fetch is issued.
    pub batch_loading_size: usize,
    /// Bound on concurrent node decryptions.
    pub decryption_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            public_link_host: "drive.velum.io".to_owned(),
            batch_loading_size: BATCH_LOADING_SIZE,
            decryption_concurrency: DECRYPTION_CONCURRENCY,
        }
    }
}
