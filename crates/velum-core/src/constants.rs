//! Shared tuning constants

use chrono::{DateTime, Utc};

/// UIDs accumulated before a batched metadata fetch is issued.
pub const BATCH_LOADING_SIZE: usize = 30;

/// In-flight node decryptions allowed at once.
pub const DECRYPTION_CONCURRENCY: usize = 15;

/// Platform limit on node name length, in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// Generated public-link passwords are exactly this long; links carrying a
/// generated password of any other length are legacy and cannot be updated.
pub const GENERATED_PASSWORD_LENGTH: usize = 12;

/// Extended attributes written before this instant carry block sizes in an
/// unreliable order and are re-sorted descending on read.
pub fn block_sizes_sort_cutoff() -> DateTime<Utc> {
    // 2025-01-01T00:00:00Z
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_2025() {
        assert_eq!(
            block_sizes_sort_cutoff().to_rfc3339(),
            "2025-01-01T00:00:00+00:00"
        );
    }
}
