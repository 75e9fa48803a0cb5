//! Cooperative cancellation
//!
//! Long-running operations accept an [`AbortSignal`]; iterators check it
//! between items and between pages and raise an abort-specific error.
//! In-flight transport calls are expected to honor the same handle at the
//! transport layer.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Cloning is cheap and all clones observe the same flag. A signal that was
/// never aborted behaves like infinity: `check` always succeeds.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a fresh, un-aborted signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Aborted`] if cancellation was requested.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_aborted() {
            Err(Error::aborted(operation))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        assert!(signal.check("op").is_ok());
        clone.abort();
        assert!(signal.is_aborted());
        assert!(matches!(signal.check("op"), Err(Error::Aborted { .. })));
    }
}
