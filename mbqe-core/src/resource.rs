//! Cooperative Cancellation.
//!
//! A shareable flag consulted at well-defined checkpoints: each top-level
//! literal during linearization and each variable allocation during
//! projection. Once canceled, the current projection aborts with
//! [`MbqeError::Canceled`](crate::error::MbqeError::Canceled) and may be
//! retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shareable cancellation handle.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimit {
    canceled: Arc<AtomicBool>,
}

impl ResourceLimit {
    /// New, non-canceled limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next checkpoint.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    /// Checkpoint: returns `false` once canceled.
    pub fn inc(&self) -> bool {
        !self.is_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared() {
        let limit = ResourceLimit::new();
        let other = limit.clone();
        assert!(limit.inc());
        other.cancel();
        assert!(!limit.inc());
        assert!(limit.is_canceled());
    }
}
