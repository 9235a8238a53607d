//! Pool configuration.

use std::num::NonZeroUsize;
use std::thread;

/// Configuration for a [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker contexts kept alive at all times. Clamped to at
    /// least 1.
    pub concurrency: usize,
}

impl PoolConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Detected logical CPU count, falling back to 1 when detection fails.
    pub fn detected_concurrency() -> usize {
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: Self::detected_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_detected_parallelism() {
        let config = PoolConfig::default();
        assert!(config.concurrency >= 1);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        assert_eq!(PoolConfig::new(0).concurrency, 1);
        assert_eq!(PoolConfig::default().with_concurrency(0).concurrency, 1);
    }

    #[test]
    fn builder_overrides_concurrency() {
        let config = PoolConfig::default().with_concurrency(3);
        assert_eq!(config.concurrency, 3);
    }
}
