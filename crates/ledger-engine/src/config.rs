//! Engine configuration.
//!
//! The core consumes this configuration; it is supplied by the surrounding
//! process (environment variables or explicit construction).

use crate::processor::{ProcessorConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};

/// Configuration consumed by the ledger composition root.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the `RocksDB` data directory (default: "/data/ledger").
    pub data_dir: String,

    /// Number of processor workers (default: 4).
    pub workers: usize,

    /// Processor job queue capacity (default: 64).
    pub queue_capacity: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("LEDGER_DATA_DIR").unwrap_or_else(|_| "/data/ledger".into()),
            workers: std::env::var("LEDGER_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WORKERS),
            queue_capacity: std::env::var("LEDGER_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
        }
    }

    /// The processor parameters this configuration implies.
    #[must_use]
    pub const fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/ledger".into(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let config = EngineConfig::default();
        assert!(config.workers >= 1);
        assert!(config.queue_capacity >= 1);

        let processor = config.processor();
        assert_eq!(processor.workers, config.workers);
        assert_eq!(processor.queue_capacity, config.queue_capacity);
    }

    #[test]
    fn unparsable_env_values_fall_back() {
        std::env::set_var("LEDGER_WORKERS", "not-a-number");
        let config = EngineConfig::from_env();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        std::env::remove_var("LEDGER_WORKERS");
    }
}
