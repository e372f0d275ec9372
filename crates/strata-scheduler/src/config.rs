//! Scheduler configuration

use serde::{Deserialize, Serialize};

/// Tuning of the parallel block transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Speculative execution threads; 0 uses one per core
    #[serde(default)]
    pub worker_threads: usize,
    /// Cap on sequential replays; by default the block's transaction count
    #[serde(default)]
    pub max_replays: Option<usize>,
    /// Stack size of execution threads, in bytes
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
}

/// Nested calls recurse on the native stack, so threads get far more than
/// the platform default
fn default_stack_size() -> usize {
    64 * 1024 * 1024
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_replays: None,
            stack_size: default_stack_size(),
        }
    }
}

impl SchedulerConfig {
    /// Replays allowed for a block of `tx_count` transactions
    pub fn replay_limit(&self, tx_count: usize) -> usize {
        self.max_replays.unwrap_or(tx_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.replay_limit(12), 12);
        assert_eq!(config.stack_size, 64 * 1024 * 1024);
    }

    #[test]
    fn test_replay_override() {
        let config = SchedulerConfig {
            max_replays: Some(2),
            ..SchedulerConfig::default()
        };
        assert_eq!(config.replay_limit(100), 2);
    }
}
