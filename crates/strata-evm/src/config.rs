//! Engine configuration

use crate::stack::STACK_LIMIT;
use serde::{Deserialize, Serialize};

/// Maximum nesting of calls and creates
pub const CALL_CREATE_DEPTH: usize = 1024;

/// Maximum size of deployed code (EIP-170)
pub const MAX_CODE_SIZE: usize = 24576;

/// Switches relaxing transaction validation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ExecutionOptions {
    /// Skip the sender nonce check
    pub disable_nonce_check: bool,
    /// Run with a zero gas price and a large gas allowance, skipping fee
    /// payment and the intrinsic gas check
    pub disable_gas_fee: bool,
}

/// Sizes of the stack and memory pools
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Idle stacks kept for reuse
    #[serde(default = "default_stack_pool_size")]
    pub stack_pool_size: usize,
    /// Call depths with a pooled memory buffer
    #[serde(default = "default_memory_pool_depth")]
    pub memory_pool_depth: usize,
    /// Capacity reserved for each pooled memory buffer, in bytes
    #[serde(default = "default_memory_preallocate")]
    pub memory_preallocate: usize,
}

fn default_stack_pool_size() -> usize {
    16
}

fn default_memory_pool_depth() -> usize {
    16
}

fn default_memory_preallocate() -> usize {
    4 * 1024
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            stack_pool_size: default_stack_pool_size(),
            memory_pool_depth: default_memory_pool_depth(),
            memory_preallocate: default_memory_preallocate(),
        }
    }
}

impl PoolConfig {
    /// Pools clamped to what a single execution can ever use
    pub fn normalized(&self) -> Self {
        Self {
            stack_pool_size: self.stack_pool_size.min(CALL_CREATE_DEPTH + 1),
            memory_pool_depth: self.memory_pool_depth.min(CALL_CREATE_DEPTH + 2),
            memory_preallocate: self.memory_preallocate.min(STACK_LIMIT * 1024),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_partial_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{"stack_pool_size": 4}"#).unwrap();
        assert_eq!(config.stack_pool_size, 4);
        assert_eq!(config.memory_pool_depth, 16);
        assert_eq!(config.memory_preallocate, 4096);
    }

    #[test]
    fn test_normalized_caps_pools() {
        let config = PoolConfig {
            stack_pool_size: 1 << 20,
            memory_pool_depth: 1 << 20,
            memory_preallocate: 1 << 40,
        }
        .normalized();
        assert_eq!(config.stack_pool_size, 1025);
        assert_eq!(config.memory_pool_depth, 1026);
        assert_eq!(config.memory_preallocate, 1 << 20);
    }

    #[test]
    fn test_execution_options_default_off() {
        let options: ExecutionOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.disable_nonce_check);
        assert!(!options.disable_gas_fee);
    }
}
