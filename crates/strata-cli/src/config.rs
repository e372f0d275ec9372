//! Engine configuration for strata

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strata_evm::{ChainConfig, ExecutionOptions, Fork, PoolConfig};
use strata_scheduler::SchedulerConfig;

/// Engine configuration, read from TOML
///
/// Every table is optional:
///
/// ```toml
/// [chain]
/// homesteadBlock = 0
/// byzantiumBlock = 0
///
/// [scheduler]
/// worker_threads = 8
///
/// [pools]
/// stack_pool_size = 32
///
/// [options]
/// disable_nonce_check = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fork activation schedule
    #[serde(default = "default_chain")]
    pub chain: ChainConfig,
    /// Parallel transition tuning
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Stack and memory pools
    #[serde(default)]
    pub pools: PoolConfig,
    /// Transaction validation switches
    #[serde(default)]
    pub options: ExecutionOptions,
}

/// Fixtures target the latest ruleset unless told otherwise
fn default_chain() -> ChainConfig {
    ChainConfig::all_from_genesis(Fork::Petersburg)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            scheduler: SchedulerConfig::default(),
            pools: PoolConfig::default(),
            options: ExecutionOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("invalid engine config")?;
        config.chain.validate()?;
        Ok(config)
    }

    /// Load from `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
