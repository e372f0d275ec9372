//! Hard-fork rulesets and the tables they select

use crate::error::ConfigError;
use crate::gas::GasTable;
use crate::jump_table::{
    JumpTable, BYZANTIUM_INSTRUCTION_SET, CONSTANTINOPLE_INSTRUCTION_SET,
    FRONTIER_INSTRUCTION_SET, HOMESTEAD_INSTRUCTION_SET,
};
use crate::precompiles::{Precompiles, BYZANTIUM_PRECOMPILES, HOMESTEAD_PRECOMPILES};
use serde::{Deserialize, Serialize};
use std::fmt;
use strata_primitives::BlockNumber;

/// Named hard forks, in activation order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fork {
    /// Launch rules
    Frontier,
    /// DELEGATECALL, 53000 creation base
    Homestead,
    /// Tangerine Whistle IO repricing
    Eip150,
    /// Spurious Dragon state clearing
    Eip158,
    /// REVERT, STATICCALL, return data, new precompiles
    Byzantium,
    /// Shifts, CREATE2, EXTCODEHASH, net SSTORE metering
    Constantinople,
    /// Constantinople without net SSTORE metering
    Petersburg,
}

impl Fork {
    /// Every fork, oldest first
    pub const ALL: [Fork; 7] = [
        Fork::Frontier,
        Fork::Homestead,
        Fork::Eip150,
        Fork::Eip158,
        Fork::Byzantium,
        Fork::Constantinople,
        Fork::Petersburg,
    ];
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fork::Frontier => "frontier",
            Fork::Homestead => "homestead",
            Fork::Eip150 => "eip150",
            Fork::Eip158 => "eip158",
            Fork::Byzantium => "byzantium",
            Fork::Constantinople => "constantinople",
            Fork::Petersburg => "petersburg",
        };
        f.write_str(name)
    }
}

/// Active hard-fork flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ruleset {
    /// Homestead active
    pub homestead: bool,
    /// EIP-150 active
    pub eip150: bool,
    /// EIP-158 active
    pub eip158: bool,
    /// Byzantium active
    pub byzantium: bool,
    /// Constantinople active
    pub constantinople: bool,
    /// Petersburg active
    pub petersburg: bool,
}

impl Ruleset {
    /// Flags of `fork` and every fork before it
    pub fn from_fork(fork: Fork) -> Self {
        Self {
            homestead: fork >= Fork::Homestead,
            eip150: fork >= Fork::Eip150,
            eip158: fork >= Fork::Eip158,
            byzantium: fork >= Fork::Byzantium,
            constantinople: fork >= Fork::Constantinople,
            petersburg: fork >= Fork::Petersburg,
        }
    }

    /// Latest fork whose flag is set
    pub fn fork(&self) -> Fork {
        if self.petersburg {
            Fork::Petersburg
        } else if self.constantinople {
            Fork::Constantinople
        } else if self.byzantium {
            Fork::Byzantium
        } else if self.eip158 {
            Fork::Eip158
        } else if self.eip150 {
            Fork::Eip150
        } else if self.homestead {
            Fork::Homestead
        } else {
            Fork::Frontier
        }
    }
}

impl From<Fork> for Ruleset {
    fn from(fork: Fork) -> Self {
        Ruleset::from_fork(fork)
    }
}

/// Fork activation schedule. `None` means the fork never activates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainConfig {
    /// Homestead switch block
    pub homestead_block: Option<BlockNumber>,
    /// EIP-150 switch block
    #[serde(rename = "eip150Block")]
    pub eip150_block: Option<BlockNumber>,
    /// EIP-158 switch block
    #[serde(rename = "eip158Block")]
    pub eip158_block: Option<BlockNumber>,
    /// Byzantium switch block
    pub byzantium_block: Option<BlockNumber>,
    /// Constantinople switch block
    pub constantinople_block: Option<BlockNumber>,
    /// Petersburg switch block; unset follows Constantinople
    pub petersburg_block: Option<BlockNumber>,
}

fn is_forked(start: Option<BlockNumber>, number: BlockNumber) -> bool {
    matches!(start, Some(start) if start <= number)
}

impl ChainConfig {
    /// Ethereum mainnet activation blocks
    pub fn mainnet() -> Self {
        Self {
            homestead_block: Some(1_150_000),
            eip150_block: Some(2_463_000),
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
            constantinople_block: Some(7_280_000),
            petersburg_block: Some(7_280_000),
        }
    }

    /// Every fork up to and including `fork` active from genesis
    pub fn all_from_genesis(fork: Fork) -> Self {
        let at = |f: Fork| if fork >= f { Some(0) } else { None };
        Self {
            homestead_block: at(Fork::Homestead),
            eip150_block: at(Fork::Eip150),
            eip158_block: at(Fork::Eip158),
            byzantium_block: at(Fork::Byzantium),
            constantinople_block: at(Fork::Constantinople),
            petersburg_block: at(Fork::Petersburg),
        }
    }

    /// Ruleset in force at block `number`
    pub fn rules(&self, number: BlockNumber) -> Ruleset {
        Ruleset {
            homestead: is_forked(self.homestead_block, number),
            eip150: is_forked(self.eip150_block, number),
            eip158: is_forked(self.eip158_block, number),
            byzantium: is_forked(self.byzantium_block, number),
            constantinople: is_forked(self.constantinople_block, number),
            petersburg: is_forked(self.petersburg_block, number)
                || (self.petersburg_block.is_none()
                    && is_forked(self.constantinople_block, number)),
        }
    }

    /// Check that forks activate in order and none is skipped
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = [
            (Fork::Homestead, self.homestead_block),
            (Fork::Eip150, self.eip150_block),
            (Fork::Eip158, self.eip158_block),
            (Fork::Byzantium, self.byzantium_block),
            (Fork::Constantinople, self.constantinople_block),
            (Fork::Petersburg, self.petersburg_block),
        ];
        let mut last: Option<(Fork, Option<BlockNumber>)> = None;
        for (fork, block) in schedule {
            if let Some((prev, prev_block)) = last {
                match (prev_block, block) {
                    (None, Some(_)) => {
                        return Err(ConfigError::ForkOrder { earlier: prev, later: fork })
                    }
                    (Some(a), Some(b)) if b < a => {
                        return Err(ConfigError::ForkOrder { earlier: prev, later: fork })
                    }
                    _ => {}
                }
            }
            // 未设置的 Petersburg 跟随 Constantinople
            if fork == Fork::Petersburg && block.is_none() {
                continue;
            }
            last = Some((fork, block));
        }
        Ok(())
    }
}

/// Dispatch table, gas table and precompile registry of one ruleset
#[derive(Clone, Copy)]
pub struct Tables {
    /// Ruleset the tables were selected for
    pub ruleset: Ruleset,
    /// Instruction dispatch table
    pub instructions: &'static JumpTable,
    /// Prices of the state-accessing opcodes
    pub gas: GasTable,
    /// Precompiled contracts
    pub precompiles: &'static Precompiles,
}

impl Tables {
    /// Select the tables for `ruleset`. Total and deterministic.
    pub fn select(ruleset: Ruleset) -> Self {
        let (instructions, gas): (&'static JumpTable, GasTable) = if ruleset.constantinople {
            (&*CONSTANTINOPLE_INSTRUCTION_SET, GasTable::CONSTANTINOPLE)
        } else if ruleset.byzantium {
            (&*BYZANTIUM_INSTRUCTION_SET, GasTable::EIP158)
        } else if ruleset.eip158 {
            (&*HOMESTEAD_INSTRUCTION_SET, GasTable::EIP158)
        } else if ruleset.eip150 {
            (&*HOMESTEAD_INSTRUCTION_SET, GasTable::EIP150)
        } else if ruleset.homestead {
            (&*HOMESTEAD_INSTRUCTION_SET, GasTable::HOMESTEAD)
        } else {
            (&*FRONTIER_INSTRUCTION_SET, GasTable::HOMESTEAD)
        };
        let precompiles: &'static Precompiles = if ruleset.byzantium {
            &*BYZANTIUM_PRECOMPILES
        } else {
            &*HOMESTEAD_PRECOMPILES
        };
        Self {
            ruleset,
            instructions,
            gas,
            precompiles,
        }
    }

    /// Switch to `ruleset`. Returns false, leaving the tables untouched,
    /// when it is already active.
    pub fn switch(&mut self, ruleset: Ruleset) -> bool {
        if self.ruleset == ruleset {
            return false;
        }
        *self = Tables::select(ruleset);
        true
    }
}

impl fmt::Debug for Tables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tables")
            .field("ruleset", &self.ruleset)
            .field("gas", &self.gas)
            .field("precompiles", &self.precompiles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn test_from_fork_is_monotonic() {
        for (i, fork) in Fork::ALL.iter().enumerate() {
            let rules = Ruleset::from_fork(*fork);
            assert_eq!(rules.fork(), *fork);
            for later in &Fork::ALL[i + 1..] {
                assert_ne!(rules, Ruleset::from_fork(*later));
            }
        }
        assert_eq!(Ruleset::default().fork(), Fork::Frontier);
    }

    #[test]
    fn test_mainnet_rules() {
        let config = ChainConfig::mainnet();
        assert_eq!(config.rules(0).fork(), Fork::Frontier);
        assert_eq!(config.rules(1_150_000).fork(), Fork::Homestead);
        assert_eq!(config.rules(2_675_000).fork(), Fork::Eip158);
        assert_eq!(config.rules(7_280_000).fork(), Fork::Petersburg);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_petersburg_follows_constantinople() {
        let config = ChainConfig {
            petersburg_block: None,
            ..ChainConfig::all_from_genesis(Fork::Constantinople)
        };
        assert!(config.rules(0).petersburg);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_order() {
        let config = ChainConfig {
            byzantium_block: Some(10),
            constantinople_block: Some(5),
            ..ChainConfig::all_from_genesis(Fork::Eip158)
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ForkOrder {
                earlier: Fork::Byzantium,
                later: Fork::Constantinople
            })
        );

        let skipped = ChainConfig {
            eip150_block: None,
            ..ChainConfig::all_from_genesis(Fork::Eip158)
        };
        assert!(skipped.validate().is_err());
    }

    #[test]
    fn test_chain_config_serde() {
        let json = r#"{"homesteadBlock":0,"eip150Block":0,"eip158Block":5}"#;
        let config: ChainConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.eip158_block, Some(5));
        assert_eq!(config.byzantium_block, None);
        assert_eq!(config.rules(4).fork(), Fork::Eip150);
    }

    #[test]
    fn test_table_selection() {
        let frontier = Tables::select(Fork::Frontier.into());
        assert!(!frontier.instructions[OpCode::DELEGATECALL].valid);
        assert_eq!(frontier.gas, GasTable::HOMESTEAD);
        assert_eq!(frontier.precompiles.len(), 4);

        let eip150 = Tables::select(Fork::Eip150.into());
        assert!(eip150.instructions[OpCode::DELEGATECALL].valid);
        assert!(!eip150.instructions[OpCode::REVERT].valid);
        assert_eq!(eip150.gas, GasTable::EIP150);

        let byzantium = Tables::select(Fork::Byzantium.into());
        assert!(byzantium.instructions[OpCode::STATICCALL].valid);
        assert!(!byzantium.instructions[OpCode::SHL].valid);
        assert_eq!(byzantium.gas, GasTable::EIP158);
        assert_eq!(byzantium.precompiles.len(), 8);

        let petersburg = Tables::select(Fork::Petersburg.into());
        assert!(petersburg.instructions[OpCode::CREATE2].valid);
        assert_eq!(petersburg.gas, GasTable::CONSTANTINOPLE);
    }

    #[test]
    fn test_switch_to_same_ruleset_is_noop() {
        let mut tables = Tables::select(Fork::Byzantium.into());
        assert!(!tables.switch(Fork::Byzantium.into()));
        assert!(tables.switch(Fork::Petersburg.into()));
        assert_eq!(tables.ruleset.fork(), Fork::Petersburg);
        assert!(!tables.switch(Fork::Petersburg.into()));
    }
}
