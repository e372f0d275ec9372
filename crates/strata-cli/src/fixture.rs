//! Block fixtures: pre-state, block environment and transactions

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use strata_evm::{BlockContext, Transaction};
use strata_primitives::{parse_bytes, parse_u256, Address, H256};
use strata_state::InMemoryState;

/// A block to execute, read from JSON
///
/// ```json
/// {
///   "pre": {
///     "0x00000000000000000000000000000000000000aa": {
///       "balance": "1000000", "nonce": 0, "code": "0x", "storage": {}
///     }
///   },
///   "env": { "number": 1, "coinbase": "0x...", "timestamp": 0, "gasLimit": 30000000 },
///   "transactions": [ { "from": "0x...", "to": "0x...", "gas": 21000, "gasPrice": "0x1" } ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockFixture {
    /// Accounts before the block
    #[serde(default)]
    pub pre: BTreeMap<String, FixtureAccount>,
    /// Block environment
    pub env: BlockContext,
    /// Transactions in block order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// State root the block must produce, if known
    #[serde(default)]
    pub expected_state_root: Option<H256>,
}

/// One pre-state account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureAccount {
    /// Balance, hex or decimal
    #[serde(default)]
    pub balance: String,
    /// Nonce
    #[serde(default)]
    pub nonce: u64,
    /// Code (hex)
    #[serde(default)]
    pub code: String,
    /// Storage slots, hex or decimal on both sides
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
}

impl BlockFixture {
    /// Parse a JSON document
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid block fixture")
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Build the pre-state
    pub fn pre_state(&self) -> Result<InMemoryState> {
        let mut state = InMemoryState::new();
        for (address, account) in &self.pre {
            let parsed = Address::from_hex(address)
                .with_context(|| format!("invalid address {}", address))?;
            let (balance, code, storage) = account
                .parse()
                .with_context(|| format!("invalid account {}", address))?;
            state.insert_account(parsed, balance, account.nonce, code, storage);
        }
        Ok(state)
    }
}

impl FixtureAccount {
    fn parse(&self) -> Result<(strata_primitives::U256, Vec<u8>, Vec<(H256, H256)>)> {
        let balance = parse_u256(&self.balance)?;
        let code = parse_bytes(&self.code)?;
        let storage = self
            .storage
            .iter()
            .map(|(k, v)| -> Result<(H256, H256)> {
                Ok((H256::from_word(parse_u256(k)?), H256::from_word(parse_u256(v)?)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((balance, code, storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strata_primitives::U256;
    use tempfile::NamedTempFile;

    const FIXTURE: &str = r#"{
        "pre": {
            "0x00000000000000000000000000000000000000aa": {
                "balance": "1000000",
                "nonce": 3
            },
            "0x000000000000000000000000000000000000c001": {
                "balance": "0x0",
                "nonce": 1,
                "code": "0x60005460010160005500",
                "storage": { "0x00": "0x2a", "1": "0" }
            }
        },
        "env": {
            "number": 7,
            "coinbase": "0x00000000000000000000000000000000000000cb",
            "timestamp": 1600000000,
            "gasLimit": 8000000
        },
        "transactions": [
            {
                "from": "0x00000000000000000000000000000000000000aa",
                "to": "0x000000000000000000000000000000000000c001",
                "nonce": 3,
                "gas": 100000,
                "gasPrice": "0x1",
                "input": "0x"
            },
            {
                "from": "0x00000000000000000000000000000000000000aa",
                "nonce": 4,
                "gas": 100000,
                "input": "0x60016000f3"
            }
        ]
    }"#;

    #[test]
    fn test_parse_fixture() {
        let fixture = BlockFixture::from_json(FIXTURE).unwrap();
        assert_eq!(fixture.env.number, 7);
        assert_eq!(fixture.env.gas_limit, 8_000_000);
        assert_eq!(fixture.transactions.len(), 2);
        assert_eq!(fixture.transactions[0].gas_price, U256::one());
        assert!(fixture.transactions[1].is_create());
        assert_eq!(fixture.transactions[1].input, vec![0x60, 0x01, 0x60, 0x00, 0xf3]);
        assert!(fixture.expected_state_root.is_none());
    }

    #[test]
    fn test_pre_state() {
        let fixture = BlockFixture::from_json(FIXTURE).unwrap();
        let state = fixture.pre_state().unwrap();
        assert_eq!(state.account_count(), 2);

        let sender = state.get_account(&Address::from_low_u64_be(0xaa)).unwrap();
        assert_eq!(sender.balance, U256::from(1_000_000u64));
        assert_eq!(sender.nonce, 3);

        let counter = Address::from_low_u64_be(0xc001);
        assert!(state.get_account(&counter).unwrap().has_code());
        assert_eq!(state.get_storage(&counter, &H256::ZERO), H256::from_low_u64_be(0x2a));
        assert_eq!(state.get_storage(&counter, &H256::from_low_u64_be(1)), H256::ZERO);
    }

    #[test]
    fn test_bad_address() {
        let fixture = BlockFixture::from_json(
            r#"{ "pre": { "0x1234": {} }, "env": { "number": 0, "coinbase": "0x0000000000000000000000000000000000000000", "timestamp": 0, "gasLimit": 1 } }"#,
        )
        .unwrap();
        let err = fixture.pre_state().unwrap_err();
        assert!(err.to_string().contains("invalid address"));
    }

    #[test]
    fn test_bad_balance() {
        let account = FixtureAccount {
            balance: "0xzz".to_string(),
            ..FixtureAccount::default()
        };
        assert!(account.parse().is_err());
    }

    #[test]
    fn test_missing_env_rejected() {
        assert!(BlockFixture::from_json(r#"{ "pre": {} }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", FIXTURE).unwrap();
        let fixture = BlockFixture::load(file.path()).unwrap();
        assert_eq!(fixture.pre.len(), 2);
    }
}
