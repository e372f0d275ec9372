//! Block and transaction context

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_primitives::{Address, BlockNumber, H256, U256};

/// Number of recent blocks visible to BLOCKHASH
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// Block environment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    /// Block number
    pub number: BlockNumber,
    /// Block beneficiary
    pub coinbase: Address,
    /// Block timestamp
    pub timestamp: u64,
    /// Block gas limit
    pub gas_limit: u64,
    /// Block difficulty
    #[serde(default)]
    pub difficulty: U256,
    /// Hashes of ancestor blocks by number
    #[serde(default)]
    pub block_hashes: BTreeMap<BlockNumber, H256>,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            coinbase: Address::ZERO,
            timestamp: 0,
            gas_limit: 30_000_000,
            difficulty: U256::zero(),
            block_hashes: BTreeMap::new(),
        }
    }
}

impl BlockContext {
    /// Hash of block `number`.
    ///
    /// Zero unless `number` is one of the 256 blocks before this one and
    /// its hash is known.
    pub fn block_hash(&self, number: BlockNumber) -> H256 {
        let lower = self.number.saturating_sub(BLOCK_HASH_WINDOW);
        if number < lower || number >= self.number {
            return H256::ZERO;
        }
        self.block_hashes.get(&number).copied().unwrap_or(H256::ZERO)
    }
}

/// Message executed by [`crate::Evm::main`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sender
    pub from: Address,
    /// Recipient; `None` creates a contract
    #[serde(default)]
    pub to: Option<Address>,
    /// Sender nonce
    #[serde(default)]
    pub nonce: u64,
    /// Transferred value
    #[serde(default)]
    pub value: U256,
    /// Gas limit
    pub gas: u64,
    /// Price per unit of gas
    #[serde(default)]
    pub gas_price: U256,
    /// Call data or init code
    #[serde(default, with = "hex_bytes")]
    pub input: Vec<u8>,
}

impl Transaction {
    /// Whether the transaction deploys a contract
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }
}

/// Per-transaction values visible to ORIGIN and GASPRICE
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxContext {
    /// Original sender
    pub origin: Address,
    /// Gas price
    pub gas_price: U256,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
