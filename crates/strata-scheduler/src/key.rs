//! Conflict keys and operation records

use std::fmt;
use strata_primitives::{Address, H256};

/// Transaction position within a block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub u32);

impl TxId {
    /// Create a new transaction ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Position as an index into the block's transaction list
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for TxId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<usize> for TxId {
    fn from(id: usize) -> Self {
        Self(id as u32)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Origin of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Author {
    /// A transaction executed speculatively
    Transaction(TxId),
    /// The sequential replay of the conflicting transactions, as one unit
    SequentialGroup,
}

impl Author {
    /// Transaction author for block position `index`
    pub fn tx(index: usize) -> Self {
        Author::Transaction(TxId::from(index))
    }

    /// Block position of a transaction author
    pub fn tx_index(&self) -> Option<usize> {
        match self {
            Author::Transaction(id) => Some(id.as_usize()),
            Author::SequentialGroup => None,
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::Transaction(id) => id.fmt(f),
            Author::SequentialGroup => f.write_str("sequential"),
        }
    }
}

/// Part of an account an operation touches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    /// The account's existence
    Account,
    /// Balance
    Balance,
    /// Nonce
    Nonce,
    /// Code
    Code,
    /// One storage slot
    Storage(H256),
}

/// Identity of a piece of state for conflict detection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConflictKey {
    /// Account address
    pub address: Address,
    /// Sub-field of the account
    pub field: Field,
}

impl ConflictKey {
    /// Create a new conflict key
    pub fn new(address: Address, field: Field) -> Self {
        Self { address, field }
    }

    /// Key for the account's existence
    pub fn account(address: Address) -> Self {
        Self::new(address, Field::Account)
    }

    /// Key for the account balance
    pub fn balance(address: Address) -> Self {
        Self::new(address, Field::Balance)
    }

    /// Key for the account nonce
    pub fn nonce(address: Address) -> Self {
        Self::new(address, Field::Nonce)
    }

    /// Key for the account code
    pub fn code(address: Address) -> Self {
        Self::new(address, Field::Code)
    }

    /// Key for one storage slot
    pub fn storage(address: Address, slot: H256) -> Self {
        Self::new(address, Field::Storage(slot))
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Field::Account => write!(f, "{}", self.address),
            Field::Balance => write!(f, "{}_balance", self.address),
            Field::Nonce => write!(f, "{}_nonce", self.address),
            Field::Code => write!(f, "{}_code", self.address),
            Field::Storage(slot) => write!(f, "{}_{}", self.address, slot),
        }
    }
}

/// Kind of state access
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    /// Plain read
    Read,
    /// Overwrite
    Write,
    /// Commutative update, e.g. a balance credit
    ReadModifyWrite,
    /// Idempotent materialisation of an absent account
    DefaultInitialize,
}

impl OpKind {
    /// Every kind, in index order
    pub const ALL: [OpKind; 4] = [
        OpKind::Read,
        OpKind::Write,
        OpKind::ReadModifyWrite,
        OpKind::DefaultInitialize,
    ];

    /// Position in [`OpKind::ALL`]
    pub fn index(self) -> usize {
        match self {
            OpKind::Read => 0,
            OpKind::Write => 1,
            OpKind::ReadModifyWrite => 2,
            OpKind::DefaultInitialize => 3,
        }
    }

    /// Whether two different authors doing `self` and `other` on one key
    /// interfere.
    ///
    /// Equal kinds commute except for writes.
    pub fn conflicts_with(self, other: OpKind) -> bool {
        self != other || self == OpKind::Write
    }
}

/// One state access attributed to an author
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Operation {
    /// Who performed it
    pub author: Author,
    /// Access kind
    pub kind: OpKind,
    /// What was accessed
    pub key: ConflictKey,
}

impl Operation {
    /// Create a new operation record
    pub fn new(author: Author, kind: OpKind, key: ConflictKey) -> Self {
        Self { author, kind, key }
    }
}
