//! # Ledger Types
//!
//! Read-only view of the closed ledger handed to the relay by consensus,
//! plus the signed transaction envelope the relay produces.

use super::errors::RelayError;
use serde::{Deserialize, Serialize};

/// Default maximum log topic length.
pub const TRANSACTION_LOG_TOPIC_MAXSIZE: usize = 128;

/// Default maximum length of one log data element.
pub const TRANSACTION_LOG_DATA_MAXSIZE: usize = 1024;

/// Number of data elements carried by a relay log (`[chain_id, json]`).
pub const RELAY_LOG_ARITY: usize = 2;

/// Header of a closed ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Ledger sequence number.
    pub seq: i64,
    /// Chain that produced the ledger.
    pub chain_id: i64,
    /// Hex content hash.
    pub hash: String,
    /// Hex hash of the previous ledger.
    pub previous_hash: String,
    /// Number of applied transactions.
    pub tx_count: i64,
    /// Close time (microseconds).
    pub close_time: i64,
}

/// A closed ledger.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerBlock {
    /// Ledger header.
    pub header: LedgerHeader,
    /// Applied transactions in ledger order.
    pub transactions: Vec<AppliedTransaction>,
}

impl LedgerBlock {
    /// Ledger sequence number.
    pub fn seq(&self) -> i64 {
        self.header.seq
    }

    /// Originating chain.
    pub fn chain_id(&self) -> i64 {
        self.header.chain_id
    }

    /// Content hashes of the applied transactions, in ledger order.
    pub fn transaction_hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.hash.clone()).collect()
    }
}

/// Result the ledger recorded for an applied transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result code (0 = success).
    pub code: i64,
    /// Description.
    pub desc: String,
}

/// A transaction as applied in a ledger, with the instruction
/// transactions emitted by contract execution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppliedTransaction {
    /// Top-level transaction.
    pub transaction: Transaction,
    /// Hex content hash of the top-level transaction.
    pub hash: String,
    /// Execution result.
    pub result: ExecutionResult,
    /// Nested instruction transactions.
    pub instructions: Vec<Transaction>,
}

impl AppliedTransaction {
    /// The top-level transaction followed by each nested instruction.
    pub fn all_transactions(&self) -> impl Iterator<Item = &Transaction> {
        std::iter::once(&self.transaction).chain(self.instructions.iter())
    }
}

/// Ledger transaction body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender.
    pub source_address: String,
    /// Account sequence number.
    pub nonce: i64,
    /// Gas price.
    pub gas_price: i64,
    /// Maximum fee.
    pub fee_limit: i64,
    /// Chain the transaction targets.
    pub chain_id: i64,
    /// Free-form memo.
    pub metadata: String,
    /// Operations.
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Log entries emitted by this transaction.
    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Log(entry) => Some(entry),
            _ => None,
        })
    }

    /// True if any payment operation targets `address`.
    pub fn pays_to(&self, address: &str) -> bool {
        self.operations
            .iter()
            .any(|op| op.dest_address() == Some(address))
    }
}

/// Ledger operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Native coin payment (also used to invoke contracts).
    PayCoin {
        /// Recipient.
        dest_address: String,
        /// Amount.
        amount: i64,
        /// Contract input.
        input: String,
    },
    /// Asset payment.
    PayAsset {
        /// Recipient.
        dest_address: String,
        /// Asset code.
        code: String,
        /// Asset issuer.
        issuer: String,
        /// Amount.
        amount: i64,
        /// Contract input.
        input: String,
    },
    /// Transaction log.
    Log(LogEntry),
    /// Any operation the relay does not inspect.
    Other,
}

impl Operation {
    /// Recipient of a payment operation.
    pub fn dest_address(&self) -> Option<&str> {
        match self {
            Self::PayCoin { dest_address, .. } | Self::PayAsset { dest_address, .. } => {
                Some(dest_address)
            }
            _ => None,
        }
    }
}

/// Length limits applied to transaction logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogBounds {
    /// Maximum topic length.
    pub topic_max: usize,
    /// Maximum length of each data element.
    pub data_max: usize,
}

impl Default for LogBounds {
    fn default() -> Self {
        Self {
            topic_max: TRANSACTION_LOG_TOPIC_MAXSIZE,
            data_max: TRANSACTION_LOG_DATA_MAXSIZE,
        }
    }
}

/// Application event attached to a log operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Event kind.
    pub topic: String,
    /// Ordered data; relay logs carry `[target_chain_id, json]`.
    pub data: Vec<String>,
}

impl LogEntry {
    /// Create a log entry.
    pub fn new(topic: impl Into<String>, data: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }

    /// Check topic and data lengths and the relay arity.
    pub fn validate(&self, bounds: &LogBounds) -> Result<(), RelayError> {
        if self.topic.is_empty() || self.topic.len() > bounds.topic_max {
            return Err(RelayError::MalformedLog(format!(
                "topic size {} not in (0,{}]",
                self.topic.len(),
                bounds.topic_max
            )));
        }
        if self.data.len() != RELAY_LOG_ARITY {
            return Err(RelayError::MalformedLog(format!(
                "expected {} data elements, got {}",
                RELAY_LOG_ARITY,
                self.data.len()
            )));
        }
        if let Some(bad) = self
            .data
            .iter()
            .find(|d| d.is_empty() || d.len() > bounds.data_max)
        {
            return Err(RelayError::MalformedLog(format!(
                "data size {} not in (0,{}]",
                bad.len(),
                bounds.data_max
            )));
        }
        Ok(())
    }
}

/// Signature over the serialized transaction body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Hex public key.
    pub public_key: String,
    /// Raw signature bytes.
    pub sign_data: Vec<u8>,
}

/// Transaction plus signatures, as submitted to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Transaction body.
    pub transaction: Transaction,
    /// Signatures over the bincode encoding of `transaction`.
    pub signatures: Vec<Signature>,
    /// Hex content hash of `transaction`.
    pub hash: String,
}

/// Account state as stored by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountState {
    /// Account address.
    pub address: String,
    /// Last used sequence number.
    pub nonce: i64,
    /// Balance.
    pub balance: i64,
}
