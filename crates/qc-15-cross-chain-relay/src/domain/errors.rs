//! # Domain Errors
//!
//! Error types for the cross-chain relay.

use thiserror::Error;

/// Cross-chain relay error types.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Signing key could not be decoded.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transaction task rejected at enqueue time.
    #[error("Invalid transaction task: {0}")]
    InvalidTask(String),

    /// Component is not enabled.
    #[error("{0} is not running")]
    NotRunning(&'static str),

    /// Component was started twice.
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// Log entry violates size or arity bounds.
    #[error("Malformed log entry: {0}")]
    MalformedLog(String),

    /// Log topic has no relay meaning.
    #[error("Unknown log topic: {0}")]
    UnknownTopic(String),

    /// Log payload is not valid JSON for the message schema.
    #[error("Invalid log payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Binary encoding failed.
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Merkle tree built from an empty leaf list.
    #[error("Merkle tree requires at least one leaf")]
    EmptyMerkleTree,

    /// Leaf is not part of the tree.
    #[error("Leaf not found in merkle tree: {0}")]
    LeafNotFound(String),

    /// Fee arithmetic overflowed.
    #[error("Fee overflow: gas_price={gas_price}, size={size}")]
    FeeOverflow {
        /// Gas price used
        gas_price: i64,
        /// Serialized size including signature overhead
        size: i64,
    },

    /// Account missing on the ledger.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Ledger query failed.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Network broadcast failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Message channel rejected the message.
    #[error("Message channel error: {0}")]
    Channel(String),
}

/// Outcome of applying a signed transaction at the ledger boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerResultCode {
    /// Transaction accepted.
    Success,
    /// Identical transaction already known to the ledger.
    AlreadyExists,
    /// Nonce conflicts with the authoritative account state.
    BadSequence,
    /// Any other rejection.
    Failed {
        /// Ledger error code
        code: i64,
        /// Human readable description
        desc: String,
    },
}

impl LedgerResultCode {
    /// True for the outcomes that count as a landed transaction.
    pub fn is_landed(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyExists)
    }
}
