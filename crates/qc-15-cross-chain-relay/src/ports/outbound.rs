//! # Outbound Ports
//!
//! Traits for the collaborators the relay depends on: ledger execution,
//! network broadcast, the cross-chain message channel and the proposers.

use crate::domain::{
    AccountState, CrossChainMessage, LedgerResultCode, ProposerTxResult, RelayError,
    SignedTransaction,
};
use async_trait::async_trait;

/// Ledger execution boundary - outbound port.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Apply a signed transaction to the pending ledger.
    async fn apply_transaction(&self, tx: &SignedTransaction) -> LedgerResultCode;

    /// Last sequence number used by `address`.
    async fn current_sequence_number(&self, address: &str) -> Result<i64, RelayError>;

    /// Account state, `None` if the account does not exist.
    async fn get_account(&self, address: &str) -> Result<Option<AccountState>, RelayError>;

    /// Current gas price from the fee configuration.
    async fn gas_price(&self) -> Result<i64, RelayError>;
}

/// Overlay message types the relay broadcasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastKind {
    /// Serialized `SignedTransaction`.
    Transaction,
}

/// Peer-to-peer broadcast - outbound port.
#[async_trait]
pub trait NetworkBroadcaster: Send + Sync {
    /// Propagate a payload to peers.
    async fn broadcast(&self, kind: BroadcastKind, payload: Vec<u8>) -> Result<(), RelayError>;
}

/// Cross-chain message transport - outbound port.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Hand a message to the transport.
    async fn publish(&self, message: CrossChainMessage) -> Result<(), RelayError>;
}

/// Proposer collaborator tracking its own transactions.
pub trait ProposerNotifier: Send + Sync {
    /// Record the ledger outcome of a transaction the proposer issued.
    fn update_tx_result(&self, result: &ProposerTxResult);
}
