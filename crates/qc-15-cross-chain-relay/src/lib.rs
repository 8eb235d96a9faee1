//! # QC-15 Cross-Chain Relay
//!
//! Relays cross-chain events between the main chain and its child chains.
//!
//! **Subsystem ID:** 15
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Watch closed ledgers and extract cross-chain logs
//! - Publish them as typed messages for the other chain
//! - Prove withdrawals with Merkle audit paths (SPV)
//! - Send derived transactions with ordered sequence numbers
//!
//! ## Message Flow
//!
//! ```text
//! ledger close ──→ BlockBuffer ──(ascending seq)──→ BlockEventRouter
//!                                                     │        │
//!                                        MessageChannel    TransactionSubmitter
//!                                     (deposit, header…)   (SPV proof → CPC)
//! ```
//!
//! ## Topics
//!
//! | Topic | Chain | Message |
//! |-------|-------|---------|
//! | `createChildChain` | main | `CreateChildChain` |
//! | `deposit` | main | `Deposit` |
//! | `challenge` | main | `ChallengeWithdrawal` |
//! | `changeValidator` | main | `ChangeChildValidator` |
//! | `withdrawal` | child | `Withdrawal` |
//! | `withdrawalInit` | child | SPV proof transaction |
//!
//! ## Module Structure
//!
//! ```text
//! qc-15-cross-chain-relay/
//! ├── domain/          # Ledger view, messages, tasks, errors
//! ├── algorithms/      # Merkle tree, fee evaluation
//! ├── ports/           # Ledger, network, channel, proposer traits
//! ├── adapters/        # Ed25519 signer, broadcast message channel
//! ├── service/         # BlockBuffer, BlockEventRouter, TransactionSubmitter
//! ├── config.rs        # RelayConfig
//! └── runtime.rs       # RelayRuntime wiring
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod ports;
pub mod runtime;
pub mod service;

// Re-exports
pub use adapters::{BroadcastMessageChannel, TransactionSigner};
pub use algorithms::{AuditNode, BranchDirection, MerkleTree};
pub use config::{BufferConfig, RelayConfig, SubmitterConfig};
pub use domain::{
    CrossChainMessage, LedgerBlock, LedgerHeader, LedgerResultCode, LogEntry, MessageKind,
    RelayError, RelayTopic, SpvProof, TransactionTask, TransactionTaskResult, MAIN_CHAIN_ID,
};
pub use ports::{
    BlockEventHandler, LedgerGateway, MessageChannel, NetworkBroadcaster, ProposerNotifier,
    TransactionQueue, TransactionResultHandler,
};
pub use runtime::RelayRuntime;
pub use service::{BlockBuffer, BlockEventRouter, TransactionSubmitter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
