//! # Cross-Chain Messages
//!
//! Log topics, message kinds and the binary payload schemas carried on the
//! message channel.

use super::errors::RelayError;
use super::ledger::{LedgerHeader, LogBounds, LogEntry, Transaction};
use crate::algorithms::merkle::AuditNode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain id of the main chain.
pub const MAIN_CHAIN_ID: i64 = 0;

/// Contract method invoked with an SPV proof.
pub const BUILD_WITHDRAWAL_PROOFS_METHOD: &str = "buildWithdrawalProofs";

/// Log topics recognised by the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelayTopic {
    /// `createChildChain`
    CreateChildChain,
    /// `deposit`
    Deposit,
    /// `withdrawal`
    Withdrawal,
    /// `withdrawalInit`
    WithdrawalInit,
    /// `challenge`
    Challenge,
    /// `changeValidator`
    ChangeValidator,
}

impl RelayTopic {
    /// Topic string as emitted by contracts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateChildChain => "createChildChain",
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::WithdrawalInit => "withdrawalInit",
            Self::Challenge => "challenge",
            Self::ChangeValidator => "changeValidator",
        }
    }

    /// Message kind the topic is forwarded as.
    ///
    /// `withdrawalInit` is never forwarded; it triggers an SPV proof.
    pub fn message_kind(&self) -> MessageKind {
        match self {
            Self::CreateChildChain => MessageKind::CreateChildChain,
            Self::Deposit => MessageKind::Deposit,
            Self::Withdrawal => MessageKind::Withdrawal,
            Self::Challenge => MessageKind::ChallengeWithdrawal,
            Self::ChangeValidator => MessageKind::ChangeChildValidator,
            Self::WithdrawalInit => MessageKind::None,
        }
    }
}

impl FromStr for RelayTopic {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createChildChain" => Ok(Self::CreateChildChain),
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "withdrawalInit" => Ok(Self::WithdrawalInit),
            "challenge" => Ok(Self::Challenge),
            "changeValidator" => Ok(Self::ChangeValidator),
            other => Err(RelayError::UnknownTopic(other.to_string())),
        }
    }
}

impl fmt::Display for RelayTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message channel kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// No relay meaning; dropped.
    #[default]
    None,
    /// Create a child chain.
    CreateChildChain,
    /// Deposit from main chain to child chain.
    Deposit,
    /// Withdrawal from child chain to main chain.
    Withdrawal,
    /// Challenge a withdrawal.
    ChallengeWithdrawal,
    /// Change a child chain validator.
    ChangeChildValidator,
    /// Child chain ledger header.
    SubmitHeader,
}

impl MessageKind {
    /// Decode a JSON log payload into this kind's schema and re-encode it
    /// as bincode.
    pub fn encode_json_payload(&self, json: &str) -> Result<Vec<u8>, RelayError> {
        match self {
            Self::CreateChildChain => reencode::<CreateChildChainPayload>(json),
            Self::Deposit => reencode::<DepositPayload>(json),
            Self::Withdrawal => reencode::<WithdrawalPayload>(json),
            Self::ChallengeWithdrawal => reencode::<ChallengeWithdrawalPayload>(json),
            Self::ChangeChildValidator => reencode::<ChangeChildValidatorPayload>(json),
            Self::SubmitHeader => reencode::<LedgerHeader>(json),
            Self::None => Err(RelayError::UnknownTopic("none".into())),
        }
    }
}

fn reencode<T: Serialize + DeserializeOwned>(json: &str) -> Result<Vec<u8>, RelayError> {
    let value: T = serde_json::from_str(json)?;
    Ok(bincode::serialize(&value)?)
}

/// Message published on the cross-chain channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    /// Destination chain.
    pub target_chain_id: i64,
    /// Message kind.
    pub kind: MessageKind,
    /// Bincode payload of the kind's schema.
    pub payload: Vec<u8>,
}

impl CrossChainMessage {
    /// Convert a relay log into a message.
    ///
    /// `data[0]` is the target chain id, `data[1]` the JSON payload.
    pub fn from_log(entry: &LogEntry, bounds: &LogBounds) -> Result<Self, RelayError> {
        entry.validate(bounds)?;
        let kind = entry.topic.parse::<RelayTopic>()?.message_kind();
        if kind == MessageKind::None {
            return Err(RelayError::UnknownTopic(entry.topic.clone()));
        }
        let target_chain_id = entry.data[0].trim().parse::<i64>().map_err(|e| {
            RelayError::MalformedLog(format!("target chain id {:?}: {}", entry.data[0], e))
        })?;
        let payload = kind.encode_json_payload(&entry.data[1])?;
        Ok(Self {
            target_chain_id,
            kind,
            payload,
        })
    }

    /// Header submission from a child chain to the main chain.
    pub fn submit_header(header: &LedgerHeader) -> Result<Self, RelayError> {
        Ok(Self {
            target_chain_id: MAIN_CHAIN_ID,
            kind: MessageKind::SubmitHeader,
            payload: bincode::serialize(header)?,
        })
    }
}

/// `createChildChain` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateChildChainPayload {
    /// New chain id.
    pub chain_id: i64,
    /// Genesis account.
    pub genesis_account: String,
    /// Initial validators.
    pub validators: Vec<String>,
    /// Gas price of the child chain.
    pub fee_price: i64,
}

/// `deposit` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositPayload {
    /// Child chain id.
    pub chain_id: i64,
    /// Amount.
    pub amount: i64,
    /// Deposit sequence.
    pub seq: i64,
    /// Main chain ledger sequence.
    pub block_number: i64,
    /// Depositor on the main chain.
    pub source_address: String,
    /// Recipient on the child chain.
    pub address: String,
}

/// `withdrawal` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalPayload {
    /// Child chain id.
    pub chain_id: i64,
    /// Amount.
    pub amount: i64,
    /// Withdrawal sequence.
    pub seq: i64,
    /// Child chain ledger hash.
    pub block_hash: String,
    /// Sender on the child chain.
    pub source_address: String,
    /// Recipient on the main chain.
    pub address: String,
}

/// `challenge` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeWithdrawalPayload {
    /// Child chain id.
    pub chain_id: i64,
    /// Challenged withdrawal sequence.
    pub seq: i64,
    /// Child chain ledger hash.
    pub block_hash: String,
    /// Challenger.
    pub challenger: String,
}

/// `changeValidator` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeChildValidatorPayload {
    /// Child chain id.
    pub chain_id: i64,
    /// Validator to add.
    pub add_validator: String,
    /// Validator to remove.
    pub delete_validator: String,
}

/// SPV evidence that a transaction is included in a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpvProof {
    /// Merkle root over the ledger's transaction hashes.
    pub merkle_root: String,
    /// Audit trail from the transaction's leaf to the root.
    pub merkle_path: Vec<AuditNode>,
    /// Hex hash of the top-level transaction the leaf was built from.
    pub leaf: String,
    /// Transaction that emitted the withdrawal log.
    pub transaction: Transaction,
}

impl SpvProof {
    /// JSON contract input submitted to the chain-proof contract.
    pub fn to_contract_input(&self, block_hash: &str) -> Result<String, RelayError> {
        let encoded = hex::encode(bincode::serialize(self)?);
        let input = serde_json::json!({
            "method": BUILD_WITHDRAWAL_PROOFS_METHOD,
            "params": {
                "block_hash": block_hash,
                "merkel_proof": encoded,
            }
        });
        Ok(input.to_string())
    }
}
