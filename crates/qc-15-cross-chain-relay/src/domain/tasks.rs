//! # Transaction Tasks
//!
//! Requests queued on the transaction submitter and the results reported
//! back to their callers.

use super::errors::RelayError;

/// A transaction the submitter should build, sign and send.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionTask {
    /// Contract inputs, one payment operation each.
    pub input_parameters: Vec<String>,
    /// Amount paid with the first operation.
    pub amount: i64,
    /// Recipient of every operation.
    pub destination_address: String,
    /// Transaction memo.
    pub memo: String,
}

impl TransactionTask {
    /// Create a task.
    pub fn new(
        input_parameters: Vec<String>,
        amount: i64,
        destination_address: impl Into<String>,
        memo: impl Into<String>,
    ) -> Self {
        Self {
            input_parameters,
            amount,
            destination_address: destination_address.into(),
            memo: memo.into(),
        }
    }

    /// Reject tasks that can never produce a valid transaction.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.amount < 0 {
            return Err(RelayError::InvalidTask(format!(
                "negative amount {}",
                self.amount
            )));
        }
        if self.destination_address.is_empty() {
            return Err(RelayError::InvalidTask("empty destination".into()));
        }
        if self.input_parameters.is_empty() {
            return Err(RelayError::InvalidTask("no input parameters".into()));
        }
        Ok(())
    }
}

/// Outcome of one task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionTaskResult {
    /// Whether the transaction landed.
    pub success: bool,
    /// Failure reason, empty on success.
    pub error_description: String,
    /// Hex hash of the landed transaction, empty on failure.
    pub transaction_hash: String,
}

impl TransactionTaskResult {
    /// Successful result.
    pub fn succeeded(transaction_hash: impl Into<String>) -> Self {
        Self {
            success: true,
            error_description: String::new(),
            transaction_hash: transaction_hash.into(),
        }
    }

    /// Failed result.
    pub fn failed(error_description: impl Into<String>) -> Self {
        Self {
            success: false,
            error_description: error_description.into(),
            transaction_hash: String::new(),
        }
    }
}

/// Execution result of a proposer-issued transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposerTxResult {
    /// Ledger result code.
    pub code: i64,
    /// Result description.
    pub description: String,
    /// Hex transaction hash.
    pub hash: String,
}
