//! # Inbound Ports
//!
//! What the relay components offer each other and the rest of the node.

use crate::domain::{LedgerBlock, RelayError, TransactionTask, TransactionTaskResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Consumer of closed ledgers, fed by the block buffer.
#[async_trait]
pub trait BlockEventHandler: Send + Sync {
    /// Extract and route the events of one ledger.
    async fn handle_block(&self, block: &LedgerBlock);
}

/// Receiver of transaction task outcomes.
pub trait TransactionResultHandler: Send + Sync {
    /// Identity used to group this caller's tasks.
    fn caller_id(&self) -> &str;

    /// Called once per task with its final outcome.
    fn handle_transaction_result(&self, task: &TransactionTask, result: &TransactionTaskResult);
}

/// Fire-and-forget transaction submission.
pub trait TransactionQueue: Send + Sync {
    /// Queue `task`; the outcome is delivered to `handler` later.
    fn async_send_transaction(
        &self,
        handler: Arc<dyn TransactionResultHandler>,
        task: TransactionTask,
    ) -> Result<(), RelayError>;
}
