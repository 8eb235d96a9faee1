//! # Block Event Router
//!
//! Turns the logs of a closed ledger into cross-chain messages.
//!
//! The role is fixed at construction:
//!
//! - **Main chain**: logs emitted by the chain-management contract with a
//!   `createChildChain`, `deposit`, `challenge` or `changeValidator` topic
//!   are published on the message channel.
//! - **Child chain**: the ledger header is published for the main chain,
//!   then logs of the chain-proof contract are handled: `withdrawal` is
//!   published, `withdrawalInit` produces an SPV proof that is sent back to
//!   the chain-proof contract as a transaction.
//!
//! In both roles, transactions this node sent to the chain-management
//! contract have their execution result forwarded to the proposers.
//!
//! Every applied transaction is visited together with its nested
//! instruction transactions.

use crate::algorithms::{hash_hex, MerkleTree};
use crate::config::RelayConfig;
use crate::domain::{
    AppliedTransaction, CrossChainMessage, LedgerBlock, LogBounds, LogEntry, ProposerTxResult,
    RelayError, RelayTopic, SpvProof, Transaction, TransactionTask, TransactionTaskResult,
    RELAY_LOG_ARITY,
};
use crate::ports::{
    BlockEventHandler, MessageChannel, ProposerNotifier, TransactionQueue,
    TransactionResultHandler,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller id under which SPV submissions are queued.
pub const SPV_CALLER_ID: &str = "qc-15-spv-proof";

/// Routes ledger events according to this node's chain role.
pub struct BlockEventRouter {
    self_chain_id: i64,
    is_main_chain: bool,
    cmc_address: String,
    cpc_address: String,
    self_address: String,
    log_bounds: LogBounds,
    channel: Arc<dyn MessageChannel>,
    queue: Arc<dyn TransactionQueue>,
    proposers: RwLock<Vec<Arc<dyn ProposerNotifier>>>,
    spv_results: Arc<SpvResultHandler>,
}

impl BlockEventRouter {
    /// Create a router for the chain described by `config`.
    ///
    /// `self_address` is the relay's own signing address.
    pub fn new(
        config: &RelayConfig,
        self_address: impl Into<String>,
        channel: Arc<dyn MessageChannel>,
        queue: Arc<dyn TransactionQueue>,
    ) -> Self {
        Self {
            self_chain_id: config.self_chain_id,
            is_main_chain: config.is_main_chain(),
            cmc_address: config.cmc_address.clone(),
            cpc_address: config.cpc_address.clone(),
            self_address: self_address.into(),
            log_bounds: config.log_bounds,
            channel,
            queue,
            proposers: RwLock::new(Vec::new()),
            spv_results: Arc::new(SpvResultHandler::default()),
        }
    }

    /// Register a proposer to receive results of its own transactions.
    pub fn add_proposer(&self, proposer: Arc<dyn ProposerNotifier>) {
        self.proposers.write().push(proposer);
    }

    /// True when routing as the main chain.
    pub fn is_main_chain(&self) -> bool {
        self.is_main_chain
    }

    /// Outcome counters of submitted SPV proofs.
    pub fn spv_results(&self) -> &SpvResultHandler {
        &self.spv_results
    }

    async fn handle_main_chain(&self, block: &LedgerBlock) {
        for applied in &block.transactions {
            for tx in applied.all_transactions() {
                if tx.source_address != self.cmc_address {
                    continue;
                }
                for entry in tx.logs() {
                    match self.relay_topic(entry) {
                        Some(
                            RelayTopic::CreateChildChain
                            | RelayTopic::Deposit
                            | RelayTopic::Challenge
                            | RelayTopic::ChangeValidator,
                        ) => self.publish_log(block.seq(), entry).await,
                        Some(topic) => {
                            debug!(topic = %topic, "[qc-15] Topic not relayed by main chain")
                        }
                        None => {}
                    }
                }
            }
        }
    }

    async fn handle_child_chain(&self, block: &LedgerBlock) {
        match CrossChainMessage::submit_header(&block.header) {
            Ok(message) => {
                if let Err(e) = self.channel.publish(message).await {
                    warn!(seq = block.seq(), "[qc-15] Header submission failed: {}", e);
                }
            }
            Err(e) => warn!(seq = block.seq(), "[qc-15] Cannot encode header: {}", e),
        }

        let mut tree: Option<MerkleTree> = None;
        for applied in &block.transactions {
            for tx in applied.all_transactions() {
                if tx.source_address != self.cpc_address {
                    continue;
                }
                for entry in tx.logs() {
                    match self.relay_topic(entry) {
                        Some(RelayTopic::Withdrawal) => self.publish_log(block.seq(), entry).await,
                        Some(RelayTopic::WithdrawalInit) => {
                            if tree.is_none() {
                                tree = build_block_tree(block);
                            }
                            if let Some(tree) = tree.as_ref() {
                                self.submit_spv_proof(block, tree, applied, tx);
                            }
                        }
                        Some(topic) => {
                            debug!(topic = %topic, "[qc-15] Topic not relayed by child chain")
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// Topic of a well-formed relay log, `None` if the entry is dropped.
    fn relay_topic(&self, entry: &LogEntry) -> Option<RelayTopic> {
        if entry.data.len() != RELAY_LOG_ARITY {
            debug!(
                topic = %entry.topic,
                data_len = entry.data.len(),
                "[qc-15] Log dropped: wrong data count"
            );
            return None;
        }
        if let Err(e) = entry.validate(&self.log_bounds) {
            warn!(topic = %entry.topic, "[qc-15] Log dropped: {}", e);
            return None;
        }
        entry.topic.parse().ok()
    }

    async fn publish_log(&self, seq: i64, entry: &LogEntry) {
        let message = match CrossChainMessage::from_log(entry, &self.log_bounds) {
            Ok(message) => message,
            Err(e) => {
                warn!(seq, topic = %entry.topic, "[qc-15] Log skipped: {}", e);
                return;
            }
        };
        let target = message.target_chain_id;
        let kind = message.kind;
        match self.channel.publish(message).await {
            Ok(()) => {
                info!(seq, target_chain = target, kind = ?kind, "[qc-15] Cross-chain message relayed")
            }
            Err(e) => warn!(seq, kind = ?kind, "[qc-15] Publish failed: {}", e),
        }
    }

    fn submit_spv_proof(
        &self,
        block: &LedgerBlock,
        tree: &MerkleTree,
        applied: &AppliedTransaction,
        tx: &Transaction,
    ) {
        match self.build_spv_task(block, tree, applied, tx) {
            Ok(task) => {
                let handler: Arc<dyn TransactionResultHandler> = self.spv_results.clone();
                match self.queue.async_send_transaction(handler, task) {
                    Ok(()) => info!(
                        seq = block.seq(),
                        tx = %applied.hash,
                        "[qc-15] SPV proof queued"
                    ),
                    Err(e) => warn!(seq = block.seq(), "[qc-15] SPV proof not queued: {}", e),
                }
            }
            Err(e) => warn!(
                seq = block.seq(),
                tx = %applied.hash,
                "[qc-15] SPV proof not built: {}",
                e
            ),
        }
    }

    fn build_spv_task(
        &self,
        block: &LedgerBlock,
        tree: &MerkleTree,
        applied: &AppliedTransaction,
        tx: &Transaction,
    ) -> Result<TransactionTask, RelayError> {
        let leaf = hash_hex(applied.hash.as_bytes());
        if !tree.verify_leaf(&leaf) {
            return Err(RelayError::LeafNotFound(applied.hash.clone()));
        }
        let merkle_root = tree.root().ok_or(RelayError::EmptyMerkleTree)?;

        let proof = SpvProof {
            merkle_root,
            merkle_path: tree.audit_proof(&leaf),
            leaf,
            transaction: tx.clone(),
        };
        let input = proof.to_contract_input(&block.header.hash)?;
        Ok(TransactionTask::new(vec![input], 0, self.cpc_address.clone(), ""))
    }

    fn track_proposer_results(&self, block: &LedgerBlock) {
        let proposers = self.proposers.read();
        if proposers.is_empty() {
            return;
        }
        // One notification per matching transaction, nested ones report the
        // enclosing hash and result.
        for applied in &block.transactions {
            let matches = applied
                .all_transactions()
                .filter(|tx| tx.source_address == self.self_address && tx.pays_to(&self.cmc_address))
                .count();
            for _ in 0..matches {
                let result = ProposerTxResult {
                    code: applied.result.code,
                    description: applied.result.desc.clone(),
                    hash: applied.hash.clone(),
                };
                debug!(hash = %result.hash, code = result.code, "[qc-15] Proposer transaction result");
                for proposer in proposers.iter() {
                    proposer.update_tx_result(&result);
                }
            }
        }
    }
}

fn build_block_tree(block: &LedgerBlock) -> Option<MerkleTree> {
    match MerkleTree::from_leaves(&block.transaction_hashes()) {
        Ok(tree) => Some(tree),
        Err(e) => {
            warn!(seq = block.seq(), "[qc-15] Cannot build block merkle tree: {}", e);
            None
        }
    }
}

#[async_trait]
impl BlockEventHandler for BlockEventRouter {
    async fn handle_block(&self, block: &LedgerBlock) {
        if block.chain_id() != self.self_chain_id {
            warn!(
                seq = block.seq(),
                chain_id = block.chain_id(),
                "[qc-15] Router ignoring block from foreign chain"
            );
            return;
        }

        self.track_proposer_results(block);
        if self.is_main_chain {
            self.handle_main_chain(block).await;
        } else {
            self.handle_child_chain(block).await;
        }
    }
}

/// Logs the outcome of SPV proof submissions.
#[derive(Debug, Default)]
pub struct SpvResultHandler {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl SpvResultHandler {
    /// Proofs that landed.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Proofs that failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl TransactionResultHandler for SpvResultHandler {
    fn caller_id(&self) -> &str {
        SPV_CALLER_ID
    }

    fn handle_transaction_result(&self, _task: &TransactionTask, result: &TransactionTaskResult) {
        if result.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(hash = %result.transaction_hash, "[qc-15] SPV proof submitted");
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            warn!("[qc-15] SPV proof submission failed: {}", result.error_description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DepositPayload, ExecutionResult, LedgerHeader, MessageKind, Operation,
        BUILD_WITHDRAWAL_PROOFS_METHOD, MAIN_CHAIN_ID,
    };
    use parking_lot::Mutex;

    const SELF_ADDRESS: &str = "0xrelay";

    #[derive(Default)]
    struct RecordingChannel {
        messages: Mutex<Vec<CrossChainMessage>>,
    }

    #[async_trait]
    impl MessageChannel for RecordingChannel {
        async fn publish(&self, message: CrossChainMessage) -> Result<(), RelayError> {
            self.messages.lock().push(message);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        tasks: Mutex<Vec<(String, TransactionTask)>>,
    }

    impl TransactionQueue for RecordingQueue {
        fn async_send_transaction(
            &self,
            handler: Arc<dyn TransactionResultHandler>,
            task: TransactionTask,
        ) -> Result<(), RelayError> {
            self.tasks.lock().push((handler.caller_id().to_string(), task));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingProposer {
        results: Mutex<Vec<ProposerTxResult>>,
    }

    impl ProposerNotifier for RecordingProposer {
        fn update_tx_result(&self, result: &ProposerTxResult) {
            self.results.lock().push(result.clone());
        }
    }

    struct Fixture {
        router: BlockEventRouter,
        channel: Arc<RecordingChannel>,
        queue: Arc<RecordingQueue>,
        config: RelayConfig,
    }

    fn fixture(chain_id: i64) -> Fixture {
        let config = RelayConfig {
            self_chain_id: chain_id,
            ..Default::default()
        };
        let channel = Arc::new(RecordingChannel::default());
        let queue = Arc::new(RecordingQueue::default());
        let router = BlockEventRouter::new(&config, SELF_ADDRESS, channel.clone(), queue.clone());
        Fixture {
            router,
            channel,
            queue,
            config,
        }
    }

    fn log_op(topic: &str, data: &[&str]) -> Operation {
        Operation::Log(LogEntry::new(
            topic,
            data.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn tx(source: &str, operations: Vec<Operation>) -> Transaction {
        Transaction {
            source_address: source.to_string(),
            operations,
            ..Default::default()
        }
    }

    fn applied(hash: &str, transaction: Transaction) -> AppliedTransaction {
        AppliedTransaction {
            transaction,
            hash: hash.to_string(),
            result: ExecutionResult::default(),
            instructions: vec![],
        }
    }

    fn block(chain_id: i64, seq: i64, transactions: Vec<AppliedTransaction>) -> LedgerBlock {
        LedgerBlock {
            header: LedgerHeader {
                seq,
                chain_id,
                hash: format!("block-{}", seq),
                ..Default::default()
            },
            transactions,
        }
    }

    #[tokio::test]
    async fn test_main_chain_deposit_publishes_one_message() {
        let f = fixture(MAIN_CHAIN_ID);
        let deposit = log_op("deposit", &["3", r#"{"chain_id":3,"amount":50,"seq":1}"#]);
        let b = block(0, 1, vec![applied("t1", tx(&f.config.cmc_address, vec![deposit]))]);

        f.router.handle_block(&b).await;

        let messages = f.channel.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Deposit);
        assert_eq!(messages[0].target_chain_id, 3);
        let payload: DepositPayload = bincode::deserialize(&messages[0].payload).unwrap();
        assert_eq!(payload.amount, 50);
    }

    #[tokio::test]
    async fn test_three_data_elements_dropped() {
        let f = fixture(MAIN_CHAIN_ID);
        let bad = log_op("deposit", &["3", "{}", "extra"]);
        let b = block(0, 1, vec![applied("t1", tx(&f.config.cmc_address, vec![bad]))]);

        f.router.handle_block(&b).await;

        assert!(f.channel.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_main_chain_ignores_other_sources_and_topics() {
        let f = fixture(MAIN_CHAIN_ID);
        let b = block(
            0,
            1,
            vec![
                applied("t1", tx("0xuser", vec![log_op("deposit", &["3", "{}"])])),
                applied(
                    "t2",
                    tx(&f.config.cmc_address, vec![log_op("withdrawal", &["0", "{}"])]),
                ),
                applied(
                    "t3",
                    tx(&f.config.cmc_address, vec![log_op("unrelated", &["0", "{}"])]),
                ),
            ],
        );

        f.router.handle_block(&b).await;

        assert!(f.channel.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entry_does_not_stop_block() {
        let f = fixture(MAIN_CHAIN_ID);
        let ops = vec![
            log_op("deposit", &["3", "{broken"]),
            log_op("changeValidator", &["3", r#"{"add_validator":"v"}"#]),
        ];
        let b = block(0, 1, vec![applied("t1", tx(&f.config.cmc_address, ops))]);

        f.router.handle_block(&b).await;

        let messages = f.channel.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::ChangeChildValidator);
    }

    #[tokio::test]
    async fn test_nested_instruction_is_scanned() {
        let f = fixture(MAIN_CHAIN_ID);
        let mut outer = applied("t1", tx("0xuser", vec![Operation::Other]));
        outer.instructions.push(tx(
            &f.config.cmc_address,
            vec![log_op("createChildChain", &["0", r#"{"chain_id":5}"#])],
        ));

        f.router.handle_block(&block(0, 1, vec![outer])).await;

        let messages = f.channel.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::CreateChildChain);
    }

    #[tokio::test]
    async fn test_foreign_block_ignored() {
        let f = fixture(MAIN_CHAIN_ID);
        let deposit = log_op("deposit", &["3", "{}"]);
        let b = block(7, 1, vec![applied("t1", tx(&f.config.cmc_address, vec![deposit]))]);

        f.router.handle_block(&b).await;

        assert!(f.channel.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_child_chain_header_then_withdrawal() {
        let f = fixture(4);
        let withdrawal = log_op("withdrawal", &["0", r#"{"chain_id":4,"amount":9}"#]);
        let b = block(4, 11, vec![applied("t1", tx(&f.config.cpc_address, vec![withdrawal]))]);

        f.router.handle_block(&b).await;

        let messages = f.channel.messages.lock();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::SubmitHeader);
        assert_eq!(messages[0].target_chain_id, MAIN_CHAIN_ID);
        let header: LedgerHeader = bincode::deserialize(&messages[0].payload).unwrap();
        assert_eq!(header.seq, 11);
        assert_eq!(messages[1].kind, MessageKind::Withdrawal);
        assert!(f.queue.tasks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_child_chain_ignores_cmc_topics() {
        let f = fixture(4);
        let deposit = log_op("deposit", &["4", "{}"]);
        let b = block(4, 1, vec![applied("t1", tx(&f.config.cpc_address, vec![deposit]))]);

        f.router.handle_block(&b).await;

        let messages = f.channel.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::SubmitHeader);
    }

    #[tokio::test]
    async fn test_withdrawal_init_queues_spv_proof() {
        let f = fixture(4);
        let init_tx = tx(&f.config.cpc_address, vec![log_op("withdrawalInit", &["0", "{}"])]);
        let b = block(
            4,
            12,
            vec![
                applied("aa", tx("0xuser", vec![])),
                applied("bb", init_tx.clone()),
                applied("cc", tx("0xuser", vec![])),
            ],
        );

        f.router.handle_block(&b).await;

        let tasks = f.queue.tasks.lock();
        assert_eq!(tasks.len(), 1);
        let (caller, task) = &tasks[0];
        assert_eq!(caller, SPV_CALLER_ID);
        assert_eq!(task.destination_address, f.config.cpc_address);
        assert_eq!(task.amount, 0);
        assert_eq!(task.input_parameters.len(), 1);

        let input: serde_json::Value = serde_json::from_str(&task.input_parameters[0]).unwrap();
        assert_eq!(input["method"], BUILD_WITHDRAWAL_PROOFS_METHOD);
        assert_eq!(input["params"]["block_hash"], "block-12");

        let raw = hex::decode(input["params"]["merkel_proof"].as_str().unwrap()).unwrap();
        let proof: SpvProof = bincode::deserialize(&raw).unwrap();
        let expected_root = MerkleTree::from_leaves(&["aa", "bb", "cc"])
            .unwrap()
            .root()
            .unwrap();
        assert_eq!(proof.merkle_root, expected_root);
        assert_eq!(proof.leaf, hash_hex(b"bb"));
        assert_eq!(proof.transaction, init_tx);
        assert!(MerkleTree::verify_audit(
            &proof.merkle_root,
            &proof.leaf,
            &proof.merkle_path
        ));
    }

    #[tokio::test]
    async fn test_main_chain_never_builds_spv() {
        let f = fixture(MAIN_CHAIN_ID);
        let init = log_op("withdrawalInit", &["0", "{}"]);
        let b = block(0, 1, vec![applied("t1", tx(&f.config.cmc_address, vec![init]))]);

        f.router.handle_block(&b).await;

        assert!(f.queue.tasks.lock().is_empty());
        assert!(f.channel.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_proposer_receives_own_transaction_results() {
        let f = fixture(MAIN_CHAIN_ID);
        let main_proposer = Arc::new(RecordingProposer::default());
        let child_proposer = Arc::new(RecordingProposer::default());
        f.router.add_proposer(main_proposer.clone());
        f.router.add_proposer(child_proposer.clone());

        let pay_cmc = Operation::PayCoin {
            dest_address: f.config.cmc_address.clone(),
            amount: 0,
            input: "{}".into(),
        };
        let pay_other = Operation::PayCoin {
            dest_address: "0xelsewhere".into(),
            amount: 0,
            input: String::new(),
        };
        let mut own = applied("mine", tx(SELF_ADDRESS, vec![pay_cmc.clone()]));
        own.result = ExecutionResult {
            code: 151,
            desc: "contract failed".into(),
        };
        let b = block(
            0,
            1,
            vec![
                own,
                applied("other-dest", tx(SELF_ADDRESS, vec![pay_other])),
                applied("other-src", tx("0xuser", vec![pay_cmc])),
            ],
        );

        f.router.handle_block(&b).await;

        for proposer in [&main_proposer, &child_proposer] {
            let results = proposer.results.lock();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].hash, "mine");
            assert_eq!(results[0].code, 151);
            assert_eq!(results[0].description, "contract failed");
        }
    }

    #[tokio::test]
    async fn test_proposer_tracks_nested_instruction() {
        let f = fixture(MAIN_CHAIN_ID);
        let proposer = Arc::new(RecordingProposer::default());
        f.router.add_proposer(proposer.clone());

        let mut outer = applied(
            "outer",
            tx(
                "0xthird-party",
                vec![Operation::PayCoin {
                    dest_address: "0xcontract".into(),
                    amount: 0,
                    input: String::new(),
                }],
            ),
        );
        outer.result = ExecutionResult {
            code: 4,
            desc: "nested failure".into(),
        };
        outer.instructions.push(tx(
            SELF_ADDRESS,
            vec![Operation::PayCoin {
                dest_address: f.config.cmc_address.clone(),
                amount: 0,
                input: "{}".into(),
            }],
        ));

        f.router.handle_block(&block(0, 1, vec![outer])).await;

        let results = proposer.results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hash, "outer");
        assert_eq!(results[0].code, 4);
        assert_eq!(results[0].description, "nested failure");
    }

    #[tokio::test]
    async fn test_proposer_notified_per_matching_transaction() {
        let f = fixture(4);
        let proposer = Arc::new(RecordingProposer::default());
        f.router.add_proposer(proposer.clone());

        let pay_cmc = Operation::PayCoin {
            dest_address: f.config.cmc_address.clone(),
            amount: 0,
            input: "{}".into(),
        };
        let mut own = applied("own", tx(SELF_ADDRESS, vec![pay_cmc.clone()]));
        own.instructions.push(tx(SELF_ADDRESS, vec![pay_cmc]));

        f.router.handle_block(&block(4, 1, vec![own])).await;

        let results = proposer.results.lock();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.hash == "own"));
    }

    #[test]
    fn test_spv_result_handler_counts() {
        let handler = SpvResultHandler::default();
        let task = TransactionTask::default();
        handler.handle_transaction_result(&task, &TransactionTaskResult::succeeded("h"));
        handler.handle_transaction_result(&task, &TransactionTaskResult::failed("x"));
        assert_eq!(handler.succeeded(), 1);
        assert_eq!(handler.failed(), 1);
        assert_eq!(handler.caller_id(), SPV_CALLER_ID);
    }
}
