//! End-to-end relay flows over in-memory ports.

use async_trait::async_trait;
use parking_lot::Mutex;
use qc_15_cross_chain_relay::domain::{
    AccountState, AppliedTransaction, DepositPayload, ExecutionResult, Operation,
    ProposerTxResult, SignedTransaction, Transaction,
};
use qc_15_cross_chain_relay::ports::BroadcastKind;
use qc_15_cross_chain_relay::{
    BroadcastMessageChannel, LedgerBlock, LedgerGateway, LedgerHeader, LedgerResultCode, LogEntry,
    MerkleTree, MessageKind, NetworkBroadcaster, ProposerNotifier, RelayConfig, RelayError,
    RelayRuntime, SpvProof,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ledger that only accepts the next nonce.
struct InMemoryLedger {
    nonce: Mutex<i64>,
    applied: Mutex<Vec<SignedTransaction>>,
}

impl InMemoryLedger {
    fn new(nonce: i64) -> Arc<Self> {
        Arc::new(Self {
            nonce: Mutex::new(nonce),
            applied: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn apply_transaction(&self, tx: &SignedTransaction) -> LedgerResultCode {
        let mut nonce = self.nonce.lock();
        if tx.transaction.nonce != *nonce + 1 {
            return LedgerResultCode::BadSequence;
        }
        *nonce += 1;
        self.applied.lock().push(tx.clone());
        LedgerResultCode::Success
    }

    async fn current_sequence_number(&self, _address: &str) -> Result<i64, RelayError> {
        Ok(*self.nonce.lock())
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountState>, RelayError> {
        Ok(Some(AccountState {
            address: address.to_string(),
            nonce: *self.nonce.lock(),
            balance: 1_000_000,
        }))
    }

    async fn gas_price(&self) -> Result<i64, RelayError> {
        Ok(1)
    }
}

#[derive(Default)]
struct RecordingNetwork {
    broadcasts: Mutex<Vec<BroadcastKind>>,
}

#[async_trait]
impl NetworkBroadcaster for RecordingNetwork {
    async fn broadcast(&self, kind: BroadcastKind, _payload: Vec<u8>) -> Result<(), RelayError> {
        self.broadcasts.lock().push(kind);
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

fn config(chain_id: i64) -> RelayConfig {
    RelayConfig {
        self_chain_id: chain_id,
        private_key: Some(SEED.to_string()),
        ..Default::default()
    }
}

fn log(topic: &str, target: &str, json: &str) -> Operation {
    Operation::Log(LogEntry::new(topic, vec![target.to_string(), json.to_string()]))
}

fn applied(hash: &str, source: &str, operations: Vec<Operation>) -> AppliedTransaction {
    AppliedTransaction {
        transaction: Transaction {
            source_address: source.to_string(),
            operations,
            ..Default::default()
        },
        hash: hash.to_string(),
        result: ExecutionResult::default(),
        instructions: vec![],
    }
}

fn block(chain_id: i64, seq: i64, transactions: Vec<AppliedTransaction>) -> Arc<LedgerBlock> {
    Arc::new(LedgerBlock {
        header: LedgerHeader {
            seq,
            chain_id,
            hash: format!("ledger-{}-{}", chain_id, seq),
            ..Default::default()
        },
        transactions,
    })
}

#[tokio::test(start_paused = true)]
async fn main_chain_relays_deposits_in_block_order() {
    init_tracing();
    let ledger = InMemoryLedger::new(0);
    let channel = Arc::new(BroadcastMessageChannel::new());
    let mut rx = channel.subscribe();
    let config = config(0);
    let cmc = config.cmc_address.clone();

    let runtime = RelayRuntime::new(
        config,
        ledger,
        Arc::new(RecordingNetwork::default()),
        channel.clone(),
    )
    .unwrap();
    runtime.start().unwrap();

    let later = block(
        0,
        5,
        vec![applied("t5", &cmc, vec![log("deposit", "2", r#"{"seq":2,"amount":20}"#)])],
    );
    let earlier = block(
        0,
        3,
        vec![applied("t3", &cmc, vec![log("deposit", "1", r#"{"seq":1,"amount":10}"#)])],
    );
    assert!(runtime.handle_block(later));
    assert!(runtime.handle_block(earlier));
    assert!(!runtime.handle_block(block(9, 4, vec![])));

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    assert!(rx.try_recv().is_err());

    assert_eq!(first.kind, MessageKind::Deposit);
    assert_eq!(first.target_chain_id, 1);
    let payload: DepositPayload = bincode::deserialize(&first.payload).unwrap();
    assert_eq!(payload.amount, 10);
    assert_eq!(second.target_chain_id, 2);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn child_chain_submits_header_and_spv_proof() {
    init_tracing();
    let ledger = InMemoryLedger::new(7);
    let network = Arc::new(RecordingNetwork::default());
    let channel = Arc::new(BroadcastMessageChannel::new());
    let mut rx = channel.subscribe();
    let config = config(2);
    let cpc = config.cpc_address.clone();

    let runtime =
        RelayRuntime::new(config, ledger.clone(), network.clone(), channel.clone()).unwrap();
    runtime.start().unwrap();

    let withdrawal_tx = applied(
        "h2",
        &cpc,
        vec![
            log("withdrawal", "0", r#"{"chain_id":2,"amount":5,"seq":1}"#),
            log("withdrawalInit", "0", r#"{"seq":1}"#),
        ],
    );
    let proven = withdrawal_tx.transaction.clone();
    runtime.handle_block(block(
        2,
        1,
        vec![applied("h1", "0xuser", vec![]), withdrawal_tx],
    ));

    tokio::time::sleep(Duration::from_secs(7)).await;

    let header = rx.try_recv().unwrap();
    assert_eq!(header.kind, MessageKind::SubmitHeader);
    assert_eq!(header.target_chain_id, 0);
    let withdrawal = rx.try_recv().unwrap();
    assert_eq!(withdrawal.kind, MessageKind::Withdrawal);

    let applied_txs = ledger.applied.lock().clone();
    assert_eq!(applied_txs.len(), 1);
    let sent = &applied_txs[0].transaction;
    assert_eq!(sent.nonce, 8);
    assert_eq!(sent.chain_id, 2);
    assert_eq!(sent.source_address, runtime.submitter().address());

    let Operation::PayCoin {
        dest_address,
        amount,
        input,
    } = &sent.operations[0]
    else {
        panic!("expected a payment operation");
    };
    assert_eq!(dest_address, &cpc);
    assert_eq!(*amount, 0);

    let call: serde_json::Value = serde_json::from_str(input).unwrap();
    assert_eq!(call["params"]["block_hash"], "ledger-2-1");
    let raw = hex::decode(call["params"]["merkel_proof"].as_str().unwrap()).unwrap();
    let proof: SpvProof = bincode::deserialize(&raw).unwrap();
    assert_eq!(proof.transaction, proven);
    assert_eq!(
        proof.merkle_root,
        MerkleTree::from_leaves(&["h1", "h2"]).unwrap().root().unwrap()
    );
    assert!(MerkleTree::verify_audit(
        &proof.merkle_root,
        &proof.leaf,
        &proof.merkle_path
    ));

    assert_eq!(runtime.router().spv_results().succeeded(), 1);
    assert_eq!(*network.broadcasts.lock(), vec![BroadcastKind::Transaction]);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn proposer_tracks_own_transactions() {
    init_tracing();
    let config = config(0);
    let cmc = config.cmc_address.clone();
    let runtime = RelayRuntime::new(
        config,
        InMemoryLedger::new(0),
        Arc::new(RecordingNetwork::default()),
        Arc::new(BroadcastMessageChannel::new()),
    )
    .unwrap();
    let proposer = Arc::new(RecordingProposer::default());
    runtime.add_proposer(proposer.clone());
    runtime.start().unwrap();

    let own_address = runtime.submitter().address().to_string();
    let mut own = applied(
        "proposal",
        &own_address,
        vec![Operation::PayCoin {
            dest_address: cmc,
            amount: 0,
            input: "{}".into(),
        }],
    );
    own.result = ExecutionResult {
        code: 0,
        desc: "ok".into(),
    };
    runtime.handle_block(block(0, 1, vec![own]));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let results = proposer.results.lock().clone();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].hash, "proposal");
    assert_eq!(results[0].description, "ok");

    runtime.shutdown().await;
}

#[test]
fn invalid_key_prevents_startup() {
    let config = RelayConfig {
        private_key: Some("not-a-key".into()),
        ..Default::default()
    };
    let result = RelayRuntime::new(
        config,
        InMemoryLedger::new(0),
        Arc::new(RecordingNetwork::default()),
        Arc::new(BroadcastMessageChannel::new()),
    );
    assert!(matches!(result, Err(RelayError::InvalidPrivateKey(_))));
}
