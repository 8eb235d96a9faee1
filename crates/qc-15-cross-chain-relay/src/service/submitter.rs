//! # Transaction Submitter
//!
//! Sends relay transactions from this node's identity with strictly
//! increasing sequence numbers.
//!
//! Callers queue tasks with [`TransactionQueue::async_send_transaction`] and
//! return immediately. A background task wakes every `poll_interval`; once
//! `send_interval` has elapsed it takes the whole pending map and sends every
//! task serially, reporting each outcome to the caller's handler.
//!
//! ## Retry Policy
//!
//! | Ledger result | Sequence | Next step |
//! |---------------|----------|-----------|
//! | `Success` | +1 | broadcast, report success |
//! | `AlreadyExists` | +1 | report success |
//! | `BadSequence` | +1 | retry immediately |
//! | other | unchanged | retry after `retry_backoff` |
//!
//! A task gets at most `max_attempts` attempts and always gets exactly one
//! result.

use crate::adapters::TransactionSigner;
use crate::algorithms::{evaluate_fee, hash_hex};
use crate::config::{RelayConfig, SubmitterConfig};
use crate::domain::{
    LedgerResultCode, Operation, RelayError, SignedTransaction, Transaction, TransactionTask,
    TransactionTaskResult,
};
use crate::ports::{
    BroadcastKind, LedgerGateway, NetworkBroadcaster, TransactionQueue, TransactionResultHandler,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "TransactionSubmitter";

type PendingTasks = BTreeMap<String, (Arc<dyn TransactionResultHandler>, Vec<TransactionTask>)>;

/// Reliable, sequence-ordered transaction sender.
pub struct TransactionSubmitter {
    config: SubmitterConfig,
    chain_id: i64,
    signer: Arc<TransactionSigner>,
    ledger: Arc<dyn LedgerGateway>,
    network: Arc<dyn NetworkBroadcaster>,
    enabled: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<PendingTasks>,
    cycle: tokio::sync::Mutex<()>,
}

impl TransactionSubmitter {
    /// Create a submitter signing with `config.private_key`.
    ///
    /// Fails when the key is missing or invalid.
    pub fn new(
        config: &RelayConfig,
        ledger: Arc<dyn LedgerGateway>,
        network: Arc<dyn NetworkBroadcaster>,
    ) -> Result<Self, RelayError> {
        let key = config
            .private_key
            .as_deref()
            .ok_or_else(|| RelayError::InvalidPrivateKey("no private key configured".into()))?;
        let signer = Arc::new(TransactionSigner::from_hex(key)?);
        Ok(Self::with_signer(config, signer, ledger, network))
    }

    /// Create a submitter around an existing identity.
    pub fn with_signer(
        config: &RelayConfig,
        signer: Arc<TransactionSigner>,
        ledger: Arc<dyn LedgerGateway>,
        network: Arc<dyn NetworkBroadcaster>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config: config.submitter.clone(),
            chain_id: config.self_chain_id,
            signer,
            ledger,
            network,
            enabled: AtomicBool::new(false),
            shutdown_tx,
            handle: Mutex::new(None),
            pending: Mutex::new(BTreeMap::new()),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Address transactions are sent from.
    pub fn address(&self) -> &str {
        self.signer.address()
    }

    /// Whether the background loop is running.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of queued tasks across all callers.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().values().map(|(_, tasks)| tasks.len()).sum()
    }

    /// Spawn the send loop. Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), RelayError> {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return Err(RelayError::AlreadyRunning(COMPONENT));
        }
        self.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shutdown_tx.subscribe();

        let this = Arc::clone(self);
        *self.handle.lock() = Some(tokio::spawn(this.run(shutdown_rx)));

        info!(
            address = %self.signer.address(),
            send_interval_ms = self.config.send_interval.as_millis() as u64,
            "[qc-15] Transaction submitter started"
        );
        Ok(())
    }

    /// Stop the send loop and wait for it to finish.
    ///
    /// A task in its retry loop is failed with "submitter stopped"; tasks
    /// still queued stay queued.
    pub async fn exit(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("[qc-15] Transaction submitter task failed: {}", e);
            }
        }
        info!("[qc-15] Transaction submitter stopped");
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut last_send = Instant::now();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = sleep(self.config.poll_interval) => {}
            }
            if *shutdown_rx.borrow() || !self.is_enabled() {
                break;
            }
            if last_send.elapsed() >= self.config.send_interval {
                self.sending_all().await;
                last_send = Instant::now();
            }
        }
        debug!("[qc-15] Transaction submitter loop exited");
    }

    fn stopping(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Send every queued task and report the outcomes.
    ///
    /// Cycles never overlap: a second caller waits until the running cycle
    /// has resolved all of its tasks.
    pub async fn sending_all(&self) {
        let _cycle = self.cycle.lock().await;
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return;
        }

        let mut seq = match self.next_sequence().await {
            Ok(seq) => seq,
            Err(e) => {
                error!("[qc-15] Cannot start send cycle: {}", e);
                let result = TransactionTaskResult::failed(e.to_string());
                for (handler, tasks) in pending.into_values() {
                    for task in &tasks {
                        handler.handle_transaction_result(task, &result);
                    }
                }
                return;
            }
        };

        for (caller, (handler, tasks)) in pending {
            debug!(caller = %caller, tasks = tasks.len(), "[qc-15] Sending tasks");
            for task in &tasks {
                let result = self.sending_single(task, &mut seq).await;
                handler.handle_transaction_result(task, &result);
            }
        }
    }

    async fn next_sequence(&self) -> Result<i64, RelayError> {
        let address = self.signer.address();
        if self.ledger.get_account(address).await?.is_none() {
            return Err(RelayError::AccountNotFound(address.to_string()));
        }
        Ok(self.ledger.current_sequence_number(address).await? + 1)
    }

    /// Send one task, advancing `seq` past every sequence number consumed.
    /// Only called with the cycle lock held.
    async fn sending_single(
        &self,
        task: &TransactionTask,
        seq: &mut i64,
    ) -> TransactionTaskResult {
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.config.max_attempts {
            if self.stopping() {
                warn!(seq = *seq, attempt, "[qc-15] Task abandoned on shutdown");
                return TransactionTaskResult::failed("submitter stopped");
            }

            let gas_price = match self.ledger.gas_price().await {
                Ok(price) => price,
                Err(e) => {
                    warn!(attempt, "[qc-15] Gas price unavailable: {}", e);
                    last_error = e.to_string();
                    sleep(self.config.retry_backoff).await;
                    continue;
                }
            };

            let signed = match self.build_transaction(task, *seq, gas_price) {
                Ok(signed) => signed,
                Err(e) => {
                    error!(seq = *seq, "[qc-15] Failed to build transaction: {}", e);
                    return TransactionTaskResult::failed(e.to_string());
                }
            };

            let outcome = self.ledger.apply_transaction(&signed).await;
            if outcome.is_landed() {
                *seq += 1;
                if outcome == LedgerResultCode::Success {
                    self.broadcast(&signed).await;
                    info!(hash = %signed.hash, nonce = signed.transaction.nonce, attempt, "[qc-15] Transaction applied");
                } else {
                    info!(hash = %signed.hash, "[qc-15] Transaction already exists");
                }
                return TransactionTaskResult::succeeded(signed.hash);
            }

            match outcome {
                LedgerResultCode::Success | LedgerResultCode::AlreadyExists => {}
                LedgerResultCode::BadSequence => {
                    debug!(nonce = *seq, attempt, "[qc-15] Sequence conflict, advancing");
                    *seq += 1;
                    last_error = "bad sequence".into();
                }
                LedgerResultCode::Failed { code, desc } => {
                    warn!(nonce = *seq, attempt, code, "[qc-15] Transaction rejected: {}", desc);
                    last_error = format!("code {}: {}", code, desc);
                    sleep(self.config.retry_backoff).await;
                }
            }
        }

        error!(
            attempts = self.config.max_attempts,
            "[qc-15] Transaction failed after all attempts: {}", last_error
        );
        TransactionTaskResult::failed(format!(
            "failed after {} attempts: {}",
            self.config.max_attempts, last_error
        ))
    }

    /// Build and sign the transaction for `task` with nonce `seq`.
    pub fn build_transaction(
        &self,
        task: &TransactionTask,
        seq: i64,
        gas_price: i64,
    ) -> Result<SignedTransaction, RelayError> {
        let operations = task
            .input_parameters
            .iter()
            .enumerate()
            .map(|(i, input)| Operation::PayCoin {
                dest_address: task.destination_address.clone(),
                amount: if i == 0 { task.amount } else { 0 },
                input: input.clone(),
            })
            .collect();

        let mut transaction = Transaction {
            source_address: self.signer.address().to_string(),
            nonce: seq,
            gas_price,
            fee_limit: 0,
            chain_id: self.chain_id,
            metadata: task.memo.clone(),
            operations,
        };

        let size = bincode::serialized_size(&transaction)? as i64;
        transaction.fee_limit = evaluate_fee(
            gas_price,
            size,
            self.config.signature_overhead,
            self.config.fee_multiplier,
        )?;

        let body = bincode::serialize(&transaction)?;
        let signature = self.signer.sign(&body);
        Ok(SignedTransaction {
            hash: hash_hex(&body),
            transaction,
            signatures: vec![signature],
        })
    }

    async fn broadcast(&self, signed: &SignedTransaction) {
        let payload = match bincode::serialize(signed) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(hash = %signed.hash, "[qc-15] Cannot encode transaction for broadcast: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .network
            .broadcast(BroadcastKind::Transaction, payload)
            .await
        {
            warn!(hash = %signed.hash, "[qc-15] Broadcast failed: {}", e);
        }
    }
}

impl TransactionQueue for TransactionSubmitter {
    fn async_send_transaction(
        &self,
        handler: Arc<dyn TransactionResultHandler>,
        task: TransactionTask,
    ) -> Result<(), RelayError> {
        if !self.is_enabled() {
            return Err(RelayError::NotRunning(COMPONENT));
        }
        task.validate()?;

        let caller = handler.caller_id().to_string();
        self.pending
            .lock()
            .entry(caller)
            .or_insert_with(|| (handler, Vec::new()))
            .1
            .push(task);
        Ok(())
    }
}
