//! # Block Buffer
//!
//! Decouples ledger-close notifications from event extraction.
//!
//! `handle_block` only appends to an incoming list. The background task
//! moves that list into a sequence-ordered map every `buffer_period` and
//! hands the map to the [`BlockEventHandler`] every `update_period`, lowest
//! sequence first. Blocks at or below the highest sequence already
//! delivered are dropped.

use crate::config::BufferConfig;
use crate::domain::{LedgerBlock, RelayError};
use crate::ports::BlockEventHandler;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "BlockBuffer";

/// Ordered, periodic delivery of closed ledgers.
pub struct BlockBuffer {
    config: BufferConfig,
    self_chain_id: i64,
    handler: Arc<dyn BlockEventHandler>,
    enabled: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    incoming: Mutex<Vec<Arc<LedgerBlock>>>,
    ordered: Mutex<BTreeMap<i64, Arc<LedgerBlock>>>,
    last_processed: Mutex<Option<i64>>,
}

impl BlockBuffer {
    /// Create a disabled buffer for blocks of `self_chain_id`.
    pub fn new(
        config: BufferConfig,
        self_chain_id: i64,
        handler: Arc<dyn BlockEventHandler>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            self_chain_id,
            handler,
            enabled: AtomicBool::new(false),
            shutdown_tx,
            handle: Mutex::new(None),
            incoming: Mutex::new(Vec::new()),
            ordered: Mutex::new(BTreeMap::new()),
            last_processed: Mutex::new(None),
        }
    }

    /// Whether blocks are being accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Blocks accepted but not yet delivered.
    pub fn pending_len(&self) -> usize {
        self.incoming.lock().len() + self.ordered.lock().len()
    }

    /// Queue a closed ledger. Returns `false` if the block was rejected.
    pub fn handle_block(&self, block: Arc<LedgerBlock>) -> bool {
        if !self.is_enabled() {
            debug!(seq = block.seq(), "[qc-15] Block ignored, buffer disabled");
            return false;
        }
        if block.chain_id() != self.self_chain_id {
            warn!(
                seq = block.seq(),
                chain_id = block.chain_id(),
                expected = self.self_chain_id,
                "[qc-15] Block from foreign chain rejected"
            );
            return false;
        }
        self.incoming.lock().push(block);
        true
    }

    /// Highest sequence number handed to the handler so far.
    pub fn last_processed_seq(&self) -> Option<i64> {
        *self.last_processed.lock()
    }

    /// Move incoming blocks into the ordered map. The first block seen for a
    /// sequence number is kept.
    pub fn drain_incoming(&self) -> usize {
        let incoming = std::mem::take(&mut *self.incoming.lock());
        if incoming.is_empty() {
            return 0;
        }

        let last_processed = self.last_processed_seq();
        let mut ordered = self.ordered.lock();
        let mut moved = 0;
        for block in incoming {
            let seq = block.seq();
            if last_processed.is_some_and(|last| seq <= last) {
                debug!(seq, last = ?last_processed, "[qc-15] Block already processed, ignored");
                continue;
            }
            if ordered.contains_key(&seq) {
                debug!(seq, "[qc-15] Duplicate block ignored");
                continue;
            }
            ordered.insert(seq, block);
            moved += 1;
        }
        moved
    }

    /// Deliver every ordered block to the handler, ascending by sequence.
    pub async fn process_pending(&self) -> usize {
        let blocks = std::mem::take(&mut *self.ordered.lock());
        let count = blocks.len();
        for (seq, block) in blocks {
            debug!(seq, txs = block.transactions.len(), "[qc-15] Processing block");
            self.handler.handle_block(&block).await;
            *self.last_processed.lock() = Some(seq);
        }
        count
    }

    /// Spawn the buffer loop. Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), RelayError> {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return Err(RelayError::AlreadyRunning(COMPONENT));
        }
        self.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shutdown_tx.subscribe();

        let this = Arc::clone(self);
        *self.handle.lock() = Some(tokio::spawn(this.run(shutdown_rx)));

        info!(
            chain_id = self.self_chain_id,
            "[qc-15] Block buffer started"
        );
        Ok(())
    }

    /// Stop accepting blocks and wait for the loop to exit. No block is
    /// processed after this returns.
    pub async fn exit(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("[qc-15] Block buffer task failed: {}", e);
            }
        }
        info!("[qc-15] Block buffer stopped");
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut last_drain = Instant::now();
        let mut last_update = Instant::now();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = sleep(self.config.poll_interval) => {}
            }
            if *shutdown_rx.borrow() || !self.is_enabled() {
                break;
            }

            if last_drain.elapsed() >= self.config.buffer_period {
                self.drain_incoming();
                last_drain = Instant::now();
            }
            if last_update.elapsed() >= self.config.update_period {
                self.process_pending().await;
                last_update = Instant::now();
            }
        }
        debug!("[qc-15] Block buffer loop exited");
    }
}
