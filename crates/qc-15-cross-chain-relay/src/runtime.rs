//! # Relay Runtime
//!
//! Wires the relay components to their ports and drives their lifecycle.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Load the signing identity (fails on an invalid key)
//! 3. Build submitter → router → buffer
//! 4. `start()` the submitter, then the buffer
//!
//! Shutdown runs in reverse: the buffer stops delivering blocks before the
//! submitter stops sending.

use crate::config::RelayConfig;
use crate::domain::{LedgerBlock, RelayError};
use crate::ports::{LedgerGateway, MessageChannel, NetworkBroadcaster, ProposerNotifier};
use crate::service::{BlockBuffer, BlockEventRouter, TransactionSubmitter};
use std::sync::Arc;
use tracing::info;

/// The assembled cross-chain relay.
pub struct RelayRuntime {
    config: RelayConfig,
    submitter: Arc<TransactionSubmitter>,
    router: Arc<BlockEventRouter>,
    buffer: Arc<BlockBuffer>,
}

impl RelayRuntime {
    /// Build every component. Nothing runs until [`RelayRuntime::start`].
    pub fn new(
        config: RelayConfig,
        ledger: Arc<dyn LedgerGateway>,
        network: Arc<dyn NetworkBroadcaster>,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self, RelayError> {
        config.validate()?;

        let submitter = Arc::new(TransactionSubmitter::new(&config, ledger, network)?);
        let router = Arc::new(BlockEventRouter::new(
            &config,
            submitter.address(),
            channel,
            submitter.clone(),
        ));
        let buffer = Arc::new(BlockBuffer::new(
            config.buffer.clone(),
            config.self_chain_id,
            router.clone(),
        ));

        info!(
            chain_id = config.self_chain_id,
            main_chain = config.is_main_chain(),
            address = %submitter.address(),
            "[qc-15] Cross-chain relay initialized"
        );

        Ok(Self {
            config,
            submitter,
            router,
            buffer,
        })
    }

    /// Register a proposer to be told the results of its transactions.
    pub fn add_proposer(&self, proposer: Arc<dyn ProposerNotifier>) {
        self.router.add_proposer(proposer);
    }

    /// Start the submitter and the block buffer.
    pub fn start(&self) -> Result<(), RelayError> {
        self.submitter.start()?;
        self.buffer.start()?;
        info!("[qc-15] Cross-chain relay started");
        Ok(())
    }

    /// Feed a closed ledger to the relay.
    pub fn handle_block(&self, block: Arc<LedgerBlock>) -> bool {
        self.buffer.handle_block(block)
    }

    /// Stop both background loops and wait for them.
    pub async fn shutdown(&self) {
        info!("[qc-15] Shutting down cross-chain relay");
        self.buffer.exit().await;
        self.submitter.exit().await;
    }

    /// Active configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Transaction submitter.
    pub fn submitter(&self) -> &Arc<TransactionSubmitter> {
        &self.submitter
    }

    /// Block event router.
    pub fn router(&self) -> &Arc<BlockEventRouter> {
        &self.router
    }

    /// Block buffer.
    pub fn buffer(&self) -> &Arc<BlockBuffer> {
        &self.buffer
    }
}
