//! In-Memory Message Channel
//!
//! Implements `MessageChannel` over `tokio::sync::broadcast`. Proposers and
//! other consumers subscribe and filter by target chain themselves.

use crate::domain::{CrossChainMessage, MessageKind, RelayError};
use crate::ports::outbound::MessageChannel;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Messages buffered per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Broadcast-backed message channel.
pub struct BroadcastMessageChannel {
    sender: broadcast::Sender<CrossChainMessage>,
    published: AtomicU64,
}

impl BroadcastMessageChannel {
    /// Create a channel with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a channel with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Receive every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CrossChainMessage> {
        self.sender.subscribe()
    }

    /// Total messages accepted.
    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastMessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for BroadcastMessageChannel {
    async fn publish(&self, message: CrossChainMessage) -> Result<(), RelayError> {
        if message.kind == MessageKind::None {
            return Err(RelayError::Channel("message kind none".into()));
        }

        let target = message.target_chain_id;
        let kind = message.kind;
        self.published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(target_chain = target, kind = ?kind, receivers, "[qc-15] Message published");
            }
            Err(_) => {
                warn!(target_chain = target, kind = ?kind, "[qc-15] Message dropped (no receivers)");
            }
        }
        Ok(())
    }
}
