//! # Adapters Layer (Hexagonal Architecture)
//!
//! Concrete signing identity and in-memory message transport.

mod message_channel;
mod signer;

pub use message_channel::{BroadcastMessageChannel, DEFAULT_CHANNEL_CAPACITY};
pub use signer::{address_from_public_key, verify_signature, TransactionSigner};
