//! # Service Layer
//!
//! Long-lived relay components: the block buffer, the event router and the
//! transaction submitter.

mod block_buffer;
mod event_router;
mod submitter;

pub use block_buffer::BlockBuffer;
pub use event_router::{BlockEventRouter, SpvResultHandler, SPV_CALLER_ID};
pub use submitter::TransactionSubmitter;
