//! # Domain Module
//!
//! Core domain types for the cross-chain relay.

pub mod errors;
pub mod ledger;
pub mod messages;
pub mod tasks;

pub use errors::*;
pub use ledger::*;
pub use messages::*;
pub use tasks::*;
