//! # Algorithms Module
//!
//! Merkle audit proofs and fee evaluation.

pub mod fee;
pub mod merkle;

pub use fee::evaluate_fee;
pub use merkle::{hash_branches, hash_hex, AuditNode, BranchDirection, MerkleTree};
