//! # Fee Evaluation
//!
//! `fee = gas_price * (serialized_size + signature_overhead) * multiplier`,
//! every step overflow-checked.

use crate::domain::RelayError;

/// Bytes reserved for the signature that is not yet attached when the
/// transaction size is measured.
pub const SIGNATURE_OVERHEAD_BYTES: i64 = 300;

/// Safety multiplier applied to the estimated fee.
pub const FEE_MULTIPLIER: i64 = 5;

/// Evaluate the fee limit for a transaction of `serialized_size` bytes.
pub fn evaluate_fee(
    gas_price: i64,
    serialized_size: i64,
    signature_overhead: i64,
    multiplier: i64,
) -> Result<i64, RelayError> {
    let overflow = || RelayError::FeeOverflow {
        gas_price,
        size: serialized_size.saturating_add(signature_overhead),
    };

    serialized_size
        .checked_add(signature_overhead)
        .and_then(|size| gas_price.checked_mul(size))
        .and_then(|fee| fee.checked_mul(multiplier))
        .ok_or_else(overflow)
}
