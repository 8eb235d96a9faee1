//! Relay configuration.
//!
//! Plain defaults overridable from the environment, validated before the
//! runtime starts.

use crate::algorithms::fee::{FEE_MULTIPLIER, SIGNATURE_OVERHEAD_BYTES};
use crate::domain::{LogBounds, RelayError, MAIN_CHAIN_ID};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Reserved address of the chain-management contract on the main chain.
pub const DEFAULT_CMC_ADDRESS: &str = "0x000000000000000000000000000000000000c0c1";

/// Reserved address of the chain-proof contract on child chains.
pub const DEFAULT_CPC_ADDRESS: &str = "0x000000000000000000000000000000000000c0c2";

/// Maximum send attempts per transaction task.
pub const MAX_SEND_TRANSACTION_TIMES: u32 = 50;

/// Complete relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Chain this node belongs to (`0` = main chain).
    pub self_chain_id: i64,
    /// Hex Ed25519 seed of the relay identity.
    pub private_key: Option<String>,
    /// Chain-management contract address.
    pub cmc_address: String,
    /// Chain-proof contract address.
    pub cpc_address: String,
    /// Log size limits.
    pub log_bounds: LogBounds,
    /// Block buffer timing.
    pub buffer: BufferConfig,
    /// Transaction submitter tuning.
    pub submitter: SubmitterConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            self_chain_id: MAIN_CHAIN_ID,
            private_key: None,
            cmc_address: DEFAULT_CMC_ADDRESS.to_string(),
            cpc_address: DEFAULT_CPC_ADDRESS.to_string(),
            log_bounds: LogBounds::default(),
            buffer: BufferConfig::default(),
            submitter: SubmitterConfig::default(),
        }
    }
}

impl RelayConfig {
    /// True when this node runs the main chain.
    pub fn is_main_chain(&self) -> bool {
        self.self_chain_id == MAIN_CHAIN_ID
    }

    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_RELAY_CHAIN_ID`: own chain id (default: 0)
    /// - `QC_RELAY_PRIVATE_KEY`: hex Ed25519 seed
    /// - `QC_RELAY_CMC_ADDRESS` / `QC_RELAY_CPC_ADDRESS`: reserved contracts
    /// - `QC_RELAY_BUFFER_MS` / `QC_RELAY_UPDATE_MS`: block buffer periods
    /// - `QC_RELAY_SEND_INTERVAL_MS`: submitter send cycle
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(chain_id) = parse_env::<i64>("QC_RELAY_CHAIN_ID") {
            config.self_chain_id = chain_id;
        }
        if let Ok(key) = env::var("QC_RELAY_PRIVATE_KEY") {
            config.private_key = Some(key);
        }
        if let Ok(address) = env::var("QC_RELAY_CMC_ADDRESS") {
            config.cmc_address = address;
        }
        if let Ok(address) = env::var("QC_RELAY_CPC_ADDRESS") {
            config.cpc_address = address;
        }
        if let Some(ms) = parse_env::<u64>("QC_RELAY_BUFFER_MS") {
            config.buffer.buffer_period = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("QC_RELAY_UPDATE_MS") {
            config.buffer.update_period = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("QC_RELAY_SEND_INTERVAL_MS") {
            config.submitter.send_interval = Duration::from_millis(ms);
        }

        config
    }

    /// Reject settings the components cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.cmc_address.is_empty() || self.cpc_address.is_empty() {
            return Err(RelayError::InvalidConfig(
                "reserved contract addresses must be set".into(),
            ));
        }
        if self.log_bounds.topic_max == 0 || self.log_bounds.data_max == 0 {
            return Err(RelayError::InvalidConfig("log bounds must be positive".into()));
        }
        self.buffer.validate()?;
        self.submitter.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[qc-15] Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

/// Block buffer timing.
#[derive(Clone, Debug)]
pub struct BufferConfig {
    /// How often incoming blocks are drained into the ordered map.
    pub buffer_period: Duration,
    /// How often the ordered map is handed to event extraction.
    pub update_period: Duration,
    /// Loop quantum.
    pub poll_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_period: Duration::from_secs(1),
            update_period: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl BufferConfig {
    fn validate(&self) -> Result<(), RelayError> {
        if self.buffer_period.is_zero()
            || self.update_period.is_zero()
            || self.poll_interval.is_zero()
        {
            return Err(RelayError::InvalidConfig(
                "block buffer periods must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Transaction submitter tuning.
#[derive(Clone, Debug)]
pub struct SubmitterConfig {
    /// Interval between send cycles.
    pub send_interval: Duration,
    /// Loop quantum.
    pub poll_interval: Duration,
    /// Delay after a non-sequence failure.
    pub retry_backoff: Duration,
    /// Attempts per task.
    pub max_attempts: u32,
    /// Signature bytes added to the measured size.
    pub signature_overhead: i64,
    /// Fee safety multiplier.
    pub fee_multiplier: i64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            retry_backoff: Duration::from_millis(10),
            max_attempts: MAX_SEND_TRANSACTION_TIMES,
            signature_overhead: SIGNATURE_OVERHEAD_BYTES,
            fee_multiplier: FEE_MULTIPLIER,
        }
    }
}

impl SubmitterConfig {
    fn validate(&self) -> Result<(), RelayError> {
        if self.max_attempts == 0 {
            return Err(RelayError::InvalidConfig("max_attempts must be positive".into()));
        }
        if self.send_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(RelayError::InvalidConfig(
                "submitter intervals must be non-zero".into(),
            ));
        }
        if self.signature_overhead < 0 || self.fee_multiplier <= 0 {
            return Err(RelayError::InvalidConfig("invalid fee parameters".into()));
        }
        Ok(())
    }
}
