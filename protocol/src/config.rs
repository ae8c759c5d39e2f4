//! # Protocol Configuration & Constants
//!
//! Every constant that feeds a hash or a wire format lives here. Changing
//! one after assets have been bridged moves every predicted address, so
//! treat this file as append-only once a deployment exists.
//!
//! The only runtime-tunable piece is the loopback transport's
//! [`FeeSchedule`], which can be loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Amount;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Address length in bytes. Matches the account-based ledgers we bridge.
pub const ADDRESS_LENGTH: usize = 20;

/// Decimals given to every wrapped asset.
pub const WRAPPED_ASSET_DECIMALS: u8 = 18;

/// Denominator for transfer fees expressed in basis points.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Longest asset name, in UTF-8 bytes, carried by a lock payload.
pub const MAX_ASSET_NAME_BYTES: usize = 128;

/// Longest asset symbol, in UTF-8 bytes, carried by a lock payload.
pub const MAX_ASSET_SYMBOL_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Hash Domains
// ---------------------------------------------------------------------------

/// BLAKE3 derive-key context for identity keys.
pub const IDENTITY_KEY_DOMAIN: &str = "hubbridge 2026 identity key v1";

/// BLAKE3 derive-key context for constructor-argument encoding.
pub const INIT_CODE_DOMAIN: &str = "hubbridge 2026 init code v1";

/// Prefix byte for deterministic deployment addresses.
pub const CREATE2_PREFIX: u8 = 0xff;

/// Stand-in for the wrapped-asset creation code. Any change to the wrapped
/// asset's behavior that should yield new addresses bumps this tag.
pub const WRAPPED_ASSET_CREATION_CODE: &[u8] = b"hubbridge/wrapped-asset/v1";

/// Domain tag for loopback message ids (SHA-256, transport side).
pub const MESSAGE_ID_DOMAIN: &[u8] = b"hubbridge/loopback/message-id/v1";

// ---------------------------------------------------------------------------
// Transport Fees
// ---------------------------------------------------------------------------

/// Default flat fee per message for the loopback transport.
pub const DEFAULT_BASE_FEE: u64 = 1_000;

/// Default per-byte fee for the loopback transport.
pub const DEFAULT_FEE_PER_BYTE: u64 = 10;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was being read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fee schedule for a transport: `base_fee + fee_per_byte * payload_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Flat fee charged per message.
    pub base_fee: u64,
    /// Fee charged per payload byte.
    pub fee_per_byte: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_fee: DEFAULT_BASE_FEE,
            fee_per_byte: DEFAULT_FEE_PER_BYTE,
        }
    }
}

impl FeeSchedule {
    /// A schedule that charges nothing. Handy in tests.
    pub fn free() -> Self {
        Self {
            base_fee: 0,
            fee_per_byte: 0,
        }
    }

    /// Quote for a payload of `payload_len` bytes.
    pub fn quote(&self, payload_len: usize) -> Amount {
        Amount::from(self.base_fee) + Amount::from(self.fee_per_byte) * Amount::from(payload_len)
    }

    /// Parses a schedule from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let schedule: FeeSchedule = serde_json::from_str(json)?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Reads and parses a schedule from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Rejects a per-byte fee above [`MAX_FEE_PER_BYTE`]. In practice this
    /// only catches typos with a few extra zeros.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_per_byte > MAX_FEE_PER_BYTE {
            return Err(ConfigError::Invalid(format!(
                "fee_per_byte {} exceeds maximum {}",
                self.fee_per_byte, MAX_FEE_PER_BYTE
            )));
        }
        Ok(())
    }
}

/// Upper bound accepted for [`FeeSchedule::fee_per_byte`].
pub const MAX_FEE_PER_BYTE: u64 = 1_000_000;
