//! # Cross-Chain Payloads
//!
//! Exactly two messages ever cross the bridge:
//!
//! | direction | payload | fields (wire order) |
//! |---|---|---|
//! | remote → hub | [`LockPayload`] | remote asset, recipient, amount, name, symbol |
//! | hub → remote | [`UnlockPayload`] | remote asset, recipient, amount |
//!
//! Field order is part of the wire contract. The encoding is `bincode` with
//! fixed-width little-endian integers: addresses are 20 raw bytes, amounts
//! a 32-byte big-endian word, strings a `u64` length followed by UTF-8.
//! Decoding rejects trailing bytes, so a payload has exactly one encoding.
//!
//! [`LockPayload::new`] cuts names and symbols down to
//! [`MAX_ASSET_NAME_BYTES`] and [`MAX_ASSET_SYMBOL_BYTES`], which keeps every
//! payload it builds well under [`MAX_PAYLOAD_SIZE`].

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{MAX_ASSET_NAME_BYTES, MAX_ASSET_SYMBOL_BYTES};
use crate::types::{Address, Amount};

/// Upper bound on an encoded payload, in either direction.
pub const MAX_PAYLOAD_SIZE: u64 = 4 * 1024;

/// Errors raised while encoding or decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes do not decode to the expected payload.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The payload could not be encoded (too large).
    #[error("payload encoding failed: {0}")]
    Encode(String),
}

/// Instruction from the vault: mint `amount` of the wrapped form of
/// `remote_asset` to `recipient`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPayload {
    /// Address of the locked asset on the remote chain.
    pub remote_asset: Address,
    /// Who receives the wrapped asset on the hub.
    pub recipient: Address,
    /// Amount actually credited to the vault.
    #[serde(with = "amount_word")]
    pub amount: Amount,
    /// Display name of the remote asset.
    pub asset_name: String,
    /// Ticker of the remote asset.
    pub asset_symbol: String,
}

/// Instruction from the factory: release `amount` of `remote_asset` from
/// custody to `recipient`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockPayload {
    /// Address of the custodied asset on the remote chain.
    pub remote_asset: Address,
    /// Who receives the released asset.
    pub recipient: Address,
    /// Amount burned on the hub.
    #[serde(with = "amount_word")]
    pub amount: Amount,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PAYLOAD_SIZE)
        .reject_trailing_bytes()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    options()
        .serialize(value)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CodecError> {
    options()
        .deserialize(bytes)
        .map_err(|e| CodecError::Malformed(e.to_string()))
}

impl LockPayload {
    /// A lock instruction for `amount` of `remote_asset`. `name` and
    /// `symbol` are truncated on a character boundary to the protocol
    /// limits; the wrapped asset carries the truncated forms.
    pub fn new(remote_asset: Address, recipient: Address, amount: Amount, name: &str, symbol: &str) -> Self {
        Self {
            remote_asset,
            recipient,
            amount,
            asset_name: truncate_utf8(name, MAX_ASSET_NAME_BYTES).to_owned(),
            asset_symbol: truncate_utf8(symbol, MAX_ASSET_SYMBOL_BYTES).to_owned(),
        }
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    /// Parses the wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }
}

impl UnlockPayload {
    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    /// Parses the wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }
}

fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Serializes a `U256` as a 32-byte big-endian word.
mod amount_word {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::{amount_to_be_bytes, Amount};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        amount_to_be_bytes(*amount).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let word = <[u8; 32]>::deserialize(deserializer)?;
        Ok(Amount::from_big_endian(&word))
    }
}
