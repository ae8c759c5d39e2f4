// Copyright (c) 2026 HubBridge Contributors. MIT License.
// See LICENSE for details.

//! # HubBridge Protocol: Host-Ledger Primitives
//!
//! Everything the bridge contracts need from the ledgers they live on,
//! and nothing they don't. The contracts themselves (vault, factory,
//! wrapped asset) live in `hubbridge-contracts`; this crate supplies the
//! ground they stand on.
//!
//! ## Architecture
//!
//! - **types**: `Address`, `ChainId`, `Amount`. The nouns.
//! - **account**: Unforgeable per-address authority and per-call origins.
//! - **crypto**: Hashing. BLAKE3 for derivations, SHA-256 for transport ids.
//! - **identity**: Identity keys and deterministic wrapped-asset addresses.
//! - **codec**: The two cross-chain payloads and their wire encoding.
//! - **ledger**: A per-chain fungible-asset ledger with transactions.
//! - **adapter**: Transport capability traits plus an in-process loopback.
//! - **error**: The `BridgeError` taxonomy every contract returns.
//! - **events**: Append-only audit log shared by every contract.
//! - **guard**: The non-reentrant marker.
//! - **config**: Protocol constants and transport fee schedules.
//! - **logging**: `tracing` subscriber bootstrap.
//!
//! ## Design Philosophy
//!
//! 1. Messages cross chains; state never does.
//! 2. Anything derived (identity keys, addresses, message ids) is a pure
//!    function of its inputs. Call order never matters.
//! 3. Money is `U256` and every addition is checked.
//! 4. A caller is an `Origin`, never an address someone typed in.

pub mod account;
pub mod adapter;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod guard;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod types;

pub use account::{Account, LedgerId, Origin};
pub use error::BridgeError;
pub use types::{Address, Amount, ChainId};
