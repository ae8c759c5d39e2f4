//! # HubBridge Contracts
//!
//! The bridge itself. Two contracts that never share state, only
//! messages:
//!
//! - **Vault**: on each remote chain. Takes custody on `lock`, sends a
//!   mint instruction, releases custody when an unlock instruction from
//!   its registered factory arrives.
//! - **Factory**: on the hub. Creates one wrapped asset per
//!   `(remote chain, remote asset, adapter)` on first contact, mints on
//!   lock instructions, burns on `bridge_back` and sends the unlock
//!   instruction home.
//! - **WrappedAsset**: the hub-side token the factory deploys and alone
//!   may mint or burn.
//! - **Registry**: the write-once `(adapter, chain) → counterpart` map
//!   both contracts authenticate inbound messages against.
//!
//! ## Design Principles
//!
//! 1. Registration is final. There is no update path, no admin, no pause.
//! 2. Every entry point validates first, then mutates inside a ledger
//!    transaction; a failed call leaves no trace.
//! 3. Every entry point is non-reentrant, and no contract lock is held
//!    across a call into an asset or an adapter.
//! 4. Callers are proven, never claimed. Users, adapters and contracts all
//!    arrive with an [`Origin`](hubbridge_protocol::Origin) from their own
//!    account; an adapter's delivery is trusted only if its sender is the
//!    counterpart that same adapter registered.

pub mod factory;
pub mod registry;
pub mod vault;
pub mod wrapped_asset;

pub use factory::Factory;
pub use hubbridge_protocol::BridgeError;
pub use registry::{Registration, Registry};
pub use vault::{LockRequest, Vault};
pub use wrapped_asset::WrappedAsset;
