//! # Transport Capabilities
//!
//! The bridge core never talks to a relay network directly. It sees two
//! narrow capabilities:
//!
//! - [`Adapter`] (outbound): `send` a payload to a contract on another
//!   chain (paying a fee), or `estimate_fee` for doing so. Contracts also
//!   `bind` themselves to an adapter to be reachable through it.
//! - [`MessageReceiver`] (inbound): implemented by the vault and the
//!   factory, invoked by an adapter when a message arrives or when the
//!   adapter registers a counterpart.
//!
//! ## Who vouches for what
//!
//! Every call across these traits carries an [`Origin`] instead of a bare
//! caller address:
//!
//! - `send` takes the sending contract's origin, targeted at the adapter.
//!   The adapter stamps `origin.sender()` as the message's source, so no
//!   contract can send in another's name.
//! - `receive_message` and `register_counterpart` take the adapter's
//!   origin, targeted at the receiving contract. Only the holder of the
//!   adapter's [`Account`](crate::account::Account) can produce one.
//! - `bind` takes the receiving contract's origin, so nobody can bind a
//!   stand-in at someone else's address and intercept its deliveries.
//!
//! Given that, the source chain and sender of a delivered message are
//! whatever the adapter's transport authenticated, and the core only
//! checks that the sender is the counterpart this adapter registered.
//!
//! Delivery is asynchronous, unordered, and may never happen. An adapter
//! may also deliver the same message twice; the core does not deduplicate.
//!
//! [`loopback`] is an in-process implementation for tests and embedders.

pub mod loopback;

use std::sync::{Arc, Weak};

use thiserror::Error;

use crate::account::Origin;
use crate::error::BridgeError;
use crate::events::MessageId;
use crate::ledger::LedgerError;
use crate::types::{Address, Amount, ChainId};

pub use loopback::{Envelope, LoopbackAdapter, LoopbackNetwork};

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The attached fee does not cover the quote.
    #[error("insufficient fee: required {required}, provided {provided}")]
    InsufficientFee {
        /// Quoted fee.
        required: Amount,
        /// Fee attached to the call.
        provided: Amount,
    },

    /// The chain already has an endpoint on this transport.
    #[error("endpoint for chain {0} already attached")]
    DuplicateEndpoint(ChainId),

    /// The transport has no endpoint on the destination chain.
    #[error("no route to chain {0}")]
    NoRoute(ChainId),

    /// The destination endpoint knows no contract at this address.
    #[error("no receiver {receiver} on chain {chain_id}")]
    UnknownReceiver {
        /// Destination chain.
        chain_id: ChainId,
        /// Destination contract.
        receiver: Address,
    },

    /// No pending (or, for redelivery, delivered) message has this id.
    #[error("unknown message {0}")]
    UnknownMessage(String),

    /// The receiving contract rejected the message. The message stays
    /// pending and may be delivered again later.
    #[error("message {message_id} rejected by receiver: {reason}")]
    Rejected {
        /// Hex id of the rejected message.
        message_id: String,
        /// What the receiver returned.
        reason: Box<BridgeError>,
    },

    /// The origin was issued for a different adapter, or by another ledger.
    #[error("origin of {sender} (chain {chain_id}) was issued for {target}, not this adapter")]
    ForeignOrigin {
        /// Who minted it.
        sender: Address,
        /// Whom it was meant for.
        target: Address,
        /// Where it was minted.
        chain_id: ChainId,
    },

    /// A receiver tried to bind at an address its caller does not own.
    #[error("receiver claims {claimed} but the binding call comes from {caller}")]
    ReceiverMismatch {
        /// Address the receiver reports.
        claimed: Address,
        /// Address the origin proves.
        caller: Address,
    },

    /// A live receiver is already bound at this address.
    #[error("receiver already bound at {0}")]
    AlreadyBound(Address),

    /// The adapter could not open its account on the host ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AdapterError {
    pub(crate) fn foreign(origin: &Origin) -> Self {
        Self::ForeignOrigin {
            sender: origin.sender(),
            target: origin.target(),
            chain_id: origin.chain_id(),
        }
    }
}

/// Outbound transport capability.
pub trait Adapter: Send + Sync {
    /// The adapter's address on its own chain. This is the identity the
    /// core registers counterparts under.
    fn address(&self) -> Address;

    /// The chain this adapter endpoint lives on.
    fn chain_id(&self) -> ChainId;

    /// Dispatches `payload` from `origin.sender()` to `receiver` on
    /// `dst_chain_id`. `origin` must be targeted at this adapter. Returns
    /// once the message is queued; delivery happens later.
    fn send(
        &self,
        origin: Origin,
        dst_chain_id: ChainId,
        receiver: Address,
        payload: Vec<u8>,
        fee: Amount,
    ) -> Result<MessageId, AdapterError>;

    /// The fee `send` would require for this exact message.
    fn estimate_fee(
        &self,
        dst_chain_id: ChainId,
        receiver: Address,
        payload: &[u8],
    ) -> Result<Amount, AdapterError>;

    /// Makes `receiver` reachable at `origin.sender()` through this
    /// adapter. The receiver must report that same address.
    fn bind(&self, origin: Origin, receiver: Weak<dyn MessageReceiver>) -> Result<(), AdapterError>;
}

/// Inbound capability implemented by the bridge contracts.
pub trait MessageReceiver: Send + Sync {
    /// The contract's own address.
    fn address(&self) -> Address;

    /// Handles a message delivered by the adapter at `origin.sender()`.
    fn receive_message(
        &self,
        origin: Origin,
        src_chain_id: ChainId,
        src_sender: Address,
        payload: &[u8],
    ) -> Result<(), BridgeError>;

    /// Records `counterpart` as the trusted contract on `chain_id` for the
    /// adapter at `origin.sender()`, which `adapter` must be.
    ///
    /// Receivers that keep no registry refuse.
    fn register_counterpart(
        &self,
        origin: Origin,
        adapter: Arc<dyn Adapter>,
        chain_id: ChainId,
        counterpart: Address,
    ) -> Result<(), BridgeError> {
        let _ = (adapter, chain_id, counterpart);
        Err(BridgeError::Unauthorized(origin.sender()))
    }
}
