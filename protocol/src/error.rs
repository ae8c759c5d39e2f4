//! Error taxonomy shared by the vault, the factory and the wrapped asset.
//!
//! Every variant is a precondition failure detected before any state
//! changes, or a failure from a collaborator (ledger, transport, codec)
//! that causes the whole call to be rolled back. Nothing is retried here.

use std::fmt;

use thiserror::Error;

use crate::adapter::AdapterError;
use crate::codec::CodecError;
use crate::guard::Reentered;
use crate::ledger::LedgerError;
use crate::types::{Address, ChainId};

/// Why a counterpart lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotRegisteredReason {
    /// Nothing is bound for this (adapter, chain) pair.
    UnknownAdapter {
        /// Adapter that was looked up.
        adapter: Address,
        /// Chain that was looked up.
        chain_id: ChainId,
    },
    /// A counterpart is bound, but the message came from someone else.
    WrongCounterpart {
        /// The bound counterpart.
        expected: Address,
        /// The claimed source sender.
        got: Address,
    },
}

impl fmt::Display for NotRegisteredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotRegisteredReason::UnknownAdapter { adapter, chain_id } => {
                write!(f, "no counterpart bound for adapter {} on chain {}", adapter, chain_id)
            }
            NotRegisteredReason::WrongCounterpart { expected, got } => {
                write!(f, "sender {} is not the bound counterpart {}", got, expected)
            }
        }
    }
}

/// Errors returned by bridge entry points.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required address (recipient, counterpart) is empty.
    #[error("zero address")]
    ZeroAddress,

    /// A required amount is zero.
    #[error("zero amount")]
    ZeroAmount,

    /// The (adapter, chain) slot is already taken. Registrations are final.
    #[error("adapter {adapter} already registered a counterpart on chain {chain_id}")]
    AlreadyRegistered {
        /// The registering adapter.
        adapter: Address,
        /// The chain it registered for.
        chain_id: ChainId,
    },

    /// No matching registration for an inbound or outbound message.
    #[error("not registered: {0}")]
    NotRegistered(NotRegisteredReason),

    /// The address is not a wrapped asset created by this factory.
    #[error("invalid asset: {0}")]
    InvalidAsset(Address),

    /// Name and symbol have already been set.
    #[error("wrapped asset {0} already initialized")]
    AlreadyInitialized(Address),

    /// The caller may not perform this operation.
    #[error("unauthorized caller {0}")]
    Unauthorized(Address),

    /// The contract is already executing a call.
    #[error("reentrant call rejected")]
    Reentrancy,

    /// The payload does not decode.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] CodecError),

    /// The asset ledger refused an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The transport refused a message.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl From<Reentered> for BridgeError {
    fn from(_: Reentered) -> Self {
        BridgeError::Reentrancy
    }
}

impl BridgeError {
    /// Shorthand for an unknown (adapter, chain) pair.
    pub fn unknown_adapter(adapter: Address, chain_id: ChainId) -> Self {
        BridgeError::NotRegistered(NotRegisteredReason::UnknownAdapter { adapter, chain_id })
    }

    /// Shorthand for a message from the wrong counterpart.
    pub fn wrong_counterpart(expected: Address, got: Address) -> Self {
        BridgeError::NotRegistered(NotRegisteredReason::WrongCounterpart { expected, got })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_reasons_are_distinguishable() {
        let a = BridgeError::unknown_adapter(Address::new([1; 20]), ChainId(5));
        let b = BridgeError::wrong_counterpart(Address::new([1; 20]), Address::new([2; 20]));
        assert!(matches!(
            a,
            BridgeError::NotRegistered(NotRegisteredReason::UnknownAdapter { .. })
        ));
        assert!(matches!(
            b,
            BridgeError::NotRegistered(NotRegisteredReason::WrongCounterpart { .. })
        ));
        assert!(a.to_string().contains("chain 5"));
    }

    #[test]
    fn reentered_converts() {
        assert!(matches!(BridgeError::from(Reentered), BridgeError::Reentrancy));
    }

    #[test]
    fn ledger_errors_pass_through() {
        let e: BridgeError = LedgerError::ZeroAddress.into();
        assert_eq!(e.to_string(), "zero address");
    }
}
