//! # Counterpart Registry
//!
//! The write-once binding `(adapter, chain_id) → counterpart` that both the
//! vault (counterpart = factory) and the factory (counterpart = vault)
//! keep. There is exactly one way in, [`Registry::register`], and it only
//! inserts into an empty slot. There is no update and no removal.
//!
//! The key's adapter half is the address proven by the registering call's
//! [`Origin`], and the handle stored with it must report that same address.
//! An adapter can only ever fill its own slots, and nothing can fill them
//! on its behalf.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hubbridge_protocol::adapter::Adapter;
use hubbridge_protocol::{Address, BridgeError, ChainId, LedgerId, Origin};

/// The caller `origin` proves, provided it was minted on `ledger_id` for a
/// call to `contract`.
///
/// # Errors
///
/// [`BridgeError::Unauthorized`] naming the origin's sender otherwise.
pub fn caller_of(origin: &Origin, ledger_id: LedgerId, contract: Address) -> Result<Address, BridgeError> {
    origin
        .sender_for(ledger_id, contract)
        .ok_or(BridgeError::Unauthorized(origin.sender()))
}

/// One binding.
#[derive(Clone)]
pub struct Registration {
    /// The contract on the other side.
    pub counterpart: Address,
    /// Handle used to send to it.
    pub adapter: Arc<dyn Adapter>,
    /// When the binding was made.
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("counterpart", &self.counterpart)
            .field("adapter", &self.adapter.address())
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Insert-only map of registrations, owned by one contract.
#[derive(Debug)]
pub struct Registry {
    ledger_id: LedgerId,
    chain_id: ChainId,
    owner: Address,
    bindings: HashMap<(Address, ChainId), Registration>,
}

impl Registry {
    /// An empty registry for the contract at `owner` on the ledger
    /// `ledger_id` of chain `chain_id`.
    pub fn new(ledger_id: LedgerId, chain_id: ChainId, owner: Address) -> Self {
        Self {
            ledger_id,
            chain_id,
            owner,
            bindings: HashMap::new(),
        }
    }

    /// Binds `counterpart` for `(adapter.address(), chain_id)`.
    ///
    /// `origin` must come from the adapter's own account, addressed to the
    /// owning contract, and `adapter` must live on the owner's chain and
    /// report the address the origin proves.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unauthorized`] when the origin does not vouch for
    /// `adapter`; [`BridgeError::ZeroAddress`] for an empty counterpart;
    /// [`BridgeError::AlreadyRegistered`] if the slot is taken, whatever
    /// the new value.
    pub fn register(
        &mut self,
        origin: Origin,
        adapter: Arc<dyn Adapter>,
        chain_id: ChainId,
        counterpart: Address,
    ) -> Result<(), BridgeError> {
        let caller = caller_of(&origin, self.ledger_id, self.owner)?;
        if adapter.address() != caller || adapter.chain_id() != self.chain_id {
            tracing::warn!(
                caller = %caller,
                claimed = %adapter.address(),
                "registration refused: adapter handle does not match caller"
            );
            return Err(BridgeError::Unauthorized(caller));
        }
        if counterpart.is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        let key = (caller, chain_id);
        if self.bindings.contains_key(&key) {
            return Err(BridgeError::AlreadyRegistered {
                adapter: caller,
                chain_id,
            });
        }
        self.bindings.insert(
            key,
            Registration {
                counterpart,
                adapter,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// The binding for `(adapter, chain_id)`, if any.
    pub fn get(&self, adapter: &Address, chain_id: ChainId) -> Option<&Registration> {
        self.bindings.get(&(*adapter, chain_id))
    }

    /// The counterpart for `(adapter, chain_id)`, if any.
    pub fn counterpart(&self, adapter: &Address, chain_id: ChainId) -> Option<Address> {
        self.get(adapter, chain_id).map(|r| r.counterpart)
    }

    /// Outbound lookup: the binding to send through, or
    /// `NotRegistered(UnknownAdapter)`.
    pub fn route(&self, adapter: &Address, chain_id: ChainId) -> Result<Registration, BridgeError> {
        self.get(adapter, chain_id)
            .cloned()
            .ok_or_else(|| BridgeError::unknown_adapter(*adapter, chain_id))
    }

    /// Inbound check: the adapter `origin` proves must have a binding for
    /// `src_chain_id`, and `src_sender` must be exactly that counterpart.
    /// Returns the adapter's address.
    pub fn authenticate(
        &self,
        origin: &Origin,
        src_chain_id: ChainId,
        src_sender: &Address,
    ) -> Result<Address, BridgeError> {
        let caller = caller_of(origin, self.ledger_id, self.owner)?;
        let expected = self
            .counterpart(&caller, src_chain_id)
            .ok_or_else(|| BridgeError::unknown_adapter(caller, src_chain_id))?;
        if expected != *src_sender {
            return Err(BridgeError::wrong_counterpart(expected, *src_sender));
        }
        Ok(caller)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
