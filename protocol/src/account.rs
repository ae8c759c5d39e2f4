//! # Accounts and Call Origins
//!
//! Nothing in the bridge trusts an address it was merely told. Whoever
//! calls an entry point that cares about its caller (a ledger write, an
//! adapter `send`, a contract's `lock`, an inbound delivery) presents an
//! [`Origin`] instead.
//!
//! - An [`Account`] is the authority over one address on one ledger. The
//!   host [`Ledger`](crate::ledger::Ledger) opens it, once per address, and
//!   there is no other way to build one.
//! - An [`Origin`] is what an account hands to the party it calls: "this
//!   call comes from `sender` on ledger `ledger_id` and is meant for
//!   `target`". It is consumed by the call and cannot be copied,
//!   redirected, or built from parts.
//!
//! Origins are checked against a [`LedgerId`], not a [`ChainId`]: a second
//! ledger created with the same chain id issues its own accounts, and
//! nothing it issues is accepted by the first.
//!
//! A contract keeps its own `Account` private and mints a fresh `Origin`
//! for every outgoing call. The callee learns who is calling and nothing
//! that would let it call anyone else in that name.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{Address, ChainId};

/// Identity of one ledger instance, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LedgerId(u64);

impl LedgerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LedgerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ledger#{}", self.0)
    }
}

/// Authority over `address` on one ledger.
#[derive(Debug)]
pub struct Account {
    ledger_id: LedgerId,
    chain_id: ChainId,
    address: Address,
}

impl Account {
    pub(crate) fn new(ledger_id: LedgerId, chain_id: ChainId, address: Address) -> Self {
        Self {
            ledger_id,
            chain_id,
            address,
        }
    }

    /// The address this account speaks for.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The chain the account lives on.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The ledger that issued the account.
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    /// Proof of origin for one call from this account to `target`.
    pub fn origin(&self, target: Address) -> Origin {
        Origin {
            ledger_id: self.ledger_id,
            chain_id: self.chain_id,
            sender: self.address,
            target,
        }
    }
}

/// The caller of one call: who sent it, from which chain, to whom.
#[derive(Debug, PartialEq, Eq)]
pub struct Origin {
    ledger_id: LedgerId,
    chain_id: ChainId,
    sender: Address,
    target: Address,
}

impl Origin {
    /// The calling address.
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// The chain the caller lives on.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The ledger whose account minted this origin.
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    /// The address the call was issued for.
    pub fn target(&self) -> Address {
        self.target
    }

    /// The sender, if this origin was minted on `ledger_id` for a call to
    /// `target`. `None` means the origin was meant for someone else.
    pub fn sender_for(&self, ledger_id: LedgerId, target: Address) -> Option<Address> {
        (self.ledger_id == ledger_id && self.target == target).then_some(self.sender)
    }
}
