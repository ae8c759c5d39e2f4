//! # Fungible-Asset Ledger
//!
//! One [`Ledger`] per chain. It holds every fungible asset deployed on that
//! chain, keyed by address, with the usual surface: balances, allowances,
//! transfers, and owner-gated mint/burn.
//!
//! The ledger is also where identity comes from. [`Ledger::open_account`]
//! issues the one [`Account`] for an address, and every state-changing
//! method takes an [`Origin`] minted by it, targeted at the asset being
//! touched. Reads stay address-based.
//!
//! Two knobs exist purely so the bridge can be tested against assets that
//! misbehave the way real ones do:
//!
//! - **Transfer fees** (`transfer_fee_bps`): a cut of every transfer is
//!   burned, so the receiver gets less than the sender sent. Custody code
//!   must measure balance deltas, not trust requested amounts.
//! - **Transfer hooks**: arbitrary code that runs after each transfer of an
//!   asset, with no asset lock held. This is how a callback re-enters a
//!   contract mid-call.
//!
//! ## Atomicity
//!
//! Each method is atomic on its own. Contracts that make several ledger
//! calls plus an external call open a [`Transaction`] with
//! [`Ledger::begin`] and [`commit`](Transaction::commit) it at the end;
//! dropping it uncommitted rolls every asset back.
//!
//! Writes are serialized per ledger by a reentrant lock. An open
//! transaction holds it, so writes from other threads wait until the
//! transaction commits or rolls back, and a rollback never erases them.
//! Hooks run on the writing thread and may re-enter freely. A hook that
//! writes to a *different* ledger can deadlock against a concurrent call
//! doing the reverse.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::{Account, LedgerId, Origin};
use crate::config::BPS_DENOMINATOR;
use crate::types::{Address, Amount, ChainId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No asset is deployed at this address.
    #[error("unknown asset: {0}")]
    UnknownAsset(Address),

    /// Something is already deployed at this address.
    #[error("address already occupied: {0}")]
    AddressOccupied(Address),

    /// An account for this address has already been issued.
    #[error("account already open: {0}")]
    AccountExists(Address),

    /// The origin was minted by another ledger.
    #[error("origin of {sender} was issued by another ledger (chain {chain_id})")]
    ForeignOrigin {
        /// Who minted it.
        sender: Address,
        /// Chain of the issuing ledger.
        chain_id: ChainId,
    },

    /// Transfers to (or deployment at) the empty address are not allowed.
    #[error("zero address")]
    ZeroAddress,

    /// The holder does not have enough.
    #[error("insufficient balance in {asset}: holder {holder} has {available}, needs {requested}")]
    InsufficientBalance {
        /// Asset being moved.
        asset: Address,
        /// Account being debited.
        holder: Address,
        /// Current balance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// The spender's allowance is too small.
    #[error("insufficient allowance in {asset}: {spender} may spend {available} of {owner}, needs {requested}")]
    InsufficientAllowance {
        /// Asset being moved.
        asset: Address,
        /// Account whose tokens are spent.
        owner: Address,
        /// Account spending them.
        spender: Address,
        /// Current allowance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// Supply or a balance would exceed `U256::MAX`.
    #[error("supply overflow in {0}")]
    Overflow(Address),

    /// The caller is not the asset's owner.
    #[error("{caller} is not the owner of {asset}")]
    NotOwner {
        /// Asset being administered.
        asset: Address,
        /// Who tried.
        caller: Address,
    },

    /// Transfer fee out of range.
    #[error("transfer fee {0} bps exceeds 100%")]
    InvalidFee(u16),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parameters for deploying an asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Display name.
    pub name: String,
    /// Ticker.
    pub symbol: String,
    /// Display decimals. Arithmetic never divides by this.
    pub decimals: u8,
    /// Account allowed to mint, burn, and set metadata.
    pub owner: Address,
    /// Cut of each transfer that is burned, in basis points.
    pub transfer_fee_bps: u16,
}

impl AssetSpec {
    /// A plain asset with no transfer fee.
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8, owner: Address) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            owner,
            transfer_fee_bps: 0,
        }
    }

    /// Same asset, but every transfer burns `bps` basis points.
    pub fn with_transfer_fee(mut self, bps: u16) -> Self {
        self.transfer_fee_bps = bps;
        self
    }
}

/// Name, symbol and decimals of an asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Display name.
    pub name: String,
    /// Ticker.
    pub symbol: String,
    /// Display decimals.
    pub decimals: u8,
}

/// Code run after every transfer of a hooked asset.
///
/// Hooks run with no asset lock held and may call anything, including the
/// contract whose call triggered the transfer.
pub trait TransferHook: Send + Sync {
    /// Called once `amount` has moved from `from` to `to`.
    fn on_transfer(&self, asset: Address, from: Address, to: Address, amount: Amount);
}

#[derive(Clone, Debug)]
struct AssetState {
    spec: AssetSpec,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
}

impl AssetState {
    fn balance(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or_default()
    }

    // Split before multiplying so U256::MAX transfers cannot overflow.
    fn fee_on(&self, amount: Amount) -> Amount {
        let bps = Amount::from(self.spec.transfer_fee_bps);
        let den = Amount::from(BPS_DENOMINATOR);
        (amount / den) * bps + (amount % den) * bps / den
    }

    fn only_owner(&self, asset: Address, caller: Address) -> Result<(), LedgerError> {
        if self.spec.owner != caller {
            return Err(LedgerError::NotOwner { asset, caller });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// An all-or-nothing scope over one ledger.
///
/// Holds the ledger's write lock from [`Ledger::begin`] until it is
/// committed or dropped. Dropping it without [`commit`](Self::commit)
/// restores every asset to its state at `begin`. Accounts and hooks are
/// not rolled back.
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction<'a> {
    ledger: &'a Ledger,
    snapshot: Option<BTreeMap<Address, AssetState>>,
    _serial: ReentrantMutexGuard<'a, ()>,
}

impl Transaction<'_> {
    /// Keeps everything written since `begin`.
    pub fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            tracing::debug!(chain = %self.ledger.chain_id, "ledger transaction rolled back");
            *self.ledger.assets.lock() = snapshot;
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// All fungible assets on one chain.
pub struct Ledger {
    id: LedgerId,
    chain_id: ChainId,
    serial: ReentrantMutex<()>,
    assets: Mutex<BTreeMap<Address, AssetState>>,
    accounts: Mutex<HashSet<Address>>,
    hooks: Mutex<HashMap<Address, Arc<dyn TransferHook>>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("id", &self.id)
            .field("chain_id", &self.chain_id)
            .field("assets", &self.assets.lock().len())
            .field("accounts", &self.accounts.lock().len())
            .finish()
    }
}

impl Ledger {
    /// An empty ledger for `chain_id`.
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            id: LedgerId::next(),
            chain_id,
            serial: ReentrantMutex::new(()),
            assets: Mutex::new(BTreeMap::new()),
            accounts: Mutex::new(HashSet::new()),
            hooks: Mutex::new(HashMap::new()),
        }
    }

    /// The chain this ledger belongs to.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// This ledger instance. Origins are only honored by the ledger, and
    /// the contracts on it, whose id they carry.
    pub fn id(&self) -> LedgerId {
        self.id
    }

    /// Issues the account for `address`. Each address gets exactly one,
    /// ever; whoever holds it is the only party that can act as `address`
    /// on this chain.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountExists`] on the second call for an address,
    /// [`LedgerError::ZeroAddress`] for the empty address.
    pub fn open_account(&self, address: Address) -> Result<Account, LedgerError> {
        if address.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if !self.accounts.lock().insert(address) {
            return Err(LedgerError::AccountExists(address));
        }
        tracing::debug!(chain = %self.chain_id, account = %address, "account opened");
        Ok(Account::new(self.id, self.chain_id, address))
    }

    /// Opens a transaction. See [`Transaction`].
    pub fn begin(&self) -> Transaction<'_> {
        let serial = self.serial.lock();
        let snapshot = self.assets.lock().clone();
        Transaction {
            ledger: self,
            snapshot: Some(snapshot),
            _serial: serial,
        }
    }

    /// Deploys a new asset at `address` with zero supply.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AddressOccupied`] if anything already lives there,
    /// [`LedgerError::ZeroAddress`] for the empty address,
    /// [`LedgerError::InvalidFee`] for a fee above 100%.
    pub fn deploy(&self, address: Address, spec: AssetSpec) -> Result<(), LedgerError> {
        if address.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if spec.transfer_fee_bps > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidFee(spec.transfer_fee_bps));
        }
        let _serial = self.serial.lock();
        let mut assets = self.assets.lock();
        if assets.contains_key(&address) {
            return Err(LedgerError::AddressOccupied(address));
        }
        tracing::debug!(chain = %self.chain_id, asset = %address, symbol = %spec.symbol, "asset deployed");
        assets.insert(
            address,
            AssetState {
                spec,
                total_supply: Amount::zero(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Whether an asset lives at `address`.
    pub fn contains(&self, address: &Address) -> bool {
        self.assets.lock().contains_key(address)
    }

    /// Name, symbol and decimals.
    pub fn metadata(&self, asset: &Address) -> Result<AssetMetadata, LedgerError> {
        let assets = self.assets.lock();
        let state = assets.get(asset).ok_or(LedgerError::UnknownAsset(*asset))?;
        Ok(AssetMetadata {
            name: state.spec.name.clone(),
            symbol: state.spec.symbol.clone(),
            decimals: state.spec.decimals,
        })
    }

    /// The asset's owner.
    pub fn owner(&self, asset: &Address) -> Result<Address, LedgerError> {
        let assets = self.assets.lock();
        let state = assets.get(asset).ok_or(LedgerError::UnknownAsset(*asset))?;
        Ok(state.spec.owner)
    }

    /// Overwrites name and symbol of `origin.target()`. Owner only.
    /// Callers that need write-once semantics enforce them themselves.
    pub fn set_metadata(&self, origin: Origin, name: String, symbol: String) -> Result<(), LedgerError> {
        let asset = self.asset_of(&origin)?;
        let _serial = self.serial.lock();
        let mut assets = self.assets.lock();
        let state = assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))?;
        state.only_owner(asset, origin.sender())?;
        state.spec.name = name;
        state.spec.symbol = symbol;
        Ok(())
    }

    /// Total supply, or zero for an unknown asset.
    pub fn total_supply(&self, asset: &Address) -> Amount {
        self.assets
            .lock()
            .get(asset)
            .map(|s| s.total_supply)
            .unwrap_or_default()
    }

    /// Balance of `holder`, or zero.
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> Amount {
        self.assets
            .lock()
            .get(asset)
            .map(|s| s.balance(holder))
            .unwrap_or_default()
    }

    /// How much `spender` may move out of `owner`'s balance.
    pub fn allowance(&self, asset: &Address, owner: &Address, spender: &Address) -> Amount {
        self.assets
            .lock()
            .get(asset)
            .and_then(|s| s.allowances.get(&(*owner, *spender)).copied())
            .unwrap_or_default()
    }

    /// Sets `spender`'s allowance over the caller's balance of
    /// `origin.target()`. Replaces, does not add.
    pub fn approve(&self, origin: Origin, spender: Address, amount: Amount) -> Result<(), LedgerError> {
        let asset = self.asset_of(&origin)?;
        if spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let _serial = self.serial.lock();
        let mut assets = self.assets.lock();
        let state = assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))?;
        state.allowances.insert((origin.sender(), spender), amount);
        Ok(())
    }

    /// Moves `amount` of `origin.target()` from the caller to `to`.
    /// Returns what `to` received, which is less than `amount` for
    /// fee-charging assets.
    pub fn transfer(&self, origin: Origin, to: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let asset = self.asset_of(&origin)?;
        let from = origin.sender();
        let _serial = self.serial.lock();
        let received = {
            let mut assets = self.assets.lock();
            let state = assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))?;
            Self::move_balance(&asset, state, from, to, amount)?
        };
        self.run_hook(&asset, from, to, received);
        Ok(received)
    }

    /// Moves `amount` from `from` to `to` on the caller's allowance.
    pub fn transfer_from(
        &self,
        origin: Origin,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let asset = self.asset_of(&origin)?;
        let spender = origin.sender();
        let _serial = self.serial.lock();
        let received = {
            let mut assets = self.assets.lock();
            let state = assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))?;
            let allowed = state
                .allowances
                .get(&(from, spender))
                .copied()
                .unwrap_or_default();
            if allowed < amount {
                return Err(LedgerError::InsufficientAllowance {
                    asset,
                    owner: from,
                    spender,
                    available: allowed,
                    requested: amount,
                });
            }
            let received = Self::move_balance(&asset, state, from, to, amount)?;
            state.allowances.insert((from, spender), allowed - amount);
            received
        };
        self.run_hook(&asset, from, to, received);
        Ok(received)
    }

    /// Creates `amount` new units of `origin.target()` for `to`. Owner only.
    pub fn mint(&self, origin: Origin, to: Address, amount: Amount) -> Result<(), LedgerError> {
        let asset = self.asset_of(&origin)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let _serial = self.serial.lock();
        let mut assets = self.assets.lock();
        let state = assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))?;
        state.only_owner(asset, origin.sender())?;
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(asset))?;
        let balance = state
            .balance(&to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(asset))?;
        state.total_supply = supply;
        state.balances.insert(to, balance);
        Ok(())
    }

    /// Destroys `amount` units of `origin.target()` held by `from`. Owner only.
    pub fn burn(&self, origin: Origin, from: Address, amount: Amount) -> Result<(), LedgerError> {
        let asset = self.asset_of(&origin)?;
        let _serial = self.serial.lock();
        let mut assets = self.assets.lock();
        let state = assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))?;
        state.only_owner(asset, origin.sender())?;
        let available = state.balance(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                holder: from,
                available,
                requested: amount,
            });
        }
        state.balances.insert(from, available - amount);
        // Supply always covers every balance, so this cannot underflow.
        state.total_supply = state.total_supply.saturating_sub(amount);
        Ok(())
    }

    /// Installs (or replaces) the transfer hook for `asset`.
    pub fn set_transfer_hook(&self, asset: Address, hook: Arc<dyn TransferHook>) {
        self.hooks.lock().insert(asset, hook);
    }

    fn asset_of(&self, origin: &Origin) -> Result<Address, LedgerError> {
        if origin.ledger_id() != self.id {
            return Err(LedgerError::ForeignOrigin {
                sender: origin.sender(),
                chain_id: origin.chain_id(),
            });
        }
        Ok(origin.target())
    }

    fn move_balance(
        asset: &Address,
        state: &mut AssetState,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let available = state.balance(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: *asset,
                holder: from,
                available,
                requested: amount,
            });
        }
        let fee = state.fee_on(amount);
        let received = amount - fee;

        let to_before = if from == to {
            available - amount
        } else {
            state.balance(&to)
        };
        let to_balance = to_before
            .checked_add(received)
            .ok_or(LedgerError::Overflow(*asset))?;
        state.balances.insert(from, available - amount);
        state.balances.insert(to, to_balance);
        state.total_supply = state.total_supply.saturating_sub(fee);
        Ok(received)
    }

    fn run_hook(&self, asset: &Address, from: Address, to: Address, amount: Amount) {
        let hook = self.hooks.lock().get(asset).cloned();
        if let Some(hook) = hook {
            hook.on_transfer(*asset, from, to, amount);
        }
    }
}
