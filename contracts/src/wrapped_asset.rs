//! # Wrapped Asset
//!
//! The hub-side representation of one remote asset, bound to one adapter.
//! Balances and allowances live on the hub [`Ledger`]; this type adds the
//! bridge rules on top:
//!
//! - identity (`remote_chain_id`, `remote_asset`, owning factory, adapter)
//!   is fixed at construction;
//! - name and symbol start empty and are set exactly once, by the factory;
//! - mint and burn are factory-only.
//!
//! Transfers, approvals and balance queries are open to anyone. Every
//! state-changing call takes the caller's [`Origin`], addressed to this
//! asset, and acts as whoever it proves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hubbridge_protocol::config::WRAPPED_ASSET_DECIMALS;
use hubbridge_protocol::identity::{IdentityKey, WrappedAssetPlan};
use hubbridge_protocol::ledger::{AssetSpec, Ledger};
use hubbridge_protocol::{Address, Amount, BridgeError, ChainId, Origin};

use crate::registry::caller_of;

/// A wrapped asset deployed by a factory.
#[derive(Debug)]
pub struct WrappedAsset {
    address: Address,
    identity_key: IdentityKey,
    remote_chain_id: ChainId,
    remote_asset: Address,
    factory: Address,
    adapter: Address,
    ledger: Arc<Ledger>,
    initialized: AtomicBool,
    created_at: DateTime<Utc>,
}

impl WrappedAsset {
    /// Deploys an uninitialized wrapped asset at `plan.address` on `ledger`,
    /// owned by `factory`.
    ///
    /// # Errors
    ///
    /// Fails with a ledger error if the address is already occupied.
    pub fn deploy(
        ledger: Arc<Ledger>,
        plan: WrappedAssetPlan,
        factory: Address,
        remote_chain_id: ChainId,
        remote_asset: Address,
        adapter: Address,
    ) -> Result<Self, BridgeError> {
        ledger.deploy(
            plan.address,
            AssetSpec::new("", "", WRAPPED_ASSET_DECIMALS, factory),
        )?;
        Ok(Self {
            address: plan.address,
            identity_key: plan.identity_key,
            remote_chain_id,
            remote_asset,
            factory,
            adapter,
            ledger,
            initialized: AtomicBool::new(false),
            created_at: Utc::now(),
        })
    }

    /// Sets name and symbol. Factory only, once.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unauthorized`] for any caller but the factory;
    /// [`BridgeError::AlreadyInitialized`] on a second call.
    pub fn initialize(&self, origin: Origin, name: String, symbol: String) -> Result<(), BridgeError> {
        self.only_factory(&origin)?;
        if self.initialized.load(Ordering::Acquire) {
            return Err(BridgeError::AlreadyInitialized(self.address));
        }
        self.ledger.set_metadata(origin, name, symbol)?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Creates `amount` for `to`. Factory only.
    pub fn mint(&self, origin: Origin, to: Address, amount: Amount) -> Result<(), BridgeError> {
        self.only_factory(&origin)?;
        self.ledger.mint(origin, to, amount)?;
        Ok(())
    }

    /// Destroys `amount` held by `from`. Factory only.
    pub fn burn(&self, origin: Origin, from: Address, amount: Amount) -> Result<(), BridgeError> {
        self.only_factory(&origin)?;
        self.ledger.burn(origin, from, amount)?;
        Ok(())
    }

    /// Moves `amount` from the caller to `to`.
    pub fn transfer(&self, origin: Origin, to: Address, amount: Amount) -> Result<(), BridgeError> {
        self.caller(&origin)?;
        self.ledger.transfer(origin, to, amount)?;
        Ok(())
    }

    /// Lets `spender` move up to `amount` of the caller's balance.
    pub fn approve(&self, origin: Origin, spender: Address, amount: Amount) -> Result<(), BridgeError> {
        self.caller(&origin)?;
        self.ledger.approve(origin, spender, amount)?;
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on the caller's allowance.
    pub fn transfer_from(
        &self,
        origin: Origin,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), BridgeError> {
        self.caller(&origin)?;
        self.ledger.transfer_from(origin, from, to, amount)?;
        Ok(())
    }

    /// Balance of `holder`.
    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.ledger.balance_of(&self.address, holder)
    }

    /// Allowance of `spender` over `owner`'s balance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.ledger.allowance(&self.address, owner, spender)
    }

    /// Σ mints − Σ burns.
    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply(&self.address)
    }

    /// Display name; empty until initialized.
    pub fn name(&self) -> String {
        self.ledger
            .metadata(&self.address)
            .map(|m| m.name)
            .unwrap_or_default()
    }

    /// Ticker; empty until initialized.
    pub fn symbol(&self) -> String {
        self.ledger
            .metadata(&self.address)
            .map(|m| m.symbol)
            .unwrap_or_default()
    }

    /// Display decimals.
    pub fn decimals(&self) -> u8 {
        WRAPPED_ASSET_DECIMALS
    }

    /// Whether name and symbol have been set.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Where the asset lives.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Registry key.
    pub fn identity_key(&self) -> IdentityKey {
        self.identity_key
    }

    /// Chain of the asset it represents.
    pub fn remote_chain_id(&self) -> ChainId {
        self.remote_chain_id
    }

    /// The asset it represents.
    pub fn remote_asset(&self) -> Address {
        self.remote_asset
    }

    /// The factory that owns it.
    pub fn factory(&self) -> Address {
        self.factory
    }

    /// The adapter whose messages created it.
    pub fn adapter(&self) -> Address {
        self.adapter
    }

    /// When it was deployed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn caller(&self, origin: &Origin) -> Result<Address, BridgeError> {
        caller_of(origin, self.ledger.id(), self.address)
    }

    fn only_factory(&self, origin: &Origin) -> Result<(), BridgeError> {
        let caller = self.caller(origin)?;
        if caller != self.factory {
            return Err(BridgeError::Unauthorized(caller));
        }
        Ok(())
    }
}
