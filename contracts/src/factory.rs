//! # Factory
//!
//! Registry and minting contract on the hub. It owns every wrapped asset it
//! has created and is their only minter and burner.
//!
//! ## Inbound (lock → mint)
//!
//! A lock instruction from a registered vault names a remote asset. The
//! factory derives the identity key `(src_chain_id, remote_asset, adapter)`
//! and looks the wrapped asset up; on a miss it creates one at the
//! predicted address and sets name and symbol from the instruction. Either
//! way it then mints the instructed amount. Later instructions for the same
//! key never change name or symbol.
//!
//! ## Outbound (burn → unlock)
//!
//! `bridge_back` burns from the caller and sends an unlock instruction to
//! the vault bound for the asset's own adapter and remote chain. An asset
//! can only go back the way it came.
//!
//! ## Identity
//!
//! The factory's account on the hub ledger is what makes it the owner of
//! its wrapped assets: every `initialize`, `mint` and `burn` goes out with
//! an origin minted from it. Callers and adapters reach the factory with
//! origins of their own, addressed to it.
//!
//! ## Atomicity
//!
//! Creation, initialization and minting run in one ledger transaction; so
//! do burning and sending. A failure anywhere rolls the ledger back and
//! leaves the registry untouched.

use std::collections::HashMap;
use std::sync::Arc;

use hubbridge_protocol::adapter::{Adapter, MessageReceiver};
use hubbridge_protocol::codec::{LockPayload, UnlockPayload};
use hubbridge_protocol::events::{BridgeEvent, EventLog, MessageId};
use hubbridge_protocol::guard::ReentrancyGuard;
use hubbridge_protocol::identity::{self, IdentityKey, WrappedAssetPlan};
use hubbridge_protocol::ledger::Ledger;
use hubbridge_protocol::{Account, Address, Amount, BridgeError, ChainId, Origin};
use parking_lot::Mutex;

use crate::registry::{caller_of, Registration, Registry};
use crate::wrapped_asset::WrappedAsset;

#[derive(Debug)]
struct FactoryState {
    registry: Registry,
    by_key: HashMap<IdentityKey, Address>,
    assets: HashMap<Address, Arc<WrappedAsset>>,
    events: EventLog,
}

/// The hub-side contract.
#[derive(Debug)]
pub struct Factory {
    address: Address,
    account: Account,
    ledger: Arc<Ledger>,
    guard: ReentrancyGuard,
    state: Mutex<FactoryState>,
}

impl Factory {
    /// Deploys a factory at `address` creating wrapped assets on `ledger`.
    ///
    /// # Errors
    ///
    /// A ledger error if `address` already has an account.
    pub fn deploy(address: Address, ledger: Arc<Ledger>) -> Result<Arc<Self>, BridgeError> {
        let account = ledger.open_account(address)?;
        let registry = Registry::new(ledger.id(), ledger.chain_id(), address);
        tracing::info!(factory = %address, chain = %ledger.chain_id(), "factory deployed");
        Ok(Arc::new(Self {
            address,
            account,
            ledger,
            guard: ReentrancyGuard::new(),
            state: Mutex::new(FactoryState {
                registry,
                by_key: HashMap::new(),
                assets: HashMap::new(),
                events: EventLog::new(),
            }),
        }))
    }

    /// Makes the factory reachable through `adapter`.
    pub fn listen(self: &Arc<Self>, adapter: &dyn Adapter) -> Result<(), BridgeError> {
        let receiver: Arc<dyn MessageReceiver> = self.clone();
        adapter.bind(self.account.origin(adapter.address()), Arc::downgrade(&receiver))?;
        Ok(())
    }

    /// Binds `vault` on `remote_chain_id` for the adapter `origin` comes
    /// from, which `adapter` must be.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unauthorized`] unless `origin` proves `adapter`,
    /// [`BridgeError::ZeroAddress`] or [`BridgeError::AlreadyRegistered`].
    pub fn register_vault(
        &self,
        origin: Origin,
        adapter: Arc<dyn Adapter>,
        remote_chain_id: ChainId,
        vault: Address,
    ) -> Result<(), BridgeError> {
        let _entered = self.guard.enter()?;
        let caller = origin.sender();
        let mut state = self.state.lock();
        state.registry.register(origin, adapter, remote_chain_id, vault)?;
        state.events.emit(
            self.address,
            BridgeEvent::VaultRegistered {
                adapter: caller,
                chain_id: remote_chain_id,
                vault,
            },
        );
        Ok(())
    }

    /// Registry key for `(remote_chain_id, remote_asset, adapter)`.
    pub fn compute_identity_key(
        &self,
        remote_chain_id: ChainId,
        remote_asset: Address,
        adapter: Address,
    ) -> IdentityKey {
        identity::compute_identity_key(remote_chain_id, remote_asset, adapter)
    }

    /// Address the wrapped asset for this tuple has, or will have once the
    /// first lock instruction for it arrives.
    pub fn compute_address(
        &self,
        remote_chain_id: ChainId,
        remote_asset: Address,
        adapter: Address,
    ) -> Address {
        identity::plan_wrapped_asset(self.address, remote_chain_id, remote_asset, adapter).address
    }

    /// Burns `amount` of `wrapped_asset` from `caller` and sends an unlock
    /// instruction for `recipient` to the vault the asset came from.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Unauthorized`] if `caller` is not addressed to
    ///   this factory.
    /// - [`BridgeError::InvalidAsset`] if this factory did not create
    ///   `wrapped_asset`.
    /// - [`BridgeError::ZeroAddress`] / [`BridgeError::ZeroAmount`].
    /// - [`BridgeError::NotRegistered`] if no vault is bound for the asset's
    ///   adapter and remote chain.
    /// - Ledger and adapter failures. The burn is rolled back.
    pub fn bridge_back(
        &self,
        caller: Origin,
        wrapped_asset: Address,
        amount: Amount,
        recipient: Address,
        fee: Amount,
    ) -> Result<MessageId, BridgeError> {
        let _entered = self.guard.enter()?;
        let sender = caller_of(&caller, self.ledger.id(), self.address)?;
        let (asset, route) = self.outbound(wrapped_asset, amount, recipient)?;

        let tx = self.ledger.begin();
        let message_id = match self.burn_and_send(&asset, &route, sender, amount, recipient, fee) {
            Ok(id) => id,
            Err(e) => {
                drop(tx);
                tracing::warn!(wrapped_asset = %wrapped_asset, error = %e, "bridge back rolled back");
                return Err(e);
            }
        };
        tx.commit();

        self.state.lock().events.emit(
            self.address,
            BridgeEvent::BurnedAndBridgedBack {
                wrapped_asset,
                sender,
                recipient,
                amount,
                message_id,
            },
        );
        Ok(message_id)
    }

    /// The fee the adapter would charge for the instruction `bridge_back`
    /// sends.
    pub fn quote_bridge_back(
        &self,
        wrapped_asset: Address,
        amount: Amount,
        recipient: Address,
    ) -> Result<Amount, BridgeError> {
        let (asset, route) = self.outbound(wrapped_asset, amount, recipient)?;
        let payload = unlock_payload(&asset, amount, recipient).encode()?;
        Ok(route
            .adapter
            .estimate_fee(asset.remote_chain_id(), route.counterpart, &payload)?)
    }

    // Shared precondition checks of `bridge_back` and its quote.
    fn outbound(
        &self,
        wrapped_asset: Address,
        amount: Amount,
        recipient: Address,
    ) -> Result<(Arc<WrappedAsset>, Registration), BridgeError> {
        let state = self.state.lock();
        let asset = state
            .assets
            .get(&wrapped_asset)
            .cloned()
            .ok_or(BridgeError::InvalidAsset(wrapped_asset))?;
        if recipient.is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        if amount.is_zero() {
            return Err(BridgeError::ZeroAmount);
        }
        let route = state
            .registry
            .route(&asset.adapter(), asset.remote_chain_id())?;
        Ok((asset, route))
    }

    fn burn_and_send(
        &self,
        asset: &WrappedAsset,
        route: &Registration,
        sender: Address,
        amount: Amount,
        recipient: Address,
        fee: Amount,
    ) -> Result<MessageId, BridgeError> {
        asset.burn(self.account.origin(asset.address()), sender, amount)?;
        let payload = unlock_payload(asset, amount, recipient).encode()?;
        tracing::debug!(
            wrapped_asset = %asset.address(),
            amount = %amount,
            vault = %route.counterpart,
            "burned, sending unlock instruction"
        );
        Ok(route.adapter.send(
            self.account.origin(route.adapter.address()),
            asset.remote_chain_id(),
            route.counterpart,
            payload,
            fee,
        )?)
    }

    // Looks the asset up or creates it, then mints. Runs inside a ledger
    // transaction held by the caller.
    fn credit(
        &self,
        existing: Option<Arc<WrappedAsset>>,
        plan: WrappedAssetPlan,
        src_chain_id: ChainId,
        adapter: Address,
        message: &LockPayload,
    ) -> Result<(Arc<WrappedAsset>, bool), BridgeError> {
        let (asset, created) = match existing {
            Some(asset) => (asset, false),
            None => {
                let asset = WrappedAsset::deploy(
                    Arc::clone(&self.ledger),
                    plan,
                    self.address,
                    src_chain_id,
                    message.remote_asset,
                    adapter,
                )?;
                asset.initialize(
                    self.account.origin(plan.address),
                    message.asset_name.clone(),
                    message.asset_symbol.clone(),
                )?;
                (Arc::new(asset), true)
            }
        };
        asset.mint(
            self.account.origin(asset.address()),
            message.recipient,
            message.amount,
        )?;
        Ok((asset, created))
    }

    /// The vault bound for `(adapter, remote_chain_id)`, if any.
    pub fn vault_for(&self, adapter: &Address, remote_chain_id: ChainId) -> Option<Address> {
        self.state.lock().registry.counterpart(adapter, remote_chain_id)
    }

    /// Address of the wrapped asset registered under `key`, if created.
    pub fn wrapped_asset(&self, key: &IdentityKey) -> Option<Address> {
        self.state.lock().by_key.get(key).copied()
    }

    /// Address of the wrapped asset for this tuple, if created.
    pub fn wrapped_asset_for(
        &self,
        remote_chain_id: ChainId,
        remote_asset: Address,
        adapter: Address,
    ) -> Option<Address> {
        self.wrapped_asset(&identity::compute_identity_key(
            remote_chain_id,
            remote_asset,
            adapter,
        ))
    }

    /// The adapter whose messages created `wrapped_asset`.
    pub fn adapter_of(&self, wrapped_asset: &Address) -> Option<Address> {
        self.asset(wrapped_asset).map(|a| a.adapter())
    }

    /// Handle to a wrapped asset this factory created.
    pub fn asset(&self, wrapped_asset: &Address) -> Option<Arc<WrappedAsset>> {
        self.state.lock().assets.get(wrapped_asset).cloned()
    }

    /// Number of wrapped assets created.
    pub fn asset_count(&self) -> usize {
        self.state.lock().assets.len()
    }

    /// Events emitted so far, oldest first.
    pub fn events(&self) -> Vec<BridgeEvent> {
        self.state.lock().events.events()
    }

    /// A copy of the full event log.
    pub fn event_log(&self) -> EventLog {
        self.state.lock().events.clone()
    }

    /// The hub ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

fn unlock_payload(asset: &WrappedAsset, amount: Amount, recipient: Address) -> UnlockPayload {
    UnlockPayload {
        remote_asset: asset.remote_asset(),
        recipient,
        amount,
    }
}

impl MessageReceiver for Factory {
    fn address(&self) -> Address {
        self.address
    }

    /// Executes a lock instruction from a registered vault.
    fn receive_message(
        &self,
        origin: Origin,
        src_chain_id: ChainId,
        src_sender: Address,
        payload: &[u8],
    ) -> Result<(), BridgeError> {
        let _entered = self.guard.enter()?;
        let authenticated = self
            .state
            .lock()
            .registry
            .authenticate(&origin, src_chain_id, &src_sender);
        let adapter = match authenticated {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::warn!(
                    adapter = %origin.sender(),
                    src_chain = %src_chain_id,
                    src_sender = %src_sender,
                    error = %e,
                    "mint instruction rejected"
                );
                return Err(e);
            }
        };

        let message = LockPayload::decode(payload)?;
        if message.remote_asset.is_zero() || message.recipient.is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        if message.amount.is_zero() {
            return Err(BridgeError::ZeroAmount);
        }

        let plan = identity::plan_wrapped_asset(self.address, src_chain_id, message.remote_asset, adapter);
        let existing = {
            let state = self.state.lock();
            state
                .by_key
                .get(&plan.identity_key)
                .and_then(|address| state.assets.get(address))
                .cloned()
        };

        let tx = self.ledger.begin();
        let (asset, created) = match self.credit(existing, plan, src_chain_id, adapter, &message) {
            Ok(done) => done,
            Err(e) => {
                drop(tx);
                tracing::warn!(wrapped_asset = %plan.address, error = %e, "mint rolled back");
                return Err(e);
            }
        };
        tx.commit();

        let mut state = self.state.lock();
        if created {
            state.by_key.insert(plan.identity_key, plan.address);
            state.assets.insert(plan.address, Arc::clone(&asset));
            state.events.emit(
                self.address,
                BridgeEvent::AssetCreated {
                    identity_key: plan.identity_key,
                    wrapped_asset: plan.address,
                    remote_chain_id: src_chain_id,
                    remote_asset: message.remote_asset,
                    adapter,
                    name: message.asset_name.clone(),
                    symbol: message.asset_symbol.clone(),
                },
            );
        }
        state.events.emit(
            self.address,
            BridgeEvent::AssetMinted {
                wrapped_asset: asset.address(),
                recipient: message.recipient,
                amount: message.amount,
            },
        );
        Ok(())
    }

    fn register_counterpart(
        &self,
        origin: Origin,
        adapter: Arc<dyn Adapter>,
        chain_id: ChainId,
        counterpart: Address,
    ) -> Result<(), BridgeError> {
        self.register_vault(origin, adapter, chain_id, counterpart)
    }
}
