//! # Vault
//!
//! Custody contract on a remote chain. Users lock an asset here; the vault
//! keeps it and tells the factory on the hub, through an adapter, to mint
//! the wrapped form. When the factory later burns wrapped supply, its
//! unlock instruction comes back through the same adapter and the vault
//! releases custody.
//!
//! ## Accounting
//!
//! The amount reported to the hub is what custody actually grew by, not
//! what the caller asked for. For assets that charge a fee on transfer the
//! two differ, and minting the requested amount would leave the vault
//! insolvent.
//!
//! Custody only ever decreases through [`MessageReceiver::receive_message`]
//! from the registered factory.
//!
//! ## Identity
//!
//! The vault opens its own account when deployed and never lends it out.
//! Callers identify themselves with an [`Origin`] addressed to the vault;
//! adapters do the same for deliveries and registrations.
//!
//! ## Atomicity
//!
//! `lock` opens a ledger transaction before moving funds. If anything after
//! that fails (payload encoding, the adapter's `send`), the transaction is
//! dropped, the ledger rolls back and no event is emitted.

use std::collections::HashMap;
use std::sync::Arc;

use hubbridge_protocol::adapter::{Adapter, MessageReceiver};
use hubbridge_protocol::codec::{LockPayload, UnlockPayload};
use hubbridge_protocol::events::{BridgeEvent, EventLog, MessageId};
use hubbridge_protocol::guard::ReentrancyGuard;
use hubbridge_protocol::ledger::{AssetMetadata, Ledger};
use hubbridge_protocol::{Account, Address, Amount, BridgeError, ChainId, Origin};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::registry::{caller_of, Registration, Registry};

/// Arguments of [`Vault::lock`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Asset to deposit.
    pub asset: Address,
    /// Amount to pull from the caller.
    pub amount: Amount,
    /// Adapter to send the mint instruction through.
    pub adapter: Address,
    /// Hub chain.
    pub dst_chain_id: ChainId,
    /// Who receives the wrapped asset on the hub.
    pub recipient: Address,
}

impl LockRequest {
    fn validate(&self) -> Result<(), BridgeError> {
        if self.asset.is_zero() || self.recipient.is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        if self.amount.is_zero() {
            return Err(BridgeError::ZeroAmount);
        }
        Ok(())
    }

    fn payload(&self, amount: Amount, metadata: &AssetMetadata) -> LockPayload {
        LockPayload::new(self.asset, self.recipient, amount, &metadata.name, &metadata.symbol)
    }
}

#[derive(Debug)]
struct VaultState {
    registry: Registry,
    locked: HashMap<Address, Amount>,
    unlocked: HashMap<Address, Amount>,
    events: EventLog,
}

/// The custody contract.
#[derive(Debug)]
pub struct Vault {
    address: Address,
    account: Account,
    ledger: Arc<Ledger>,
    guard: ReentrancyGuard,
    state: Mutex<VaultState>,
}

impl Vault {
    /// Deploys a vault at `address` holding custody on `ledger`.
    ///
    /// # Errors
    ///
    /// A ledger error if `address` already has an account.
    pub fn deploy(address: Address, ledger: Arc<Ledger>) -> Result<Arc<Self>, BridgeError> {
        let account = ledger.open_account(address)?;
        let registry = Registry::new(ledger.id(), ledger.chain_id(), address);
        tracing::info!(vault = %address, chain = %ledger.chain_id(), "vault deployed");
        Ok(Arc::new(Self {
            address,
            account,
            ledger,
            guard: ReentrancyGuard::new(),
            state: Mutex::new(VaultState {
                registry,
                locked: HashMap::new(),
                unlocked: HashMap::new(),
                events: EventLog::new(),
            }),
        }))
    }

    /// Makes the vault reachable through `adapter`.
    pub fn listen(self: &Arc<Self>, adapter: &dyn Adapter) -> Result<(), BridgeError> {
        let receiver: Arc<dyn MessageReceiver> = self.clone();
        adapter.bind(self.account.origin(adapter.address()), Arc::downgrade(&receiver))?;
        Ok(())
    }

    /// Binds `factory` on `hub_chain_id` for the calling adapter.
    ///
    /// `origin` must come from the adapter itself; its address becomes the
    /// registry key, and `adapter` is the handle `lock` later sends
    /// through.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unauthorized`] unless `origin` proves `adapter`,
    /// [`BridgeError::ZeroAddress`] or [`BridgeError::AlreadyRegistered`].
    pub fn register_factory(
        &self,
        origin: Origin,
        adapter: Arc<dyn Adapter>,
        hub_chain_id: ChainId,
        factory: Address,
    ) -> Result<(), BridgeError> {
        let _entered = self.guard.enter()?;
        let caller = origin.sender();
        let mut state = self.state.lock();
        state.registry.register(origin, adapter, hub_chain_id, factory)?;
        state.events.emit(
            self.address,
            BridgeEvent::FactoryRegistered {
                adapter: caller,
                chain_id: hub_chain_id,
                factory,
            },
        );
        Ok(())
    }

    /// Pulls `request.amount` of `request.asset` from the caller into
    /// custody and sends a mint instruction for the amount actually
    /// received.
    ///
    /// The caller must have approved the vault for at least
    /// `request.amount`. `fee` is handed to the adapter unchanged. The
    /// asset's name and symbol travel with the instruction, cut to
    /// [`MAX_ASSET_NAME_BYTES`](hubbridge_protocol::config::MAX_ASSET_NAME_BYTES)
    /// and [`MAX_ASSET_SYMBOL_BYTES`](hubbridge_protocol::config::MAX_ASSET_SYMBOL_BYTES).
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Unauthorized`] if `caller` is not addressed to
    ///   this vault.
    /// - [`BridgeError::ZeroAddress`] / [`BridgeError::ZeroAmount`] on empty
    ///   inputs, or `ZeroAmount` if custody did not grow at all.
    /// - [`BridgeError::NotRegistered`] if no factory is bound for
    ///   `(request.adapter, request.dst_chain_id)`.
    /// - Ledger and adapter failures. The ledger is rolled back.
    pub fn lock(
        &self,
        caller: Origin,
        request: &LockRequest,
        fee: Amount,
    ) -> Result<MessageId, BridgeError> {
        let _entered = self.guard.enter()?;
        let sender = caller_of(&caller, self.ledger.id(), self.address)?;
        request.validate()?;
        let route = self
            .state
            .lock()
            .registry
            .route(&request.adapter, request.dst_chain_id)?;
        let metadata = self.ledger.metadata(&request.asset)?;

        let tx = self.ledger.begin();
        let (credited, message_id) = match self.take_custody(sender, request, &metadata, &route, fee) {
            Ok(done) => done,
            Err(e) => {
                drop(tx);
                tracing::warn!(asset = %request.asset, error = %e, "lock rolled back");
                return Err(e);
            }
        };
        tx.commit();

        let mut state = self.state.lock();
        let total = state.locked.entry(request.asset).or_default();
        *total = total.saturating_add(credited);
        state.events.emit(
            self.address,
            BridgeEvent::Locked {
                asset: request.asset,
                sender,
                recipient: request.recipient,
                amount: credited,
                dst_chain_id: request.dst_chain_id,
                message_id,
            },
        );
        Ok(message_id)
    }

    /// The fee the adapter would charge for the instruction `lock` sends.
    ///
    /// Assumes the full amount is credited; the wire size does not depend
    /// on the amount.
    pub fn quote_lock(&self, request: &LockRequest) -> Result<Amount, BridgeError> {
        request.validate()?;
        let route = self
            .state
            .lock()
            .registry
            .route(&request.adapter, request.dst_chain_id)?;
        let metadata = self.ledger.metadata(&request.asset)?;
        let payload = request.payload(request.amount, &metadata).encode()?;
        Ok(route
            .adapter
            .estimate_fee(request.dst_chain_id, route.counterpart, &payload)?)
    }

    fn take_custody(
        &self,
        sender: Address,
        request: &LockRequest,
        metadata: &AssetMetadata,
        route: &Registration,
        fee: Amount,
    ) -> Result<(Amount, MessageId), BridgeError> {
        let before = self.ledger.balance_of(&request.asset, &self.address);
        self.ledger.transfer_from(
            self.account.origin(request.asset),
            sender,
            self.address,
            request.amount,
        )?;
        let credited = self
            .ledger
            .balance_of(&request.asset, &self.address)
            .saturating_sub(before);
        if credited.is_zero() {
            return Err(BridgeError::ZeroAmount);
        }

        let payload = request.payload(credited, metadata).encode()?;
        tracing::debug!(
            asset = %request.asset,
            requested = %request.amount,
            credited = %credited,
            factory = %route.counterpart,
            "custody taken, sending mint instruction"
        );
        let message_id = route.adapter.send(
            self.account.origin(route.adapter.address()),
            request.dst_chain_id,
            route.counterpart,
            payload,
            fee,
        )?;
        Ok((credited, message_id))
    }

    /// The factory bound for `(adapter, hub_chain_id)`, if any.
    pub fn factory_for(&self, adapter: &Address, hub_chain_id: ChainId) -> Option<Address> {
        self.state.lock().registry.counterpart(adapter, hub_chain_id)
    }

    /// What the vault currently holds of `asset`.
    pub fn custody_of(&self, asset: &Address) -> Amount {
        self.ledger.balance_of(asset, &self.address)
    }

    /// Sum of credited amounts over every successful `lock` of `asset`.
    pub fn total_locked(&self, asset: &Address) -> Amount {
        self.state.lock().locked.get(asset).copied().unwrap_or_default()
    }

    /// Sum of released amounts over every accepted unlock of `asset`.
    pub fn total_unlocked(&self, asset: &Address) -> Amount {
        self.state.lock().unlocked.get(asset).copied().unwrap_or_default()
    }

    /// Events emitted so far, oldest first.
    pub fn events(&self) -> Vec<BridgeEvent> {
        self.state.lock().events.events()
    }

    /// A copy of the full event log.
    pub fn event_log(&self) -> EventLog {
        self.state.lock().events.clone()
    }

    /// The ledger custody lives on.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

impl MessageReceiver for Vault {
    fn address(&self) -> Address {
        self.address
    }

    /// Executes an unlock instruction from the registered factory.
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
        if let Err(e) = authenticated {
            tracing::warn!(
                adapter = %origin.sender(),
                src_chain = %src_chain_id,
                src_sender = %src_sender,
                error = %e,
                "unlock instruction rejected"
            );
            return Err(e);
        }

        let message = UnlockPayload::decode(payload)?;
        if message.remote_asset.is_zero() || message.recipient.is_zero() {
            return Err(BridgeError::ZeroAddress);
        }
        if message.amount.is_zero() {
            return Err(BridgeError::ZeroAmount);
        }

        self.ledger.transfer(
            self.account.origin(message.remote_asset),
            message.recipient,
            message.amount,
        )?;

        let mut state = self.state.lock();
        let total = state.unlocked.entry(message.remote_asset).or_default();
        *total = total.saturating_add(message.amount);
        state.events.emit(
            self.address,
            BridgeEvent::Unlocked {
                asset: message.remote_asset,
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
        self.register_factory(origin, adapter, chain_id, counterpart)
    }
}
