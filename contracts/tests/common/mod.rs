//! Shared two-chain harness for the integration tests.
//!
//! One loopback network, a hub chain carrying the factory and a remote
//! chain carrying the vault and an ordinary asset. The adapter endpoints on
//! both chains share one address, the way a transport deployed at the same
//! address everywhere would.
//!
//! Users hold accounts on both ledgers; [`World::remote`] and
//! [`World::hub`] hand them out.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use hubbridge_contracts::{Factory, LockRequest, Vault};
use hubbridge_protocol::adapter::{LoopbackAdapter, LoopbackNetwork};
use hubbridge_protocol::config::FeeSchedule;
use hubbridge_protocol::events::MessageId;
use hubbridge_protocol::ledger::{AssetSpec, Ledger};
use hubbridge_protocol::logging::{init_logging, LogFormat};
use hubbridge_protocol::{Account, Address, Amount, BridgeError, ChainId};

pub const HUB: ChainId = ChainId(1);
pub const REMOTE: ChainId = ChainId(10);

pub const ADAPTER: Address = Address([0xad; 20]);
pub const VAULT: Address = Address([0x0a; 20]);
pub const FACTORY: Address = Address([0xfa; 20]);
pub const TOKEN: Address = Address([0x70; 20]);
pub const ISSUER: Address = Address([0x15; 20]);
pub const ALICE: Address = Address([0xa1; 20]);
pub const BOB: Address = Address([0xb0; 20]);

pub struct World {
    pub net: Arc<LoopbackNetwork>,
    pub hub_adapter: Arc<LoopbackAdapter>,
    pub remote_adapter: Arc<LoopbackAdapter>,
    pub hub_ledger: Arc<Ledger>,
    pub remote_ledger: Arc<Ledger>,
    pub vault: Arc<Vault>,
    pub factory: Arc<Factory>,
    remote_accounts: HashMap<Address, Account>,
    hub_accounts: HashMap<Address, Account>,
}

/// Users with accounts on both chains.
pub const USERS: [Address; 2] = [ALICE, BOB];

impl World {
    /// Both contracts deployed and listening on the endpoints, nothing
    /// registered yet. TOKEN exists on the remote chain with 1000 for Alice.
    pub fn unregistered(fees: FeeSchedule, token: AssetSpec) -> anyhow::Result<Self> {
        init_logging("hubbridge_contracts=debug,hubbridge_protocol=debug", LogFormat::Pretty);

        let hub_ledger = Arc::new(Ledger::new(HUB));
        let remote_ledger = Arc::new(Ledger::new(REMOTE));
        let net = LoopbackNetwork::new();
        let hub_adapter = net.attach(&hub_ledger, ADAPTER, fees)?;
        let remote_adapter = net.attach(&remote_ledger, ADAPTER, fees)?;

        let issuer = remote_ledger.open_account(ISSUER)?;
        remote_ledger.deploy(TOKEN, token)?;
        remote_ledger.mint(issuer.origin(TOKEN), ALICE, Amount::from(1000u64))?;

        let vault = Vault::deploy(VAULT, remote_ledger.clone())?;
        let factory = Factory::deploy(FACTORY, hub_ledger.clone())?;
        vault.listen(remote_adapter.as_ref())?;
        factory.listen(hub_adapter.as_ref())?;

        let mut remote_accounts = HashMap::from([(ISSUER, issuer)]);
        let mut hub_accounts = HashMap::new();
        for user in USERS {
            remote_accounts.insert(user, remote_ledger.open_account(user)?);
            hub_accounts.insert(user, hub_ledger.open_account(user)?);
        }

        Ok(Self {
            net,
            hub_adapter,
            remote_adapter,
            hub_ledger,
            remote_ledger,
            vault,
            factory,
            remote_accounts,
            hub_accounts,
        })
    }

    /// A fully wired bridge.
    pub fn new(fees: FeeSchedule, token: AssetSpec) -> anyhow::Result<Self> {
        let world = Self::unregistered(fees, token)?;
        world.register_factory()?;
        world.register_vault()?;
        Ok(world)
    }

    /// A fully wired bridge over a plain token and a free transport.
    pub fn standard() -> anyhow::Result<Self> {
        Self::new(FeeSchedule::free(), plain_token())
    }

    /// The remote adapter registers the factory with the vault.
    pub fn register_factory(&self) -> Result<(), BridgeError> {
        self.remote_adapter.register_counterpart(VAULT, HUB, FACTORY)
    }

    /// The hub adapter registers the vault with the factory.
    pub fn register_vault(&self) -> Result<(), BridgeError> {
        self.hub_adapter.register_counterpart(FACTORY, REMOTE, VAULT)
    }

    /// `who`'s account on the remote chain.
    pub fn remote(&self, who: Address) -> &Account {
        &self.remote_accounts[&who]
    }

    /// `who`'s account on the hub.
    pub fn hub(&self, who: Address) -> &Account {
        &self.hub_accounts[&who]
    }

    pub fn lock_request(&self, amount: u64, recipient: Address) -> LockRequest {
        LockRequest {
            asset: TOKEN,
            amount: Amount::from(amount),
            adapter: ADAPTER,
            dst_chain_id: HUB,
            recipient,
        }
    }

    /// Approves the vault and locks, paying the quoted fee.
    pub fn lock(&self, owner: Address, amount: u64, recipient: Address) -> Result<MessageId, BridgeError> {
        let request = self.lock_request(amount, recipient);
        let account = self.remote(owner);
        self.remote_ledger
            .approve(account.origin(TOKEN), VAULT, request.amount)?;
        let fee = self.vault.quote_lock(&request)?;
        self.vault.lock(account.origin(VAULT), &request, fee)
    }

    /// Bridges wrapped TOKEN back, paying the quoted fee.
    pub fn bridge_back(&self, owner: Address, amount: u64, recipient: Address) -> Result<MessageId, BridgeError> {
        let amount = Amount::from(amount);
        let fee = self
            .factory
            .quote_bridge_back(self.wrapped(), amount, recipient)?;
        self.factory
            .bridge_back(self.hub(owner).origin(FACTORY), self.wrapped(), amount, recipient, fee)
    }

    /// Where wrapped TOKEN lives (or will live) on the hub.
    pub fn wrapped(&self) -> Address {
        self.factory.compute_address(REMOTE, TOKEN, ADAPTER)
    }

    pub fn remote_balance(&self, holder: &Address) -> Amount {
        self.remote_ledger.balance_of(&TOKEN, holder)
    }

    pub fn wrapped_balance(&self, holder: &Address) -> Amount {
        self.hub_ledger.balance_of(&self.wrapped(), holder)
    }

    pub fn wrapped_supply(&self) -> Amount {
        self.hub_ledger.total_supply(&self.wrapped())
    }
}

pub fn plain_token() -> AssetSpec {
    AssetSpec::new("Remote Dollar", "rUSD", 6, ISSUER)
}

pub fn units(n: u64) -> Amount {
    Amount::from(n)
}
