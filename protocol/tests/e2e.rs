//! End-to-end tests for the host-ledger primitives.
//!
//! These tests wire a loopback transport, two ledgers and a minimal
//! receiving contract together without the bridge contracts, proving that
//! the pieces compose: fee schedules loaded from disk drive transport
//! quotes, payloads survive the wire, delivery can be reordered, a
//! receiver that fails leaves both its ledger and the queue as they were,
//! and a receiver can tell its adapter's deliveries from anyone else's.
//!
//! Each test builds its own network. No shared state.

use std::sync::Arc;

use parking_lot::Mutex;

use hubbridge_protocol::adapter::{Adapter, AdapterError, LoopbackNetwork, MessageReceiver};
use hubbridge_protocol::codec::UnlockPayload;
use hubbridge_protocol::config::FeeSchedule;
use hubbridge_protocol::events::{BridgeEvent, EventLog};
use hubbridge_protocol::guard::ReentrancyGuard;
use hubbridge_protocol::identity::plan_wrapped_asset;
use hubbridge_protocol::ledger::{AssetSpec, Ledger};
use hubbridge_protocol::logging::{init_logging, LogFormat};
use hubbridge_protocol::{Account, Address, Amount, BridgeError, ChainId, Origin};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const HUB: ChainId = ChainId(1);
const REMOTE: ChainId = ChainId(2);
const ADAPTER: Address = Address([0xad; 20]);
const TOKEN: Address = Address([0x70; 20]);
const PAYER: Address = Address([0x0a; 20]);
const SENDER: Address = Address([0x5e; 20]);

/// Pays out of its own balance whenever its adapter delivers an unlock
/// payload.
struct Payer {
    account: Account,
    ledger: Arc<Ledger>,
    guard: ReentrancyGuard,
    events: Mutex<EventLog>,
}

impl Payer {
    fn listen(self: &Arc<Self>, adapter: &dyn Adapter) -> Result<(), AdapterError> {
        let receiver: Arc<dyn MessageReceiver> = self.clone();
        adapter.bind(self.account.origin(adapter.address()), Arc::downgrade(&receiver))
    }

    fn top_up(&self, amount: u64) -> anyhow::Result<()> {
        self.ledger
            .mint(self.account.origin(TOKEN), PAYER, Amount::from(amount))?;
        Ok(())
    }
}

impl MessageReceiver for Payer {
    fn address(&self) -> Address {
        PAYER
    }

    fn receive_message(
        &self,
        origin: Origin,
        _src_chain_id: ChainId,
        _src_sender: Address,
        payload: &[u8],
    ) -> Result<(), BridgeError> {
        let _entered = self.guard.enter()?;
        if origin.sender_for(self.ledger.id(), PAYER) != Some(ADAPTER) {
            return Err(BridgeError::Unauthorized(origin.sender()));
        }
        let message = UnlockPayload::decode(payload)?;
        self.ledger.transfer(
            self.account.origin(message.remote_asset),
            message.recipient,
            message.amount,
        )?;
        self.events.lock().emit(
            PAYER,
            BridgeEvent::Unlocked {
                asset: message.remote_asset,
                recipient: message.recipient,
                amount: message.amount,
            },
        );
        Ok(())
    }
}

fn payer_with(balance: u64) -> anyhow::Result<Arc<Payer>> {
    let ledger = Arc::new(Ledger::new(REMOTE));
    let account = ledger.open_account(PAYER)?;
    ledger.deploy(TOKEN, AssetSpec::new("Token", "TOK", 18, PAYER))?;
    let payer = Arc::new(Payer {
        account,
        ledger,
        guard: ReentrancyGuard::new(),
        events: Mutex::new(EventLog::new()),
    });
    payer.top_up(balance)?;
    Ok(payer)
}

/// A hub ledger with a sending contract's account on it.
fn hub_sender() -> anyhow::Result<(Ledger, Account)> {
    let ledger = Ledger::new(HUB);
    let sender = ledger.open_account(SENDER)?;
    Ok((ledger, sender))
}

fn unlock(recipient: u8, amount: u64) -> Vec<u8> {
    UnlockPayload {
        remote_asset: TOKEN,
        recipient: Address::new([recipient; 20]),
        amount: Amount::from(amount),
    }
    .encode()
    .expect("encode")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn fee_schedule_from_disk_prices_messages() -> anyhow::Result<()> {
    init_logging("hubbridge_protocol=debug", LogFormat::Json);

    let path = std::env::temp_dir().join(format!("hubbridge-fees-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "base_fee": 500, "fee_per_byte": 2 }"#)?;
    let fees = FeeSchedule::load(&path)?;
    std::fs::remove_file(&path)?;

    let (hub_ledger, sender) = hub_sender()?;
    let net = LoopbackNetwork::new();
    let hub = net.attach(&hub_ledger, ADAPTER, fees)?;
    net.attach(&Ledger::new(REMOTE), ADAPTER, fees)?;

    let payload = unlock(0xb0, 1);
    let quote = hub.estimate_fee(REMOTE, PAYER, &payload)?;
    assert_eq!(quote, Amount::from(500u64 + 2 * payload.len() as u64));

    let err = hub
        .send(sender.origin(ADAPTER), REMOTE, PAYER, payload.clone(), quote - Amount::one())
        .unwrap_err();
    assert!(matches!(err, AdapterError::InsufficientFee { .. }));
    hub.send(sender.origin(ADAPTER), REMOTE, PAYER, payload, quote)?;
    assert_eq!(hub.collected_fees(), quote);
    Ok(())
}

#[test]
fn reordered_delivery_settles_every_message() -> anyhow::Result<()> {
    let (hub_ledger, sender) = hub_sender()?;
    let payer = payer_with(100)?;
    let net = LoopbackNetwork::new();
    let hub = net.attach(&hub_ledger, ADAPTER, FeeSchedule::free())?;
    let remote = net.attach(&payer.ledger, ADAPTER, FeeSchedule::free())?;
    payer.listen(remote.as_ref())?;

    let ids: Vec<_> = (1..=4u8)
        .map(|i| {
            hub.send(
                sender.origin(ADAPTER),
                REMOTE,
                PAYER,
                unlock(i, u64::from(i) * 10),
                Amount::zero(),
            )
        })
        .collect::<Result<_, _>>()?;
    for id in ids.iter().rev() {
        net.deliver(id)?;
    }

    for i in 1..=4u8 {
        assert_eq!(
            payer.ledger.balance_of(&TOKEN, &Address::new([i; 20])),
            Amount::from(u64::from(i) * 10)
        );
    }
    assert_eq!(payer.ledger.balance_of(&TOKEN, &PAYER), Amount::zero());
    let delivered: Vec<_> = net.delivered().into_iter().map(|e| e.id).collect();
    assert_eq!(delivered, ids.into_iter().rev().collect::<Vec<_>>());
    assert!(net.delivered().iter().all(|e| e.sender == SENDER));
    assert_eq!(payer.events.lock().len(), 4);
    Ok(())
}

#[test]
fn failing_receiver_keeps_message_for_retry() -> anyhow::Result<()> {
    let (hub_ledger, sender) = hub_sender()?;
    let payer = payer_with(10)?;
    let net = LoopbackNetwork::new();
    let hub = net.attach(&hub_ledger, ADAPTER, FeeSchedule::free())?;
    let remote = net.attach(&payer.ledger, ADAPTER, FeeSchedule::free())?;
    payer.listen(remote.as_ref())?;

    let id = hub.send(sender.origin(ADAPTER), REMOTE, PAYER, unlock(0xb0, 25), Amount::zero())?;
    let err = net.deliver(&id).unwrap_err();
    assert!(matches!(
        err,
        AdapterError::Rejected { ref reason, .. } if matches!(**reason, BridgeError::Ledger(_))
    ));
    assert_eq!(net.pending_count(), 1);
    assert!(payer.events.lock().is_empty());

    // Top the payer up and the same message goes through.
    payer.top_up(15)?;
    net.deliver(&id)?;
    assert_eq!(
        payer.ledger.balance_of(&TOKEN, &Address::new([0xb0; 20])),
        Amount::from(25u64)
    );
    Ok(())
}

#[test]
fn receivers_tell_their_adapter_from_direct_callers() -> anyhow::Result<()> {
    let payer = payer_with(50)?;
    let net = LoopbackNetwork::new();
    let remote = net.attach(&payer.ledger, ADAPTER, FeeSchedule::free())?;
    payer.listen(remote.as_ref())?;

    let stranger = payer.ledger.open_account(SENDER)?;
    let err = payer
        .receive_message(stranger.origin(PAYER), HUB, SENDER, &unlock(0x66, 50))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(SENDER)));

    // The adapter's address on a look-alike ledger is no better.
    let twin = Ledger::new(REMOTE).open_account(ADAPTER)?;
    let err = payer
        .receive_message(twin.origin(PAYER), HUB, SENDER, &unlock(0x66, 50))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(ADAPTER)));

    assert_eq!(payer.ledger.balance_of(&TOKEN, &PAYER), Amount::from(50u64));
    Ok(())
}

#[test]
fn planned_address_can_be_deployed_exactly_once() -> anyhow::Result<()> {
    let factory = Address::new([0xfa; 20]);
    let plan = plan_wrapped_asset(factory, REMOTE, TOKEN, ADAPTER);
    let again = plan_wrapped_asset(factory, REMOTE, TOKEN, ADAPTER);
    assert_eq!(plan, again);

    let hub_ledger = Ledger::new(HUB);
    let owner = hub_ledger.open_account(factory)?;
    hub_ledger.deploy(plan.address, AssetSpec::new("", "", 18, factory))?;
    assert!(hub_ledger
        .deploy(plan.address, AssetSpec::new("", "", 18, factory))
        .is_err());
    hub_ledger.set_metadata(owner.origin(plan.address), "Wrapped".into(), "wTOK".into())?;
    assert_eq!(hub_ledger.metadata(&plan.address)?.symbol, "wTOK");
    Ok(())
}
