//! End-to-end bridge tests: lock on the remote chain, mint on the hub,
//! bridge back, unlock. Every message goes through the loopback transport.

mod common;

use common::*;
use hubbridge_contracts::WrappedAsset;
use hubbridge_protocol::adapter::MessageReceiver;
use hubbridge_protocol::codec::LockPayload;
use hubbridge_protocol::config::FeeSchedule;
use hubbridge_protocol::events::BridgeEvent;

#[test]
fn alice_round_trip() -> anyhow::Result<()> {
    let world = World::standard()?;
    assert_eq!(world.remote_balance(&ALICE), units(1000));

    // 1. Lock 500 on the remote chain.
    world.lock(ALICE, 500, ALICE)?;
    assert_eq!(world.vault.custody_of(&TOKEN), units(500));
    assert_eq!(world.remote_balance(&ALICE), units(500));
    assert_eq!(world.factory.asset_count(), 0);

    // 2. Deliver: the wrapped asset appears with the remote name and symbol.
    assert_eq!(world.net.deliver_all()?, 1);
    let wrapped = world
        .factory
        .asset(&world.wrapped())
        .expect("wrapped asset created");
    assert_eq!(wrapped.name(), "Remote Dollar");
    assert_eq!(wrapped.symbol(), "rUSD");
    assert_eq!(world.wrapped_balance(&ALICE), units(500));

    // 3. Bridge 200 back.
    world.bridge_back(ALICE, 200, ALICE)?;
    assert_eq!(world.wrapped_balance(&ALICE), units(300));
    assert_eq!(world.vault.custody_of(&TOKEN), units(500));

    // 4. Deliver the unlock.
    assert_eq!(world.net.deliver_all()?, 1);
    assert_eq!(world.vault.custody_of(&TOKEN), units(300));
    assert_eq!(world.remote_balance(&ALICE), units(700));
    assert_eq!(world.wrapped_supply(), units(300));
    assert_eq!(world.net.pending_count(), 0);
    Ok(())
}

#[test]
fn each_transition_emits_its_event_once() -> anyhow::Result<()> {
    let world = World::standard()?;
    world.lock(ALICE, 500, ALICE)?;
    world.net.deliver_all()?;
    world.bridge_back(ALICE, 200, BOB)?;
    world.net.deliver_all()?;

    let vault_events: Vec<&str> = world.vault.events().iter().map(|e| e.name()).collect();
    assert_eq!(vault_events, vec!["FactoryRegistered", "Locked", "Unlocked"]);
    let factory_events: Vec<&str> = world.factory.events().iter().map(|e| e.name()).collect();
    assert_eq!(
        factory_events,
        vec![
            "VaultRegistered",
            "AssetCreated",
            "AssetMinted",
            "BurnedAndBridgedBack"
        ]
    );

    let created = world.factory.events().into_iter().find_map(|e| match e {
        BridgeEvent::AssetCreated {
            wrapped_asset,
            adapter,
            remote_chain_id,
            remote_asset,
            ..
        } => Some((wrapped_asset, adapter, remote_chain_id, remote_asset)),
        _ => None,
    });
    assert_eq!(created, Some((world.wrapped(), ADAPTER, REMOTE, TOKEN)));
    assert_eq!(world.remote_balance(&BOB), units(200));
    Ok(())
}

#[test]
fn predicted_address_matches_creation() -> anyhow::Result<()> {
    let world = World::standard()?;
    let predicted = world.factory.compute_address(REMOTE, TOKEN, ADAPTER);
    let key = world.factory.compute_identity_key(REMOTE, TOKEN, ADAPTER);
    assert_eq!(world.factory.wrapped_asset(&key), None);

    world.lock(ALICE, 1, ALICE)?;
    world.net.deliver_all()?;

    assert_eq!(world.factory.wrapped_asset(&key), Some(predicted));
    assert!(world.hub_ledger.contains(&predicted));
    assert_eq!(world.factory.adapter_of(&predicted), Some(ADAPTER));
    Ok(())
}

fn two_locks(deliver_second_first: bool) -> anyhow::Result<World> {
    let world = World::standard()?;
    let first = world.lock(ALICE, 300, ALICE)?;
    let second = world.lock(ALICE, 200, BOB)?;
    if deliver_second_first {
        world.net.deliver(&second)?;
        world.net.deliver(&first)?;
    } else {
        world.net.deliver(&first)?;
        world.net.deliver(&second)?;
    }
    Ok(world)
}

#[test]
fn delivery_order_does_not_matter() -> anyhow::Result<()> {
    for reversed in [false, true] {
        let world = two_locks(reversed)?;
        assert_eq!(world.factory.asset_count(), 1);
        assert_eq!(world.wrapped_balance(&ALICE), units(300));
        assert_eq!(world.wrapped_balance(&BOB), units(200));
        assert_eq!(world.wrapped_supply(), units(500));
        assert_eq!(world.vault.custody_of(&TOKEN), units(500));

        let created = world
            .factory
            .events()
            .iter()
            .filter(|e| matches!(e, BridgeEvent::AssetCreated { .. }))
            .count();
        assert_eq!(created, 1);
    }
    Ok(())
}

#[test]
fn fee_on_transfer_asset_mints_what_custody_received() -> anyhow::Result<()> {
    // 2% of every transfer is burned.
    let world = World::new(FeeSchedule::free(), plain_token().with_transfer_fee(200))?;
    world.lock(ALICE, 500, ALICE)?;

    let pending = world.net.pending();
    let instruction = LockPayload::decode(&pending[0].payload)?;
    assert_eq!(instruction.amount, units(490));
    assert_eq!(world.vault.custody_of(&TOKEN), units(490));
    assert!(world.vault.events().iter().any(|e| matches!(
        e,
        BridgeEvent::Locked { amount, .. } if *amount == units(490)
    )));

    world.net.deliver_all()?;
    assert_eq!(world.wrapped_balance(&ALICE), units(490));

    // Unlocking the whole position drains custody exactly; the recipient
    // bears the transfer fee on the way out.
    world.bridge_back(ALICE, 490, ALICE)?;
    world.net.deliver_all()?;
    assert!(world.vault.custody_of(&TOKEN).is_zero());
    assert_eq!(world.remote_balance(&ALICE), units(500 + 481));
    Ok(())
}

#[test]
fn paid_transport_collects_quoted_fees() -> anyhow::Result<()> {
    let fees = FeeSchedule {
        base_fee: 1000,
        fee_per_byte: 10,
    };
    let world = World::new(fees, plain_token())?;
    let quote = world.vault.quote_lock(&world.lock_request(500, ALICE))?;
    world.lock(ALICE, 500, ALICE)?;
    assert_eq!(world.remote_adapter.collected_fees(), quote);

    world.net.deliver_all()?;
    world.bridge_back(ALICE, 100, ALICE)?;
    assert_eq!(world.hub_adapter.collected_fees(), units(1000 + 10 * 72));
    Ok(())
}

#[test]
fn wrapped_asset_behaves_like_a_token() -> anyhow::Result<()> {
    let world = World::standard()?;
    world.lock(ALICE, 500, ALICE)?;
    world.net.deliver_all()?;

    let wrapped: std::sync::Arc<WrappedAsset> = world
        .factory
        .asset(&world.wrapped())
        .expect("wrapped asset created");
    wrapped.transfer(world.hub(ALICE).origin(wrapped.address()), BOB, units(100))?;
    assert_eq!(wrapped.balance_of(&BOB), units(100));

    // Bob got his wrapped units from Alice, not from a lock, and can still
    // redeem them.
    world.bridge_back(BOB, 100, BOB)?;
    world.net.deliver_all()?;
    assert_eq!(world.remote_balance(&BOB), units(100));
    assert_eq!(world.vault.custody_of(&TOKEN), units(400));
    assert_eq!(wrapped.factory(), world.factory.address());
    Ok(())
}

#[test]
fn event_log_exports_as_json() -> anyhow::Result<()> {
    let world = World::standard()?;
    world.lock(ALICE, 10, ALICE)?;
    let json = world.vault.event_log().to_json()?;
    let records: serde_json::Value = serde_json::from_str(&json)?;
    let records = records.as_array().expect("array of records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["sequence"], 0);
    assert_eq!(records[1]["sequence"], 1);
    let locked = &records[1]["event"]["Locked"];
    assert_eq!(locked["sender"], ALICE.to_hex());
    assert_eq!(locked["asset"], TOKEN.to_hex());
    assert_eq!(records[1]["emitter"], VAULT.to_hex());
    Ok(())
}
