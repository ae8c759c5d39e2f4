//! # Audit Events
//!
//! Every successful state transition in the bridge emits exactly one event.
//! Contracts keep their own append-only [`EventLog`]; entries are numbered
//! from zero, timestamped, never edited, never removed. Each event is also
//! mirrored to `tracing` at `info` so operators see the same stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityKey;
use crate::types::{Address, Amount, ChainId};

/// Identifier returned by a transport for a dispatched message.
pub type MessageId = [u8; 32];

/// The audit trail of the bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// Factory side: `adapter` bound `vault` on `chain_id`.
    VaultRegistered {
        /// Adapter that registered (the caller).
        adapter: Address,
        /// Remote chain the vault lives on.
        chain_id: ChainId,
        /// The vault's address.
        vault: Address,
    },
    /// Vault side: `adapter` bound `factory` on `chain_id`.
    FactoryRegistered {
        /// Adapter that registered (the caller).
        adapter: Address,
        /// Hub chain the factory lives on.
        chain_id: ChainId,
        /// The factory's address.
        factory: Address,
    },
    /// A wrapped asset came into existence.
    AssetCreated {
        /// Registry key.
        identity_key: IdentityKey,
        /// Where it lives.
        wrapped_asset: Address,
        /// The remote chain it represents.
        remote_chain_id: ChainId,
        /// The remote asset it represents.
        remote_asset: Address,
        /// The adapter it is bound to.
        adapter: Address,
        /// Display name, fixed forever.
        name: String,
        /// Ticker, fixed forever.
        symbol: String,
    },
    /// Wrapped supply increased on an inbound lock instruction.
    AssetMinted {
        /// The wrapped asset.
        wrapped_asset: Address,
        /// Who received it.
        recipient: Address,
        /// How much.
        amount: Amount,
    },
    /// Wrapped supply decreased and an unlock instruction was sent.
    BurnedAndBridgedBack {
        /// The wrapped asset.
        wrapped_asset: Address,
        /// Whose balance was burned.
        sender: Address,
        /// Who receives the original on the remote side.
        recipient: Address,
        /// How much.
        amount: Amount,
        /// Transport message id.
        message_id: MessageId,
    },
    /// Custody increased and a mint instruction was sent.
    Locked {
        /// The original asset.
        asset: Address,
        /// Who deposited.
        sender: Address,
        /// Who receives the wrapped asset on the hub.
        recipient: Address,
        /// Amount actually credited to custody.
        amount: Amount,
        /// Destination (hub) chain.
        dst_chain_id: ChainId,
        /// Transport message id.
        message_id: MessageId,
    },
    /// Custody decreased on an inbound unlock instruction.
    Unlocked {
        /// The original asset.
        asset: Address,
        /// Who received it.
        recipient: Address,
        /// How much.
        amount: Amount,
    },
}

impl BridgeEvent {
    /// Short name, used as the `tracing` message.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::VaultRegistered { .. } => "VaultRegistered",
            BridgeEvent::FactoryRegistered { .. } => "FactoryRegistered",
            BridgeEvent::AssetCreated { .. } => "AssetCreated",
            BridgeEvent::AssetMinted { .. } => "AssetMinted",
            BridgeEvent::BurnedAndBridgedBack { .. } => "BurnedAndBridgedBack",
            BridgeEvent::Locked { .. } => "Locked",
            BridgeEvent::Unlocked { .. } => "Unlocked",
        }
    }
}

/// One entry in an [`EventLog`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at zero.
    pub sequence: u64,
    /// Contract that emitted it.
    pub emitter: Address,
    /// Wall-clock time of emission.
    pub emitted_at: DateTime<Utc>,
    /// The event itself.
    pub event: BridgeEvent,
}

/// Append-only event log owned by one contract.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and mirrors it to `tracing`.
    pub fn emit(&mut self, emitter: Address, event: BridgeEvent) {
        let sequence = self.records.len() as u64;
        tracing::info!(
            emitter = %emitter,
            sequence,
            event = ?event,
            "{}",
            event.name()
        );
        self.records.push(EventRecord {
            sequence,
            emitter,
            emitted_at: Utc::now(),
            event,
        });
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// The events without their envelopes, oldest first.
    pub fn events(&self) -> Vec<BridgeEvent> {
        self.records.iter().map(|r| r.event.clone()).collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The whole log as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records)
    }
}
