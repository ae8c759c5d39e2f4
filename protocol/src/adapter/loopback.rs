//! # Loopback Transport
//!
//! An in-process [`Adapter`]: one shared [`LoopbackNetwork`] queue, one
//! [`LoopbackAdapter`] endpoint per chain. `send` only enqueues. Nothing is
//! delivered until someone calls [`LoopbackNetwork::deliver`] (or one of
//! its siblings), which lets tests choose the order, drop messages, or
//! replay them.
//!
//! Authenticity comes from accounts. Each endpoint opens its own account
//! on its chain's [`Ledger`] when it is attached. `send` stamps the sender
//! proven by the caller's [`Origin`], and delivery hands the receiver an
//! origin minted from the destination endpoint's account, so
//! `src_chain_id`, `src_sender` and the delivering adapter are always
//! truthful.
//!
//! Receivers bind themselves with their own origin and are held weakly. A
//! contract that has been dropped simply stops receiving, and its address
//! can be bound again.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{Adapter, AdapterError, MessageReceiver};
use crate::account::{Account, LedgerId, Origin};
use crate::config::{FeeSchedule, MESSAGE_ID_DOMAIN};
use crate::crypto::sha256_multi;
use crate::error::BridgeError;
use crate::events::MessageId;
use crate::ledger::Ledger;
use crate::types::{Address, Amount, ChainId};

/// A message in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Transport message id.
    pub id: MessageId,
    /// Chain the message was sent from.
    pub src_chain_id: ChainId,
    /// Contract that called `send`.
    pub sender: Address,
    /// Chain the message is addressed to.
    pub dst_chain_id: ChainId,
    /// Contract that should receive it.
    pub receiver: Address,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Fee paid at send time.
    pub fee: Amount,
}

struct Endpoint {
    account: Account,
    receivers: HashMap<Address, Weak<dyn MessageReceiver>>,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<ChainId, Endpoint>,
    pending: VecDeque<Envelope>,
    delivered: Vec<Envelope>,
    nonce: u64,
}

/// Shared message queue connecting loopback endpoints.
#[derive(Default)]
pub struct LoopbackNetwork {
    state: Mutex<NetworkState>,
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &state.endpoints.len())
            .field("pending", &state.pending.len())
            .field("delivered", &state.delivered.len())
            .finish()
    }
}

impl LoopbackNetwork {
    /// A network with no endpoints.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates the endpoint for `ledger`'s chain at `address`, opening the
    /// endpoint's account there.
    ///
    /// # Errors
    ///
    /// [`AdapterError::DuplicateEndpoint`] if the chain already has one,
    /// [`AdapterError::Ledger`] if `address` already has an account.
    pub fn attach(
        self: &Arc<Self>,
        ledger: &Ledger,
        address: Address,
        fees: FeeSchedule,
    ) -> Result<Arc<LoopbackAdapter>, AdapterError> {
        let chain_id = ledger.chain_id();
        let mut state = self.state.lock();
        if state.endpoints.contains_key(&chain_id) {
            return Err(AdapterError::DuplicateEndpoint(chain_id));
        }
        let account = ledger.open_account(address)?;
        state.endpoints.insert(
            chain_id,
            Endpoint {
                account,
                receivers: HashMap::new(),
            },
        );
        tracing::debug!(chain = %chain_id, adapter = %address, "loopback endpoint attached");
        Ok(Arc::new(LoopbackAdapter {
            address,
            chain_id,
            ledger_id: ledger.id(),
            fees,
            network: Arc::clone(self),
            collected_fees: Mutex::new(Amount::zero()),
        }))
    }

    /// Messages waiting for delivery, in send order.
    pub fn pending(&self) -> Vec<Envelope> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Number of messages waiting for delivery.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Messages delivered successfully, in delivery order.
    pub fn delivered(&self) -> Vec<Envelope> {
        self.state.lock().delivered.clone()
    }

    /// Delivers the pending message `id`, regardless of its queue position.
    ///
    /// If the receiver rejects it, the message goes back where it was and
    /// [`AdapterError::Rejected`] carries the receiver's error.
    pub fn deliver(&self, id: &MessageId) -> Result<(), AdapterError> {
        let (position, envelope, origin, receiver) = {
            let mut state = self.state.lock();
            let position = state
                .pending
                .iter()
                .position(|e| &e.id == id)
                .ok_or_else(|| AdapterError::UnknownMessage(hex::encode(id)))?;
            let (origin, receiver) = Self::route(&state, &state.pending[position])?;
            let envelope = state
                .pending
                .remove(position)
                .ok_or_else(|| AdapterError::UnknownMessage(hex::encode(id)))?;
            (position, envelope, origin, receiver)
        };

        match Self::dispatch(origin, &receiver, &envelope) {
            Ok(()) => {
                self.state.lock().delivered.push(envelope);
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.lock();
                let at = position.min(state.pending.len());
                state.pending.insert(at, envelope);
                Err(e)
            }
        }
    }

    /// Delivers the oldest pending message. Returns its id, or `None` if
    /// the queue is empty.
    pub fn deliver_next(&self) -> Result<Option<MessageId>, AdapterError> {
        let next = self.state.lock().pending.front().map(|e| e.id);
        match next {
            Some(id) => self.deliver(&id).map(|()| Some(id)),
            None => Ok(None),
        }
    }

    /// Delivers pending messages oldest-first until the queue is empty or
    /// one is rejected. Returns how many were delivered.
    pub fn deliver_all(&self) -> Result<usize, AdapterError> {
        let mut count = 0;
        while self.deliver_next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Delivers an already-delivered message again. Real transports can do
    /// this; the bridge core does not defend against it.
    pub fn redeliver(&self, id: &MessageId) -> Result<(), AdapterError> {
        let (envelope, origin, receiver) = {
            let state = self.state.lock();
            let envelope = state
                .delivered
                .iter()
                .find(|e| &e.id == id)
                .cloned()
                .ok_or_else(|| AdapterError::UnknownMessage(hex::encode(id)))?;
            let (origin, receiver) = Self::route(&state, &envelope)?;
            (envelope, origin, receiver)
        };
        tracing::warn!(message_id = %hex::encode(id), "redelivering message");
        Self::dispatch(origin, &receiver, &envelope)?;
        self.state.lock().delivered.push(envelope);
        Ok(())
    }

    /// Removes a pending message without delivering it, the way a lossy
    /// transport would.
    pub fn drop_message(&self, id: &MessageId) -> Result<Envelope, AdapterError> {
        let mut state = self.state.lock();
        let position = state
            .pending
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| AdapterError::UnknownMessage(hex::encode(id)))?;
        tracing::warn!(message_id = %hex::encode(id), "message dropped");
        state
            .pending
            .remove(position)
            .ok_or_else(|| AdapterError::UnknownMessage(hex::encode(id)))
    }

    fn route(
        state: &NetworkState,
        envelope: &Envelope,
    ) -> Result<(Origin, Arc<dyn MessageReceiver>), AdapterError> {
        Self::lookup(state, envelope.dst_chain_id, envelope.receiver)
    }

    // The receiver bound at `receiver` on `chain_id`, with an origin from
    // that chain's endpoint addressed to it.
    fn lookup(
        state: &NetworkState,
        chain_id: ChainId,
        receiver: Address,
    ) -> Result<(Origin, Arc<dyn MessageReceiver>), AdapterError> {
        let endpoint = state.endpoints.get(&chain_id).ok_or(AdapterError::NoRoute(chain_id))?;
        let bound = endpoint
            .receivers
            .get(&receiver)
            .and_then(Weak::upgrade)
            .ok_or(AdapterError::UnknownReceiver { chain_id, receiver })?;
        Ok((endpoint.account.origin(receiver), bound))
    }

    // Called with no network lock held: receivers may send from inside
    // `receive_message`.
    fn dispatch(
        origin: Origin,
        receiver: &Arc<dyn MessageReceiver>,
        envelope: &Envelope,
    ) -> Result<(), AdapterError> {
        tracing::debug!(
            message_id = %hex::encode(envelope.id),
            src_chain = %envelope.src_chain_id,
            dst_chain = %envelope.dst_chain_id,
            receiver = %envelope.receiver,
            adapter = %origin.sender(),
            "delivering message"
        );
        receiver
            .receive_message(origin, envelope.src_chain_id, envelope.sender, &envelope.payload)
            .map_err(|reason| {
                tracing::warn!(
                    message_id = %hex::encode(envelope.id),
                    error = %reason,
                    "receiver rejected message"
                );
                AdapterError::Rejected {
                    message_id: hex::encode(envelope.id),
                    reason: Box::new(reason),
                }
            })
    }
}

/// One chain's endpoint on a [`LoopbackNetwork`].
pub struct LoopbackAdapter {
    address: Address,
    chain_id: ChainId,
    ledger_id: LedgerId,
    fees: FeeSchedule,
    network: Arc<LoopbackNetwork>,
    collected_fees: Mutex<Amount>,
}

impl std::fmt::Debug for LoopbackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackAdapter")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("fees", &self.fees)
            .finish()
    }
}

impl LoopbackAdapter {
    /// Registers `counterpart` on `chain_id` with the contract bound at
    /// `contract`, calling it as this endpoint. Holding the endpoint handle
    /// is the operator's authority to do so.
    ///
    /// # Errors
    ///
    /// [`AdapterError::UnknownReceiver`] if nothing is bound at `contract`,
    /// otherwise whatever the contract's registration returns.
    pub fn register_counterpart(
        self: &Arc<Self>,
        contract: Address,
        chain_id: ChainId,
        counterpart: Address,
    ) -> Result<(), BridgeError> {
        let (origin, receiver) = {
            let state = self.network.state.lock();
            LoopbackNetwork::lookup(&state, self.chain_id, contract)?
        };
        let adapter: Arc<dyn Adapter> = self.clone();
        tracing::info!(
            adapter = %self.address,
            chain = %self.chain_id,
            contract = %contract,
            remote_chain = %chain_id,
            counterpart = %counterpart,
            "registering counterpart"
        );
        receiver.register_counterpart(origin, adapter, chain_id, counterpart)
    }

    /// Total fees collected by `send`.
    pub fn collected_fees(&self) -> Amount {
        *self.collected_fees.lock()
    }

    /// The network this endpoint is attached to.
    pub fn network(&self) -> &Arc<LoopbackNetwork> {
        &self.network
    }

    fn message_id(
        &self,
        nonce: u64,
        sender: Address,
        dst_chain_id: ChainId,
        receiver: Address,
        payload: &[u8],
    ) -> MessageId {
        sha256_multi(&[
            MESSAGE_ID_DOMAIN,
            &self.chain_id.to_be_bytes(),
            &nonce.to_be_bytes(),
            sender.as_bytes(),
            &dst_chain_id.to_be_bytes(),
            receiver.as_bytes(),
            payload,
        ])
    }
}

impl Adapter for LoopbackAdapter {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn send(
        &self,
        origin: Origin,
        dst_chain_id: ChainId,
        receiver: Address,
        payload: Vec<u8>,
        fee: Amount,
    ) -> Result<MessageId, AdapterError> {
        let sender = origin
            .sender_for(self.ledger_id, self.address)
            .ok_or_else(|| AdapterError::foreign(&origin))?;
        let required = self.estimate_fee(dst_chain_id, receiver, &payload)?;
        if fee < required {
            return Err(AdapterError::InsufficientFee {
                required,
                provided: fee,
            });
        }

        let id = {
            let mut state = self.network.state.lock();
            let nonce = state.nonce;
            state.nonce += 1;
            let id = self.message_id(nonce, sender, dst_chain_id, receiver, &payload);
            state.pending.push_back(Envelope {
                id,
                src_chain_id: self.chain_id,
                sender,
                dst_chain_id,
                receiver,
                payload,
                fee,
            });
            id
        };
        {
            let mut collected = self.collected_fees.lock();
            *collected = collected.saturating_add(fee);
        }

        tracing::debug!(
            message_id = %hex::encode(id),
            src_chain = %self.chain_id,
            dst_chain = %dst_chain_id,
            fee = %fee,
            "message queued"
        );
        Ok(id)
    }

    fn estimate_fee(
        &self,
        dst_chain_id: ChainId,
        _receiver: Address,
        payload: &[u8],
    ) -> Result<Amount, AdapterError> {
        if !self.network.state.lock().endpoints.contains_key(&dst_chain_id) {
            return Err(AdapterError::NoRoute(dst_chain_id));
        }
        Ok(self.fees.quote(payload.len()))
    }

    fn bind(&self, origin: Origin, receiver: Weak<dyn MessageReceiver>) -> Result<(), AdapterError> {
        let caller = origin
            .sender_for(self.ledger_id, self.address)
            .ok_or_else(|| AdapterError::foreign(&origin))?;
        let claimed = receiver
            .upgrade()
            .map(|r| r.address())
            .ok_or(AdapterError::UnknownReceiver {
                chain_id: self.chain_id,
                receiver: caller,
            })?;
        if claimed != caller {
            return Err(AdapterError::ReceiverMismatch { claimed, caller });
        }

        let mut state = self.network.state.lock();
        let endpoint = state
            .endpoints
            .get_mut(&self.chain_id)
            .ok_or(AdapterError::NoRoute(self.chain_id))?;
        if endpoint
            .receivers
            .get(&caller)
            .is_some_and(|bound| bound.strong_count() > 0)
        {
            return Err(AdapterError::AlreadyBound(caller));
        }
        endpoint.receivers.insert(caller, receiver);
        tracing::debug!(chain = %self.chain_id, adapter = %self.address, receiver = %caller, "receiver bound");
        Ok(())
    }
}
