use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::mux::{ListenerId, TopicMux};
use super::transport::{MqttTransport, Transport, TransportEvent};
use crate::binding::{BindingSpec, BindingState, StreamSource};
use crate::binding::buffer::Snapshot;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::payload::codec;

/// Connectivity of the shared broker link, published over a watch channel so
/// consumers can render it without asking.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Offline,
    Errored,
    Closed,
}

/// Identifies one registered binding inside the hub.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

type CommandReply = oneshot::Sender<Result<(), LinkError>>;
type RegisterReply = oneshot::Sender<Result<(BindingId, watch::Receiver<BindingState>), LinkError>>;

enum HubCommand {
    Register {
        spec: BindingSpec,
        reply: RegisterReply,
    },
    Deactivate {
        binding: BindingId,
    },
    SendCommand {
        target: String,
        payload: Value,
        reply: CommandReply,
    },
}

struct BindingRecord {
    state: Arc<watch::Sender<BindingState>>,
    /// Present only for live telemetry bindings
    listener: Option<(String, ListenerId)>,
}

/// The actor owning the transport, the multiplexer and all binding state.
///
/// Everything it does runs on one task: listener registration and removal
/// are totally ordered against dispatch, so a binding registered before a
/// message reaches the hub sees that message, and a binding deactivated
/// before the hub processes a message does not.
pub struct LinkHub {
    config: LinkConfig,
    transport: Box<dyn Transport>,
    mux: TopicMux,
    bindings: HashMap<BindingId, BindingRecord>,
    next_binding: u64,
    commands: mpsc::Receiver<HubCommand>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Publishes accepted by the transport, waiting for a packet id
    awaiting_pkid: VecDeque<CommandReply>,
    /// Publishes on the wire, keyed by packet id, waiting for a PubAck
    pending_acks: HashMap<u16, CommandReply>,
}

impl LinkHub {
    /// Spawns the hub on its own task and returns the handle to it.
    pub fn spawn(config: LinkConfig, transport: Box<dyn Transport>) -> LinkHandle {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let hub = LinkHub {
            config,
            transport,
            mux: TopicMux::new(),
            bindings: HashMap::new(),
            next_binding: 0,
            commands: command_rx,
            state: state_tx,
            cancel: cancel.clone(),
            awaiting_pkid: VecDeque::new(),
            pending_acks: HashMap::new(),
        };
        tokio::spawn(hub.run());

        LinkHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
        }
    }

    async fn run(mut self) {
        info!(
            "Link hub started for {}:{}",
            self.config.broker.host, self.config.broker.port
        );
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // every handle dropped, nothing can reach us anymore
                    None => break,
                },
                event = self.transport.next_event() => self.handle_event(event).await,
            }
        }
        self.finish().await;
    }

    async fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { spec, reply } => {
                let result = self.register_binding(spec).await;
                let _ = reply.send(result);
            }
            HubCommand::Deactivate { binding } => self.deactivate_binding(binding).await,
            HubCommand::SendCommand {
                target,
                payload,
                reply,
            } => self.send_command(target, payload, reply).await,
        }
    }

    async fn register_binding(
        &mut self,
        spec: BindingSpec,
    ) -> Result<(BindingId, watch::Receiver<BindingState>), LinkError> {
        let id = BindingId(self.next_binding);
        self.next_binding += 1;

        let initial = BindingState::initial(
            &spec,
            &self.config.topics,
            self.config.default_buffer_capacity,
        );
        let (state_tx, state_rx) = watch::channel(initial);
        let state_tx = Arc::new(state_tx);
        let mut record = BindingRecord {
            state: state_tx.clone(),
            listener: None,
        };

        let wants_listener = !matches!(
            *state_tx.borrow(),
            BindingState::Disabled | BindingState::Stream { .. }
        );
        // telemetry modes come up live only with a complete spec; the topic
        // is guaranteed to resolve for them
        if wants_listener {
            if let Some(topic) = spec.resolve_topic(&self.config.topics) {
                let fold = state_tx.clone();
                let (listener_id, first) = self.mux.add_listener(
                    &topic,
                    Box::new(move |topic, payload| {
                        fold.send_modify(|state| state.apply(topic, payload));
                    }),
                );
                if first {
                    if let Err(e) = self.transport.subscribe(&topic).await {
                        warn!("Subscribe to '{}' failed: {}", topic, e);
                        self.mux.remove_listener(&topic, listener_id);
                        return Err(e);
                    }
                }
                debug!("Binding {:?} registered on '{}'", id, topic);
                record.listener = Some((topic, listener_id));
            }
        } else {
            debug!("Binding {:?} registered in resting state (incomplete spec or stream)", id);
        }

        self.bindings.insert(id, record);
        Ok((id, state_rx))
    }

    async fn deactivate_binding(&mut self, id: BindingId) {
        let Some(record) = self.bindings.remove(&id) else {
            return;
        };
        if let Some((topic, listener_id)) = record.listener {
            let last = self.mux.remove_listener(&topic, listener_id);
            if last {
                if let Err(e) = self.transport.unsubscribe(&topic).await {
                    warn!("Unsubscribe from '{}' failed: {}", topic, e);
                }
            }
        }
        record.state.send_replace(BindingState::Disabled);
        debug!("Binding {:?} deactivated", id);
    }

    async fn send_command(&mut self, target: String, payload: Value, reply: CommandReply) {
        if *self.state.borrow() != ConnectionState::Connected {
            let _ = reply.send(Err(LinkError::NotConnected));
            return;
        }
        let Some(topic) = self.config.topics.command_topic(&target) else {
            let _ = reply.send(Err(LinkError::UnresolvedTarget(target)));
            return;
        };
        debug!("Dispatching command for '{}' on '{}'", target, topic);
        match self.transport.publish(&topic, codec::encode(&payload)).await {
            // resolved later, once the broker acknowledges the packet
            Ok(()) => self.awaiting_pkid.push_back(reply),
            Err(e) => {
                warn!("Publish to '{}' failed: {}", topic, e);
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { session_present } => {
                let resumed = *self.state.borrow() != ConnectionState::Connecting;
                self.state.send_replace(ConnectionState::Connected);
                info!(
                    "Broker link up (resumed: {}, session present: {})",
                    resumed, session_present
                );
                if resumed {
                    self.resubscribe_all().await;
                }
            }
            TransportEvent::Message { topic, payload } => {
                self.mux.dispatch(&topic, &payload);
            }
            TransportEvent::PublishQueued { pkid } => {
                if let Some(reply) = self.awaiting_pkid.pop_front() {
                    self.pending_acks.insert(pkid, reply);
                }
            }
            TransportEvent::PubAck { pkid } => {
                if let Some(reply) = self.pending_acks.remove(&pkid) {
                    let _ = reply.send(Ok(()));
                }
            }
            TransportEvent::Offline => {
                info!("Broker sent disconnect, link offline");
                self.state.send_replace(ConnectionState::Offline);
                self.fail_pending(|| LinkError::ConnectionLost);
            }
            TransportEvent::ConnectionLost { reason } => {
                let next = if *self.state.borrow() == ConnectionState::Connecting {
                    ConnectionState::Errored
                } else {
                    ConnectionState::Reconnecting
                };
                warn!("Broker link lost ({}), now {:?}", reason, next);
                self.state.send_replace(next);
                // in-flight publishes are failed, not retried; the caller
                // decides whether to resend after the link comes back
                self.fail_pending(|| LinkError::ConnectionLost);
            }
        }
    }

    /// One subscribe per topic in the registry, regardless of listener
    /// count, so bindings never learn a disconnect happened.
    async fn resubscribe_all(&mut self) {
        let topics: Vec<String> = self.mux.topics().map(str::to_string).collect();
        for topic in topics {
            if let Err(e) = self.transport.subscribe(&topic).await {
                warn!("Resubscribe to '{}' failed: {}", topic, e);
            }
        }
    }

    fn fail_pending(&mut self, error: impl Fn() -> LinkError) {
        for reply in self.awaiting_pkid.drain(..) {
            let _ = reply.send(Err(error()));
        }
        for (_, reply) in self.pending_acks.drain() {
            let _ = reply.send(Err(error()));
        }
    }

    async fn finish(mut self) {
        self.fail_pending(|| LinkError::Closed);
        for (_, record) in self.bindings.drain() {
            record.state.send_replace(BindingState::Disabled);
        }
        self.mux.clear();
        self.transport.disconnect().await;
        self.state.send_replace(ConnectionState::Closed);
        info!("Link hub shut down");
    }
}

/// Cloneable handle to a running [`LinkHub`].
///
/// This is the whole consumer-facing surface: register a binding, send a
/// command, watch connectivity, shut down.
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::Sender<HubCommand>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl LinkHandle {
    /// Builds the MQTT transport from the config and spawns the hub.
    pub fn connect(config: LinkConfig) -> Self {
        let transport = MqttTransport::connect(&config.broker);
        LinkHub::spawn(config, Box::new(transport))
    }

    /// Spawns the hub over an injected transport; how tests run the whole
    /// layer against a scripted fake.
    pub fn spawn_with_transport(config: LinkConfig, transport: Box<dyn Transport>) -> Self {
        LinkHub::spawn(config, transport)
    }

    /// Registers a binding and hands back the live view on it.
    ///
    /// Incomplete specs (no topic, empty path list) are accepted and come
    /// back in the disabled resting state without touching the wire.
    pub async fn register_binding(&self, spec: BindingSpec) -> Result<BindingHandle, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Register {
                spec,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::Closed)?;
        let (id, state) = reply_rx.await.map_err(|_| LinkError::Closed)??;
        Ok(BindingHandle {
            id,
            state,
            commands: self.commands.clone(),
            released: false,
        })
    }

    /// Publishes a command to the device's control topic and resolves once
    /// the broker acknowledges delivery.
    ///
    /// Fails fast with [`LinkError::NotConnected`] while the link is down
    /// and [`LinkError::UnresolvedTarget`] when no topic can be derived;
    /// neither touches the wire.
    pub async fn send_command(&self, target: &str, payload: Value) -> Result<(), LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::SendCommand {
                target: target.to_string(),
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LinkError::Closed)?;
        reply_rx.await.map_err(|_| LinkError::Closed)?
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch receiver for connectivity, for consumers that render it live.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stops the hub, tears down the transport and fails everything still
    /// pending. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// A consumer's live subscription.
///
/// Dropping the handle deactivates the binding (the subscription is released
/// and the topic unsubscribed once its last listener is gone), so holding
/// the handle *is* holding the subscription.
pub struct BindingHandle {
    id: BindingId,
    state: watch::Receiver<BindingState>,
    commands: mpsc::Sender<HubCommand>,
    released: bool,
}

impl BindingHandle {
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Current binding state, cloned out of the watch channel.
    pub fn snapshot(&self) -> BindingState {
        self.state.borrow().clone()
    }

    /// Latest projected value of an object-mode binding.
    pub fn object_value(&self) -> Option<Value> {
        self.state.borrow().object_value().cloned()
    }

    /// Buffered snapshots of a series-mode binding, oldest first.
    pub fn series(&self) -> Vec<Snapshot> {
        self.state
            .borrow()
            .series()
            .map(|buffer| buffer.to_vec())
            .unwrap_or_default()
    }

    pub fn stream_source(&self) -> Option<StreamSource> {
        self.state.borrow().stream_source().cloned()
    }

    pub fn is_disabled(&self) -> bool {
        self.state.borrow().is_disabled()
    }

    /// Waits for the next state change (new snapshot, new object value, or
    /// deactivation).
    pub async fn changed(&mut self) -> Result<(), LinkError> {
        self.state.changed().await.map_err(|_| LinkError::Closed)
    }

    /// Explicitly deactivates the binding. Queued before any registration
    /// that follows it on the same handle, so replacing a binding never
    /// double-buffers.
    pub async fn deactivate(mut self) {
        self.released = true;
        let _ = self
            .commands
            .send(HubCommand::Deactivate { binding: self.id })
            .await;
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.commands.try_send(HubCommand::Deactivate { binding: self.id }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                // the channel is congested; the release must still land,
                // or the listener and its subscription leak for the rest
                // of the hub's life
                let commands = self.commands.clone();
                let id = self.id;
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    runtime.spawn(async move {
                        if commands.send(command).await.is_err() {
                            debug!("Binding {:?} outlived the hub, nothing to release", id);
                        }
                    });
                } else {
                    debug!("Binding {:?} dropped outside the runtime", id);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // hub already gone, its shutdown disabled every binding
            }
        }
    }
}

impl Drop for BindingHandle {
    fn drop(&mut self) {
        self.release();
    }
}
