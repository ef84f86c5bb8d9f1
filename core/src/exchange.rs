// Copyright 2026 MX Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The public API surface: `Exchange`, its builder, the master/client boot
//! sequences, the control-protocol state machine, and the single-threaded
//! event loop that drives user callbacks.
//!
//! This is the module with no direct one-file analogue in the teacher
//! repo — it plays the role `p2p::serv::Server` plus `p2p::peers::Peers`
//! plus a chunk of `grin_servers::Server` play together there: the thing
//! that owns the listener, the peer directory, and the event dispatch loop,
//! generalized from grin's block/transaction gossip to MX's named
//! subscribe/broadcast model.

use crate::config::{derive_port, resolve_component_name, resolve_host, resolve_name, Config};
use crate::conn::{self, AwaitResult, Peer};
use crate::control::{self, ControlMessage};
use crate::directory::{Directory, FIRST_USER_TYPE};
use crate::error::{Error, ErrorEntry, Result, Severity};
use crate::event::{Event, PeerId};
use crate::listener::Listener;
use crate::timer::{self, TimerEngine, TimerHandler};

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tri-valued outcome of a session operation: `0` normal, `>0` notice (e.g.
/// already subscribed, handler replaced), `<0` error (e.g. reserved type
/// id).
pub type Status = i32;

pub const STATUS_OK: Status = 0;
pub const STATUS_REPLACED: Status = 1;
pub const STATUS_NOT_SUBSCRIBED: Status = 1;
pub const STATUS_RESERVED_TYPE: Status = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Client,
}

type LocalHandler = Box<dyn FnMut(PeerId, u32, u32, &[u8]) + Send>;
type ComponentHook = Box<dyn FnMut(PeerId) + Send>;
type SubscriberHook = Box<dyn FnMut(PeerId, u32) + Send>;
type MessageHook = Box<dyn FnMut(u32) + Send>;

struct LocalComponent {
    id: u16,
    name: String,
}

/// Builds an [`Exchange`] as either a master or a client. Callback hooks
/// must be installed on the builder, before boot, since `HelloReport`/
/// `SubscribeUpdate` traffic (and therefore hook invocations) can start
/// arriving the moment the listening socket or the master connection is up.
#[derive(Default)]
pub struct ExchangeBuilder {
    name: Option<String>,
    component_name: Option<String>,
    host: Option<String>,
    config: Config,
    on_new_component: Option<ComponentHook>,
    on_end_component: Option<ComponentHook>,
    on_new_subscriber: Option<SubscriberHook>,
    on_end_subscriber: Option<SubscriberHook>,
    on_new_message: Option<MessageHook>,
}

impl ExchangeBuilder {
    pub fn new() -> Self {
        ExchangeBuilder {
            config: Config::default(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn on_new_component(mut self, f: impl FnMut(PeerId) + Send + 'static) -> Self {
        self.on_new_component = Some(Box::new(f));
        self
    }

    pub fn on_end_component(mut self, f: impl FnMut(PeerId) + Send + 'static) -> Self {
        self.on_end_component = Some(Box::new(f));
        self
    }

    pub fn on_new_subscriber(mut self, f: impl FnMut(PeerId, u32) + Send + 'static) -> Self {
        self.on_new_subscriber = Some(Box::new(f));
        self
    }

    pub fn on_end_subscriber(mut self, f: impl FnMut(PeerId, u32) + Send + 'static) -> Self {
        self.on_end_subscriber = Some(Box::new(f));
        self
    }

    pub fn on_new_message(mut self, f: impl FnMut(u32) + Send + 'static) -> Self {
        self.on_new_message = Some(Box::new(f));
        self
    }

    /// Binds the name-derived port and boots as master. Fails if the name
    /// can't be resolved or the port is already taken.
    pub fn build_master(self) -> Result<Arc<Exchange>> {
        let exchange_name = resolve_name(self.name.as_deref())?;
        let exchange_port = derive_port(&exchange_name);
        let exchange_host = resolve_host(self.host.as_deref());
        let component_name = resolve_component_name(self.component_name.as_deref(), true)?;

        let (events_tx, events_rx) = mpsc::channel();
        let bind_addr: SocketAddr = format!("0.0.0.0:{}", exchange_port)
            .parse()
            .expect("well-formed socket address");
        let listener = Listener::bind(bind_addr, self.config.listen_backlog, events_tx.clone())?;
        let listen_port = listener.local_addr.port();
        let errors: Arc<Mutex<Vec<ErrorEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let timer = TimerEngine::spawn(events_tx.clone(), errors.clone());

        let exchange = Exchange {
            role: Role::Master,
            exchange_name,
            exchange_host,
            exchange_port,
            listen_port,
            config: self.config,
            my: Mutex::new(LocalComponent {
                id: 0,
                name: component_name,
            }),
            master_peer: Mutex::new(None),
            directory: Mutex::new(Directory::new()),
            listener,
            timer,
            events_tx: Mutex::new(Some(events_tx)),
            events_rx: Mutex::new(events_rx),
            local_subscriptions: Mutex::new(std::collections::HashMap::new()),
            errors,
            shutdown_flag: AtomicBool::new(false),
            next_timer_id: AtomicU64::new(0),
            on_new_component: Mutex::new(self.on_new_component),
            on_end_component: Mutex::new(self.on_end_component),
            on_new_subscriber: Mutex::new(self.on_new_subscriber),
            on_end_subscriber: Mutex::new(self.on_end_subscriber),
            on_new_message: Mutex::new(self.on_new_message),
        };

        log::info!(
            "mx master '{}' listening on {} (exchange '{}')",
            exchange.my_name(),
            bind_addr,
            exchange.exchange_name
        );

        Ok(Arc::new(exchange))
    }

    /// Connects to the master and runs the client boot handshake: opens our
    /// own listener, connects to the master, sends `HelloRequest`, and
    /// awaits `HelloReply` with `config.hello_timeout`. `HelloReport`
    /// follow-ups for already-known peers are handled later by the event
    /// loop, not here.
    pub fn build_client(self) -> Result<Arc<Exchange>> {
        let exchange_name = resolve_name(self.name.as_deref())?;
        let exchange_port = derive_port(&exchange_name);
        let exchange_host = resolve_host(self.host.as_deref());
        let component_name = resolve_component_name(self.component_name.as_deref(), false)?;

        let (events_tx, events_rx) = mpsc::channel();
        let bind_addr: SocketAddr = "0.0.0.0:0".parse().expect("well-formed socket address");
        let listener = Listener::bind(bind_addr, self.config.listen_backlog, events_tx.clone())?;
        let listen_port = listener.local_addr.port();

        let stream = TcpStream::connect((exchange_host.as_str(), exchange_port)).map_err(|_| {
            Error::MasterUnreachable {
                host: exchange_host.clone(),
                port: exchange_port,
            }
        })?;
        let master_peer = Peer::spawn(stream, events_tx.clone()).map_err(Error::Io)?;

        let rx = master_peer.register_await(control::HELLO_REPLY);
        master_peer
            .send(
                control::HELLO_REQUEST,
                control::CONTROL_VERSION,
                ControlMessage::HelloRequest {
                    name: component_name.clone(),
                    port: listen_port,
                }
                .encode(),
            )
            .map_err(Error::Codec)?;

        let deadline = conn::deadline_in(self.config.hello_timeout);
        let hello_reply = Peer::wait_await(rx, deadline).ok_or_else(|| {
            listener.shutdown();
            master_peer.shutdown_socket();
            master_peer.join();
            Error::Timeout("HelloReply")
        })?;

        let (master_name, assigned_id, assigned_name) =
            match ControlMessage::decode(control::HELLO_REPLY, &hello_reply.payload) {
                Ok(ControlMessage::HelloReply {
                    master_name,
                    assigned_id,
                    assigned_name,
                }) => (master_name, assigned_id, assigned_name),
                _ => return Err(Error::Timeout("HelloReply")),
            };

        master_peer.info.lock().expect("peer info lock poisoned").name = Some(master_name.clone());
        master_peer.info.lock().expect("peer info lock poisoned").host = Some(exchange_host.clone());
        master_peer.info.lock().expect("peer info lock poisoned").port = Some(exchange_port);
        master_peer.info.lock().expect("peer info lock poisoned").assigned_id = Some(0);

        let mut directory = Directory::new();
        directory.insert_peer(master_peer.clone());

        let errors: Arc<Mutex<Vec<ErrorEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let timer = TimerEngine::spawn(events_tx.clone(), errors.clone());

        let exchange = Exchange {
            role: Role::Client,
            exchange_name,
            exchange_host,
            exchange_port,
            listen_port,
            config: self.config,
            my: Mutex::new(LocalComponent {
                id: assigned_id,
                name: assigned_name.clone(),
            }),
            master_peer: Mutex::new(Some(master_peer)),
            directory: Mutex::new(directory),
            listener,
            timer,
            events_tx: Mutex::new(Some(events_tx)),
            events_rx: Mutex::new(events_rx),
            local_subscriptions: Mutex::new(std::collections::HashMap::new()),
            errors,
            shutdown_flag: AtomicBool::new(false),
            next_timer_id: AtomicU64::new(0),
            on_new_component: Mutex::new(self.on_new_component),
            on_end_component: Mutex::new(self.on_end_component),
            on_new_subscriber: Mutex::new(self.on_new_subscriber),
            on_end_subscriber: Mutex::new(self.on_end_subscriber),
            on_new_message: Mutex::new(self.on_new_message),
        };

        log::info!(
            "mx client '{}' joined exchange '{}' as id {}",
            exchange.my_name(),
            exchange.exchange_name,
            exchange.my_id()
        );

        Ok(Arc::new(exchange))
    }
}

/// A live participant in an MX exchange: either the master (the directory)
/// or a client. See the module docs and `DESIGN.md` for the grounding
/// behind this design.
pub struct Exchange {
    role: Role,
    exchange_name: String,
    exchange_host: String,
    exchange_port: u16,
    listen_port: u16,
    config: Config,
    my: Mutex<LocalComponent>,
    master_peer: Mutex<Option<Arc<Peer>>>,
    directory: Mutex<Directory>,
    listener: Listener,
    timer: TimerEngine,
    events_tx: Mutex<Option<Sender<Event>>>,
    events_rx: Mutex<Receiver<Event>>,
    local_subscriptions: Mutex<std::collections::HashMap<u32, LocalHandler>>,
    errors: Arc<Mutex<Vec<ErrorEntry>>>,
    shutdown_flag: AtomicBool,
    next_timer_id: AtomicU64,
    on_new_component: Mutex<Option<ComponentHook>>,
    on_end_component: Mutex<Option<ComponentHook>>,
    on_new_subscriber: Mutex<Option<SubscriberHook>>,
    on_end_subscriber: Mutex<Option<SubscriberHook>>,
    on_new_message: Mutex<Option<MessageHook>>,
}

impl Exchange {
    // ---- accessors -------------------------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn my_name(&self) -> String {
        self.my.lock().expect("local component lock poisoned").name.clone()
    }

    pub fn my_id(&self) -> u16 {
        self.my.lock().expect("local component lock poisoned").id
    }

    /// The exchange's name (not this component's name).
    pub fn name(&self) -> &str {
        &self.exchange_name
    }

    pub fn host(&self) -> &str {
        &self.exchange_host
    }

    pub fn port(&self) -> u16 {
        self.exchange_port
    }

    pub fn message_name(&self, msg_type: u32) -> Option<String> {
        self.directory.lock().expect("directory lock poisoned").type_name(msg_type)
    }

    pub fn component_name(&self, peer: PeerId) -> Option<String> {
        self.directory
            .lock()
            .expect("directory lock poisoned")
            .component_name(peer)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.directory
            .lock()
            .expect("directory lock poisoned")
            .peers()
            .map(|p| p.id)
            .collect()
    }

    /// The listening socket's raw fd, for embedding this exchange's accept
    /// loop inside another process's own select/poll loop. The internal
    /// event channel has no fd equivalent under `std::sync::mpsc` — only
    /// the listener does.
    pub fn connection_number(&self) -> std::os::unix::io::RawFd {
        self.listener.raw_fd()
    }

    /// The master's peer id, for a client that needs to address it
    /// directly (e.g. to send it a `QuitRequest`). `None` for a master
    /// itself, which has no separate master peer.
    pub fn master_peer_id(&self) -> Option<PeerId> {
        self.master_peer
            .lock()
            .expect("master peer lock poisoned")
            .as_ref()
            .map(|p| p.id)
    }

    /// Clears and returns the error buffer. Retrieving the buffer transfers
    /// ownership of its entries to the caller; later errors accumulate into
    /// a fresh, empty buffer.
    pub fn errors(&self) -> Vec<ErrorEntry> {
        std::mem::take(&mut *self.errors.lock().expect("error buffer lock poisoned"))
    }

    fn record_error(&self, severity: Severity, error: Error) {
        log::warn!("{:?}: {}", severity, error);
        self.errors
            .lock()
            .expect("error buffer lock poisoned")
            .push(ErrorEntry::new(severity, error));
    }

    // ---- public API --------------------------------------------------

    /// Registers (or looks up) a message type by name. Idempotent on name.
    /// Masters allocate locally and broadcast; clients round-trip to the
    /// master with `config.register_timeout`, returning the cached id
    /// without a round-trip if a prior `RegisterReport` already taught us
    /// this name (S2).
    pub fn register(&self, name: &str) -> u32 {
        match self.role {
            Role::Master => {
                let (id, is_new) = self
                    .directory
                    .lock()
                    .expect("directory lock poisoned")
                    .register_type(name);
                if is_new {
                    self.broadcast_register_report(name, id, None);
                    self.fire_new_message(id);
                }
                id
            }
            Role::Client => {
                if !name.is_empty() {
                    if let Some(id) = self
                        .directory
                        .lock()
                        .expect("directory lock poisoned")
                        .type_id_by_name(name)
                    {
                        return id;
                    }
                }
                let master = self.master_peer();
                let rx = master.register_await(control::REGISTER_REPLY);
                if self
                    .send_control(
                        &master,
                        ControlMessage::RegisterRequest { name: name.to_string() },
                    )
                    .is_err()
                {
                    self.shutdown();
                    return 0;
                }
                let deadline = conn::deadline_in(self.config.register_timeout);
                match Peer::wait_await(rx, deadline) {
                    Some(result) => match ControlMessage::decode(control::REGISTER_REPLY, &result.payload) {
                        Ok(ControlMessage::RegisterReply { type_id }) => {
                            if !name.is_empty() {
                                self.directory
                                    .lock()
                                    .expect("directory lock poisoned")
                                    .name_type(type_id, name.to_string());
                            }
                            type_id
                        }
                        _ => 0,
                    },
                    None => {
                        self.record_error(Severity::Fatal, Error::Timeout("RegisterReply"));
                        self.shutdown();
                        0
                    }
                }
            }
        }
    }

    /// Installs (or replaces) the local handler for `msg_type` and
    /// announces a `SubscribeUpdate` to every currently known peer.
    /// Rejects reserved ids (0..=11).
    pub fn subscribe(&self, msg_type: u32, handler: impl FnMut(PeerId, u32, u32, &[u8]) + Send + 'static) -> Status {
        if ControlMessage::is_reserved_type(msg_type) {
            return STATUS_RESERVED_TYPE;
        }
        self.directory.lock().expect("directory lock poisoned").ensure_type(msg_type);
        let replaced = {
            let mut subs = self.local_subscriptions.lock().expect("subscriptions lock poisoned");
            let replaced = subs.contains_key(&msg_type);
            subs.insert(msg_type, Box::new(handler));
            replaced
        };
        self.announce(msg_type, true);
        if replaced {
            STATUS_REPLACED
        } else {
            STATUS_OK
        }
    }

    /// Removes the local handler for `msg_type` and announces a
    /// `CancelUpdate`. Returns a notice (not an error) if there was no
    /// subscription to cancel.
    pub fn cancel(&self, msg_type: u32) -> Status {
        if ControlMessage::is_reserved_type(msg_type) {
            return STATUS_RESERVED_TYPE;
        }
        let existed = self
            .local_subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .remove(&msg_type)
            .is_some();
        if existed {
            self.announce(msg_type, false);
            STATUS_OK
        } else {
            STATUS_NOT_SUBSCRIBED
        }
    }

    fn announce(&self, msg_type: u32, subscribing: bool) {
        let msg = if subscribing {
            ControlMessage::SubscribeUpdate { type_id: msg_type }
        } else {
            ControlMessage::CancelUpdate { type_id: msg_type }
        };
        let mut peers: Vec<Arc<Peer>> = self
            .directory
            .lock()
            .expect("directory lock poisoned")
            .peers()
            .cloned()
            .collect();
        peers.sort_by_key(|p| p.id);
        for peer in &peers {
            let _ = self.send_control(peer, msg.clone());
        }
    }

    /// Non-blocking: enqueues a frame to `peer`'s writer.
    pub fn send(&self, peer: PeerId, msg_type: u32, version: u32, payload: Vec<u8>) -> Result<()> {
        let dir = self.directory.lock().expect("directory lock poisoned");
        let peer = dir
            .peer(peer)
            .ok_or_else(|| Error::Configuration(format!("no such peer {}", peer)))?;
        peer.send(msg_type, version, payload).map_err(Error::Codec)
    }

    /// Enqueues one `Send` per subscriber of `msg_type`, in fd-ascending
    /// order. Never delivered to the broadcaster itself — the directory's
    /// subscriber set only ever contains remote peers, never a "self"
    /// entry.
    pub fn broadcast(&self, msg_type: u32, version: u32, payload: Vec<u8>) {
        let dir = self.directory.lock().expect("directory lock poisoned");
        let mut subscribers = dir.subscribers(msg_type);
        subscribers.sort();
        for peer_id in subscribers {
            if let Some(peer) = dir.peer(peer_id) {
                let _ = peer.send(msg_type, version, payload.clone());
            }
        }
    }

    /// Blocks the calling thread until a frame of `msg_type` arrives on
    /// `peer` or `timeout` elapses.
    pub fn await_message(&self, peer: PeerId, msg_type: u32, timeout: Duration) -> Option<(u32, Vec<u8>)> {
        let peer = self.directory.lock().expect("directory lock poisoned").peer(peer)?.clone();
        let deadline = conn::deadline_in(timeout);
        peer.await_frame(msg_type, deadline).map(AwaitResult::into_tuple)
    }

    /// Installs an await for `wait_type` on `peer`, *then* sends
    /// `(send_type, version, payload)`, then blocks for the reply —
    /// avoiding the race where a fast peer replies before we start waiting.
    pub fn send_and_wait(
        &self,
        peer: PeerId,
        send_type: u32,
        version: u32,
        payload: Vec<u8>,
        wait_type: u32,
        timeout: Duration,
    ) -> Option<(u32, Vec<u8>)> {
        let peer = self.directory.lock().expect("directory lock poisoned").peer(peer)?.clone();
        let rx = peer.register_await(wait_type);
        if peer.send(send_type, version, payload).is_err() {
            return None;
        }
        let deadline = conn::deadline_in(timeout);
        Peer::wait_await(rx, deadline).map(AwaitResult::into_tuple)
    }

    pub fn create_timer(&self, delay: Duration, handler: impl FnMut() + Send + 'static) -> u64 {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        self.timer.create(id, timer::now() + delay.as_secs_f64(), Box::new(handler) as TimerHandler);
        id
    }

    pub fn adjust_timer(&self, id: u64, delay: Duration) {
        self.timer.adjust(id, timer::now() + delay.as_secs_f64());
    }

    pub fn delete_timer(&self, id: u64) {
        self.timer.delete(id);
    }

    // ---- event loop ----------------------------------------------------

    fn next_event(&self, block: bool) -> Option<Event> {
        let rx = self.events_rx.lock().expect("event channel lock poisoned");
        if block {
            rx.recv().ok()
        } else {
            rx.try_recv().ok()
        }
    }

    /// Blocks, dispatching events to handlers, until the exchange shuts
    /// down (master lost, `QuitRequest`, or an explicit [`Exchange::shutdown`]
    /// from within a handler). Returns `0` once shut down, matching the
    /// original's `mxRun` return convention.
    pub fn run(&self) -> i32 {
        loop {
            if self.shutdown_flag.load(Ordering::SeqCst) {
                return 0;
            }
            match self.next_event(true) {
                Some(event) => self.handle_event(event),
                None => return 0,
            }
        }
    }

    /// Drains and dispatches whatever events are already queued, without
    /// blocking except for the user-callback calls themselves. Returns once
    /// the channel is empty.
    pub fn process_events(&self) {
        while !self.shutdown_flag.load(Ordering::SeqCst) {
            match self.next_event(false) {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Connect { peer } => {
                log::debug!("peer {} connected, awaiting introduction", peer.id);
                self.directory.lock().expect("directory lock poisoned").insert_peer(peer);
            }
            Event::Disconnect { peer, graceful } => self.handle_disconnect(peer, graceful),
            Event::Message {
                peer,
                msg_type,
                version,
                payload,
            } => {
                if msg_type < FIRST_USER_TYPE {
                    self.handle_control(peer, msg_type, &payload);
                } else {
                    let mut subs = self.local_subscriptions.lock().expect("subscriptions lock poisoned");
                    if let Some(handler) = subs.get_mut(&msg_type) {
                        handler(peer, msg_type, version, &payload);
                    }
                }
            }
            Event::TimerFired { mut handler, .. } => handler(),
            Event::Error { peer, entry } => {
                log::warn!("background error on peer {:?}: {}", peer, entry.error);
                self.errors.lock().expect("error buffer lock poisoned").push(entry);
            }
        }
    }

    fn handle_disconnect(&self, peer_id: PeerId, graceful: bool) {
        let is_master = self.role == Role::Client
            && self
                .master_peer
                .lock()
                .expect("master peer lock poisoned")
                .as_ref()
                .map(|p| p.id)
                == Some(peer_id);

        if is_master {
            log::warn!("lost connection to master (graceful={}); shutting down", graceful);
            self.shutdown();
            return;
        }

        let removed = self.directory.lock().expect("directory lock poisoned").remove_peer(peer_id);
        if let Some(peer) = removed {
            log::debug!("peer {} disconnected (graceful={})", peer_id, graceful);
            peer.join();
            if let Some(hook) = self.on_end_component.lock().expect("hook lock poisoned").as_mut() {
                hook(peer_id);
            }
        }
    }

    // ---- control protocol ----------------------------------------------

    fn master_peer(&self) -> Arc<Peer> {
        self.master_peer
            .lock()
            .expect("master peer lock poisoned")
            .clone()
            .expect("client exchange must have a master peer")
    }

    fn send_control(&self, peer: &Peer, msg: ControlMessage) -> Result<()> {
        peer.send(msg.msg_type(), control::CONTROL_VERSION, msg.encode())
            .map_err(Error::Codec)
    }

    fn fire_new_message(&self, msg_type: u32) {
        if let Some(hook) = self.on_new_message.lock().expect("hook lock poisoned").as_mut() {
            hook(msg_type);
        }
    }

    fn broadcast_register_report(&self, name: &str, id: u32, exclude: Option<PeerId>) {
        let mut peers: Vec<Arc<Peer>> = self
            .directory
            .lock()
            .expect("directory lock poisoned")
            .peers()
            .filter(|p| Some(p.id) != exclude)
            .cloned()
            .collect();
        peers.sort_by_key(|p| p.id);
        for peer in &peers {
            let _ = self.send_control(
                peer,
                ControlMessage::RegisterReport {
                    name: name.to_string(),
                    type_id: id,
                },
            );
        }
    }

    fn handle_control(&self, peer_id: PeerId, msg_type: u32, payload: &[u8]) {
        let msg = match ControlMessage::decode(msg_type, payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.record_error(Severity::Notice, Error::Codec(e));
                return;
            }
        };

        match msg {
            ControlMessage::SubscribeUpdate { type_id } => self.on_subscribe_update(peer_id, type_id, true),
            ControlMessage::CancelUpdate { type_id } => self.on_subscribe_update(peer_id, type_id, false),
            ControlMessage::RegisterReport { name, type_id } => {
                if !name.is_empty() {
                    self.directory
                        .lock()
                        .expect("directory lock poisoned")
                        .name_type(type_id, name);
                } else {
                    self.directory.lock().expect("directory lock poisoned").ensure_type(type_id);
                }
                self.fire_new_message(type_id);
            }
            ControlMessage::PublishUpdate | ControlMessage::WithdrawUpdate => {
                // Legacy messages this runtime never emits; receiving one is a no-op.
            }
            other => match self.role {
                Role::Master => self.handle_master_control(peer_id, other),
                Role::Client => self.handle_client_control(peer_id, other),
            },
        }
    }

    fn on_subscribe_update(&self, peer_id: PeerId, type_id: u32, subscribing: bool) {
        let dir = self.directory.lock().expect("directory lock poisoned");
        let peer = match dir.peer(peer_id) {
            Some(p) => p.clone(),
            None => return,
        };
        drop(dir);
        self.directory.lock().expect("directory lock poisoned").ensure_type(type_id);
        {
            let mut info = peer.info.lock().expect("peer info lock poisoned");
            if subscribing {
                info.subscriptions.insert(type_id);
            } else {
                info.subscriptions.remove(&type_id);
            }
        }
        let hook = if subscribing {
            &self.on_new_subscriber
        } else {
            &self.on_end_subscriber
        };
        if let Some(hook) = hook.lock().expect("hook lock poisoned").as_mut() {
            hook(peer_id, type_id);
        }
    }

    fn handle_master_control(&self, peer_id: PeerId, msg: ControlMessage) {
        match msg {
            ControlMessage::QuitRequest => {
                log::info!("received QuitRequest from peer {}", peer_id);
                self.shutdown();
            }
            ControlMessage::HelloRequest { name, port } => self.on_hello_request(peer_id, name, port),
            ControlMessage::RegisterRequest { name } => self.on_register_request(peer_id, name),
            other => log::warn!("master received unexpected control message: {:?}", other),
        }
    }

    fn handle_client_control(&self, peer_id: PeerId, msg: ControlMessage) {
        match msg {
            ControlMessage::HelloReport { name, id, host, port } => self.on_hello_report(name, id, host, port),
            ControlMessage::HelloUpdate { name, id, port } => self.on_hello_update(peer_id, name, id, port),
            ControlMessage::HelloReply { .. } | ControlMessage::RegisterReply { .. } => {
                log::debug!("client saw a reply outside the await path for peer {}", peer_id);
            }
            other => log::warn!("client received unexpected control message: {:?}", other),
        }
    }

    /// Master side of a new client's introduction: assign an id and a
    /// `"<requested>/<n>"` name, reply, then stream `HelloReport` for every
    /// other named peer, `RegisterReport` for every user type, and
    /// `SubscribeUpdate` for our own subscriptions.
    fn on_hello_request(&self, peer_id: PeerId, name: String, port: u16) {
        let requester = match self.directory.lock().expect("directory lock poisoned").peer(peer_id) {
            Some(p) => p.clone(),
            None => return,
        };
        let host = requester.peer_addr.ip().to_string();

        let (assigned_id, assigned_name) = {
            let mut dir = self.directory.lock().expect("directory lock poisoned");
            let id = dir.next_component_id();
            let assigned_name = dir.assign_name(&name);
            (id, assigned_name)
        };

        {
            let mut info = requester.info.lock().expect("peer info lock poisoned");
            info.name = Some(assigned_name.clone());
            info.host = Some(host);
            info.port = Some(port);
            info.assigned_id = Some(assigned_id);
        }

        if let Some(hook) = self.on_new_component.lock().expect("hook lock poisoned").as_mut() {
            hook(peer_id);
        }

        let _ = self.send_control(
            &requester,
            ControlMessage::HelloReply {
                master_name: self.my_name(),
                assigned_id,
                assigned_name,
            },
        );

        let others: Vec<(String, u16, String, u16)> = self
            .directory
            .lock()
            .expect("directory lock poisoned")
            .peers()
            .filter(|p| p.id != peer_id)
            .filter_map(|p| {
                let info = p.info.lock().expect("peer info lock poisoned");
                let name = info.name.clone()?;
                Some((name, info.assigned_id.unwrap_or(0), info.host.clone().unwrap_or_default(), info.port.unwrap_or(0)))
            })
            .collect();
        for (name, id, host, port) in others {
            let _ = self.send_control(&requester, ControlMessage::HelloReport { name, id, host, port });
        }

        let user_types: Vec<(String, u32)> = self
            .directory
            .lock()
            .expect("directory lock poisoned")
            .known_types()
            .filter(|t| t.msg_type >= FIRST_USER_TYPE)
            .filter_map(|t| t.name.clone().map(|n| (n, t.msg_type)))
            .collect();
        for (name, type_id) in user_types {
            let _ = self.send_control(&requester, ControlMessage::RegisterReport { name, type_id });
        }

        let my_subscriptions: Vec<u32> = self
            .local_subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .keys()
            .copied()
            .collect();
        for type_id in my_subscriptions {
            let _ = self.send_control(&requester, ControlMessage::SubscribeUpdate { type_id });
        }
    }

    fn on_register_request(&self, peer_id: PeerId, name: String) {
        let requester = match self.directory.lock().expect("directory lock poisoned").peer(peer_id) {
            Some(p) => p.clone(),
            None => return,
        };
        let (id, is_new) = self
            .directory
            .lock()
            .expect("directory lock poisoned")
            .register_type(&name);
        if is_new {
            self.broadcast_register_report(&name, id, Some(peer_id));
            self.fire_new_message(id);
        }
        let _ = self.send_control(&requester, ControlMessage::RegisterReply { type_id: id });
    }

    /// Client side of receiving a `HelloReport`: outbound-connect to the
    /// reported peer, record it, introduce ourselves, and replay our
    /// current subscriptions to it so a peer we meet this way ends up with
    /// the same subscription state as any peer we met first.
    fn on_hello_report(&self, name: String, id: u16, host: String, port: u16) {
        let stream = match TcpStream::connect((host.as_str(), port)) {
            Ok(s) => s,
            Err(e) => {
                self.record_error(Severity::Notice, Error::Io(e));
                return;
            }
        };
        let events_tx = match self.events_tx.lock().expect("event sender lock poisoned").clone() {
            Some(tx) => tx,
            None => return,
        };
        let peer = match Peer::spawn(stream, events_tx) {
            Ok(p) => p,
            Err(e) => {
                self.record_error(Severity::Notice, Error::Io(e));
                return;
            }
        };
        {
            let mut info = peer.info.lock().expect("peer info lock poisoned");
            info.name = Some(name.clone());
            info.host = Some(host);
            info.port = Some(port);
            info.assigned_id = Some(id);
        }
        self.directory.lock().expect("directory lock poisoned").insert_peer(peer.clone());

        if let Some(hook) = self.on_new_component.lock().expect("hook lock poisoned").as_mut() {
            hook(peer.id);
        }

        let _ = self.send_control(
            &peer,
            ControlMessage::HelloUpdate {
                name: self.my_name(),
                id: self.my_id(),
                port: self.listen_port,
            },
        );

        let my_subscriptions: Vec<u32> = self
            .local_subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .keys()
            .copied()
            .collect();
        for type_id in my_subscriptions {
            let _ = self.send_control(&peer, ControlMessage::SubscribeUpdate { type_id });
        }

        log::debug!("introduced ourselves to peer '{}' ({})", name, peer.id);
    }

    /// Client side of an inbound peer introducing itself after connecting
    /// to us directly.
    fn on_hello_update(&self, peer_id: PeerId, name: String, id: u16, port: u16) {
        let dir = self.directory.lock().expect("directory lock poisoned");
        let peer = match dir.peer(peer_id) {
            Some(p) => p.clone(),
            None => return,
        };
        let host = peer.peer_addr.ip().to_string();
        drop(dir);
        {
            let mut info = peer.info.lock().expect("peer info lock poisoned");
            info.name = Some(name);
            info.host = Some(host);
            info.port = Some(port);
            info.assigned_id = Some(id);
        }
        if let Some(hook) = self.on_new_component.lock().expect("hook lock poisoned").as_mut() {
            hook(peer_id);
        }
    }

    // ---- shutdown --------------------------------------------------------

    /// Closes the event pipe's write end, stops the listener, stops the
    /// timer thread, half-shuts every peer socket, then joins everything.
    /// Safe to call more than once, and safe to call from within a handler
    /// (unlike `Destroy`/`Drop`, which must only run after `run()` has
    /// returned).
    pub fn shutdown(&self) {
        if self.shutdown_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("shutting down exchange '{}'", self.exchange_name);
        *self.events_tx.lock().expect("event sender lock poisoned") = None;
        self.listener.shutdown();
        self.timer.shutdown();

        let peers: Vec<Arc<Peer>> = self
            .directory
            .lock()
            .expect("directory lock poisoned")
            .peers()
            .cloned()
            .collect();
        for peer in &peers {
            peer.shutdown_socket();
        }
        for peer in &peers {
            peer.join();
        }
    }
}

impl AwaitResult {
    fn into_tuple(self) -> (u32, Vec<u8>) {
        (self.version, self.payload)
    }
}
