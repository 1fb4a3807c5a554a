//! The per-core worker: owns both pools, both registries, the timer wheel,
//! and the transport, and exposes the engine's public operations (spec.md
//! §4, §6). One `Worker` is meant to run on one thread: nothing it owns is
//! shared across threads, so no locking is needed anywhere in this file.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{trace, warn};

use crate::assembler::{assemble_outbound, build_delivery_iovec, IoVec};
use crate::buffer::Buffer;
use crate::client::{ClientErrorCode, ClientOutcome, ClientPair, RequestContext};
use crate::dispatch::{classify, Route};
use crate::error::EngineError;
use crate::pool::{Handle, Pool};
use crate::protocol::{
    HostTuple, MessageKind, RequestId, RoutingPolicy, DEFAULT_POOL_CAPACITY, MIN_PAYLOAD_SIZE,
    PAYLOAD_SIZE,
};
use crate::registry::{ClientRegistry, ServerRegistry};
use crate::server::{ServerOutcome, ServerPair};
use crate::timer::{Clock, TimerWheel};
use crate::transport::Transport;

/// Tunables for one `Worker` (spec.md §6 "Configuration"). Distinct from
/// per-request settings (timeout, routing policy), which live on
/// `RequestContext` instead.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// This worker's own address, used as the reply-to for responses.
    pub local: HostTuple,
    pub client_pool_capacity: usize,
    pub server_pool_capacity: usize,
    pub min_payload_size: usize,
    pub payload_size: usize,
    /// Default per-request timeout when a `RequestContext` doesn't
    /// override it.
    pub default_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            local: HostTuple::new(Ipv4Addr::UNSPECIFIED, 0),
            client_pool_capacity: DEFAULT_POOL_CAPACITY,
            server_pool_capacity: DEFAULT_POOL_CAPACITY,
            min_payload_size: MIN_PAYLOAD_SIZE,
            payload_size: PAYLOAD_SIZE,
            default_timeout: Duration::from_secs(5),
        }
    }
}

/// Invoked once a server pair's request is fully reassembled. Takes the
/// pair's `Handle` (needed later to call `send_response`), the request's
/// origin and id, and a zero-copy view of the reassembled payload.
pub type RecvCallback = Box<dyn FnMut(Handle, HostTuple, RequestId, &[&[u8]]) + Send>;

/// One engine instance: pools, registries, timers, and a transport,
/// bundled into a single struct so a process can run several independent
/// workers (one per thread) without any of them sharing state.
pub struct Worker<T: Transport> {
    config: WorkerConfig,
    transport: T,
    clock: Arc<dyn Clock>,
    clients: Pool<ClientPair>,
    servers: Pool<ServerPair>,
    client_registry: ClientRegistry,
    server_registry: ServerRegistry,
    timers: TimerWheel<Handle>,
    recv_cb: Option<RecvCallback>,
}

impl<T: Transport> Worker<T> {
    pub fn new(config: WorkerConfig, transport: T, clock: Arc<dyn Clock>) -> Self {
        let clients = Pool::with_capacity(config.client_pool_capacity);
        let servers = Pool::with_capacity(config.server_pool_capacity);
        Self {
            config,
            transport,
            clock,
            clients,
            servers,
            client_registry: ClientRegistry::new(),
            server_registry: ServerRegistry::new(),
            timers: TimerWheel::new(),
            recv_cb: None,
        }
    }

    /// Registers the single process-wide callback invoked whenever a
    /// request finishes reassembling on the server side (spec.md §6).
    pub fn set_recv_cb(&mut self, cb: impl FnMut(Handle, HostTuple, RequestId, &[&[u8]]) + Send + 'static) {
        self.recv_cb = Some(Box::new(cb));
    }

    fn fresh_request_id(&self) -> RequestId {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = RequestId(rng.gen());
            if self.client_registry.lookup(candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Sends a new request (spec.md §4.4). On success returns the
    /// `ClientPair`'s `Handle`; `ctx`'s callbacks fire later as the
    /// response (or a failure) arrives.
    pub fn send_request(&mut self, iov: IoVec<'_>, mut ctx: RequestContext) -> Result<Handle, EngineError> {
        if let Err(e) = self.transport.prepare_to_send() {
            // REDESIGN FLAG 2: surfaced to the caller's on_error instead of
            // silently dropping the request.
            (ctx.on_error)(ClientErrorCode::SendPrepareFailed);
            return Err(e);
        }

        let rid = self.fresh_request_id();
        let destination = ctx.destination;
        let timeout = ctx.timeout.unwrap_or(self.config.default_timeout);
        let request = assemble_outbound(
            iov,
            MessageKind::Request,
            ctx.routing_policy,
            rid,
            destination,
            self.config.min_payload_size,
            self.config.payload_size,
        )?;

        let head = request
            .head()
            .cloned()
            .expect("assembler always produces at least one buffer");
        let pair = ClientPair::new(request, destination, ctx);
        let handle = self.clients.insert(pair)?;
        self.client_registry.insert(rid, handle);

        let now = self.clock.now();
        let token = self.timers.arm(handle, now, timeout);
        if let Some(pair) = self.clients.get_mut(handle) {
            pair.timer = Some(token);
        }

        self.transport.send(&[head], destination)?;
        trace!(rid = %rid, "sent request head packet");
        Ok(handle)
    }

    /// Called by the application once it has finished reading the
    /// zero-copy payload handed to `on_success`, releasing the
    /// `ClientPair`'s pool slot (spec.md §4.3).
    pub fn recv_resp_done(&mut self, handle: Handle) {
        self.clients.remove(handle);
    }

    /// Sends a reply to a fully-reassembled request (spec.md §4.5,
    /// §4.6). `handle` is the one a `RecvCallback` invocation was given.
    pub fn send_response(&mut self, handle: Handle, iov: IoVec<'_>) -> Result<(), EngineError> {
        let sp = self.servers.get(handle).ok_or(EngineError::UnknownServerPair)?;
        let rid = sp.request.req_id;
        let peer = sp.request.sender;

        self.transport.prepare_to_send()?;
        let reply = assemble_outbound(
            iov,
            MessageKind::Response,
            RoutingPolicy::FIXED_ROUTE,
            rid,
            peer,
            self.config.min_payload_size,
            self.config.payload_size,
        )?;
        self.transport.send(&reply.buffers, peer)?;
        self.transport.router_notify();

        // Replying is the last state a server pair passes through
        // (spec.md §3); once the reply is on the wire there's nothing
        // left to keep the pair alive for.
        self.servers.remove(handle);
        trace!(rid = %rid, peer = %peer, "sent response");
        Ok(())
    }

    /// Feeds one inbound datagram through the engine (spec.md §4.4-§4.6).
    pub fn handle_incoming_pck(&mut self, sender: HostTuple, bytes: &[u8]) -> Result<(), EngineError> {
        let (buf, route) = classify(bytes)?;
        match route {
            Route::Client => self.handle_client_packet(buf),
            Route::Server => self.handle_server_packet(sender, buf),
        }
        Ok(())
    }

    fn handle_client_packet(&mut self, buf: Buffer) {
        let rid = buf.header.rid;
        let Some(handle) = self.client_registry.lookup(rid) else {
            trace!(rid = %rid, "dropping response for unknown or completed request");
            return;
        };

        let outcome = match self.clients.get_mut(handle) {
            Some(pair) => pair.handle_inbound(buf),
            None => return,
        };

        match outcome {
            ClientOutcome::AwaitingMore => {}
            ClientOutcome::NotAnAck => {
                trace!(rid = %rid, "dropped packet that wasn't the expected ack");
            }
            ClientOutcome::AckReceived => {
                if let Some(pair) = self.clients.get(handle) {
                    let destination = pair
                        .ctx
                        .as_ref()
                        .map(|c| c.destination)
                        .unwrap_or(pair.request.sender);
                    let remainder: Vec<Buffer> = pair.remainder().to_vec();
                    if let Err(e) = self.transport.send(&remainder, destination) {
                        warn!(rid = %rid, error = %e, "failed to send request remainder after ack");
                    }
                }
            }
            ClientOutcome::Complete => {
                self.client_registry.remove(rid);
                if let Some(pair) = self.clients.get_mut(handle) {
                    if let Some(token) = pair.timer.take() {
                        self.timers.disarm(token);
                    }
                    match build_delivery_iovec(&pair.reply) {
                        Ok(iovec) => {
                            let tx_ts = self.transport.extract_tx_timestamp();
                            if let Some(ctx) = pair.ctx.take() {
                                (ctx.on_success)(handle, &iovec, tx_ts);
                            }
                        }
                        Err(e) => {
                            warn!(rid = %rid, error = %e, "response exceeded fragment bound");
                            if let Some(ctx) = pair.ctx.take() {
                                (ctx.on_error)(ClientErrorCode::SizeMismatch);
                            }
                        }
                    }
                }
                self.clients.remove(handle);
            }
            ClientOutcome::OutOfOrder | ClientOutcome::SizeMismatch => {
                let code = if outcome == ClientOutcome::OutOfOrder {
                    ClientErrorCode::OutOfOrder
                } else {
                    ClientErrorCode::SizeMismatch
                };
                self.client_registry.remove(rid);
                if let Some(pair) = self.clients.get_mut(handle) {
                    if let Some(token) = pair.timer.take() {
                        self.timers.disarm(token);
                    }
                    if let Some(ctx) = pair.ctx.take() {
                        (ctx.on_error)(code);
                    }
                }
                self.clients.remove(handle);
            }
        }
    }

    fn handle_server_packet(&mut self, sender: HostTuple, buf: Buffer) {
        let rid = buf.header.rid;
        if buf.header.is_first() {
            if let Some(stale) = self.server_registry.remove(rid, sender) {
                warn!(rid = %rid, peer = %sender, "evicting stale server pair for duplicate first packet");
                self.servers.remove(stale);
            }

            let (sp, outcome) = ServerPair::new(sender, rid, buf);
            match outcome {
                ServerOutcome::AwaitingMore => {
                    let handle = match self.servers.insert(sp) {
                        Ok(h) => h,
                        Err(e) => {
                            warn!(rid = %rid, error = %e, "dropping request: server pool exhausted");
                            return;
                        }
                    };
                    self.server_registry.insert(rid, sender, handle);
                    self.send_ack(rid, sender);
                }
                ServerOutcome::Complete => {
                    let handle = match self.servers.insert(sp) {
                        Ok(h) => h,
                        Err(e) => {
                            warn!(rid = %rid, error = %e, "dropping request: server pool exhausted");
                            return;
                        }
                    };
                    self.deliver_request(handle, sender, rid);
                }
                ServerOutcome::OutOfOrder | ServerOutcome::SizeMismatch => {
                    warn!(rid = %rid, peer = %sender, "malformed first packet, dropping");
                }
            }
            return;
        }

        let Some(handle) = self.server_registry.lookup(rid, sender) else {
            trace!(rid = %rid, peer = %sender, "dropping fragment for unknown request");
            return;
        };
        let outcome = match self.servers.get_mut(handle) {
            Some(sp) => sp.handle_subsequent(buf),
            None => return,
        };

        match outcome {
            ServerOutcome::AwaitingMore => {}
            ServerOutcome::Complete => {
                self.server_registry.remove(rid, sender);
                self.deliver_request(handle, sender, rid);
            }
            ServerOutcome::OutOfOrder | ServerOutcome::SizeMismatch => {
                warn!(rid = %rid, peer = %sender, "request reassembly failed, dropping");
                self.server_registry.remove(rid, sender);
                self.servers.remove(handle);
            }
        }
    }

    fn deliver_request(&mut self, handle: Handle, sender: HostTuple, rid: RequestId) {
        let Some(sp) = self.servers.get(handle) else {
            return;
        };
        let iovec = match build_delivery_iovec(&sp.request) {
            Ok(v) => v,
            Err(e) => {
                warn!(rid = %rid, error = %e, "request exceeded fragment bound");
                self.servers.remove(handle);
                return;
            }
        };
        if let Some(cb) = self.recv_cb.as_mut() {
            cb(handle, sender, rid, &iovec);
        }
    }

    fn send_ack(&mut self, rid: RequestId, destination: HostTuple) {
        use crate::header::Header;
        let mut header = Header::new(MessageKind::Ack, RoutingPolicy::FIXED_ROUTE, rid, 1);
        header.set_first(true);
        header.set_last(true);
        let ack = Buffer::new(header, crate::protocol::ACK_BODY.to_vec());
        if let Err(e) = self.transport.send(&[ack], destination) {
            warn!(rid = %rid, error = %e, "failed to send ack");
        }
    }

    /// Polls the timer wheel and fails every client pair whose response
    /// timed out (spec.md §4.4, §8 S5).
    pub fn timer_triggered(&mut self) {
        let now = self.clock.now();
        for handle in self.timers.poll_expired(now) {
            self.client_registry.remove_handle(handle);
            if let Some(mut pair) = self.clients.remove(handle) {
                if let Some(ctx) = pair.ctx.take() {
                    (ctx.on_timeout)();
                }
            }
        }
    }
}
