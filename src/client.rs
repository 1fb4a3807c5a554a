//! Client-side request/reply state machine (spec.md §4.4).

use std::time::{Duration, Instant};

use crate::buffer::{Buffer, Message};
use crate::pool::Handle;
use crate::protocol::{HostTuple, RoutingPolicy, ACK_BODY};
use crate::timer::TimerToken;

/// `W_ACK` / `W_RESPONSE` from spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the server's ACK of a multi-packet request's first
    /// packet, before the remainder of the request chain is sent.
    WAck,
    /// Waiting for response fragments.
    WResponse,
}

/// The reason a pending request failed, passed to `on_error`. Distinct
/// variants rather than the original's single `-1` error code, while
/// preserving that every one of these is the same "fail the pair" path
/// spec.md §7 describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorCode {
    /// A response fragment's sequence number didn't match what was
    /// expected next.
    OutOfOrder,
    /// The last response fragment arrived but the running total didn't
    /// match the count the first fragment advertised.
    SizeMismatch,
    /// `prepare_to_send` failed before the request could be sent at all
    /// (REDESIGN FLAG 2 — surfaced here rather than silently dropped).
    SendPrepareFailed,
}

/// Per-request application context: where to send it, how, and the three
/// callbacks from spec.md §6. Closures replace the original's `void*
/// arg` + raw function pointer pair — whatever state a callback needs, it
/// captures directly, which is the idiomatic Rust equivalent.
pub struct RequestContext {
    pub destination: HostTuple,
    pub routing_policy: RoutingPolicy,
    /// How long to wait for a complete response before `on_timeout` fires.
    /// `None` falls back to the owning `Worker`'s `WorkerConfig::default_timeout`.
    pub timeout: Option<Duration>,
    /// Invoked once the reply is fully reassembled. The third argument is
    /// the transport's TX timestamp for the request, when one is
    /// available (spec.md §3 CP `ctx` "optional timestamps"; §4.4 "optionally
    /// extract a TX timestamp" before this callback fires).
    pub on_success: Box<dyn FnOnce(Handle, &[&[u8]], Option<Instant>) + Send>,
    pub on_error: Box<dyn FnOnce(ClientErrorCode) + Send>,
    pub on_timeout: Box<dyn FnOnce() + Send>,
}

/// The outcome of feeding one inbound packet to a `ClientPair`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// Still reassembling; nothing for the worker to do yet.
    AwaitingMore,
    /// The ACK for a multi-packet request's first packet arrived; the
    /// worker should now transmit the remainder of the request chain and
    /// the pair has moved to `WResponse`.
    AckReceived,
    /// The packet received while in `WAck` didn't look like the literal
    /// 3-byte ACK body; dropped without a state change.
    NotAnAck,
    /// The response is fully reassembled; the worker should disarm the
    /// timer and invoke `on_success`.
    Complete,
    OutOfOrder,
    SizeMismatch,
}

/// State of one outbound request (spec.md §3 "Client pair").
pub struct ClientPair {
    pub request: Message,
    pub reply: Message,
    pub state: ClientState,
    pub reply_expected_packets: u8,
    pub reply_received_packets: u8,
    pub ctx: Option<RequestContext>,
    pub timer: Option<TimerToken>,
}

impl ClientPair {
    pub fn new(request: Message, reply_peer: HostTuple, ctx: RequestContext) -> Self {
        let state = if request.len() > 1 {
            ClientState::WAck
        } else {
            ClientState::WResponse
        };
        let reply_rid = request.req_id;
        ClientPair {
            request,
            reply: Message::new(reply_peer, reply_rid),
            state,
            reply_expected_packets: 0,
            reply_received_packets: 0,
            ctx: ctx.into(),
            timer: None,
        }
    }

    /// The buffers still owed to the peer after the head packet has gone
    /// out: everything but the first buffer of the request chain.
    pub fn remainder(&self) -> &[Buffer] {
        &self.request.buffers[1.min(self.request.len())..]
    }

    /// Feeds one inbound packet addressed to this pair through its state
    /// machine (spec.md §4.4).
    pub fn handle_inbound(&mut self, buf: Buffer) -> ClientOutcome {
        match self.state {
            ClientState::WAck => {
                if buf.payload() == ACK_BODY {
                    self.state = ClientState::WResponse;
                    ClientOutcome::AckReceived
                } else {
                    ClientOutcome::NotAnAck
                }
            }
            ClientState::WResponse => self.handle_response_fragment(buf),
        }
    }

    fn handle_response_fragment(&mut self, buf: Buffer) -> ClientOutcome {
        let header = buf.header;
        if header.is_first() {
            self.reply_expected_packets = header.p_order;
            self.reply_received_packets = 1;
        } else {
            // Subsequent packets are numbered 1, 2, ... in chain order
            // (spec.md §3); `reply_received_packets` already counts the
            // head, so the next subsequent packet due is numbered exactly
            // `reply_received_packets` (spec.md §8 S3: packet 2 arrives
            // with p_order = 1 "as expected after first").
            if header.p_order != self.reply_received_packets {
                return ClientOutcome::OutOfOrder;
            }
            self.reply_received_packets += 1;
        }

        let is_last = header.is_last();
        self.reply.push(buf);

        if !is_last {
            return ClientOutcome::AwaitingMore;
        }

        if self.reply_received_packets != self.reply_expected_packets {
            return ClientOutcome::SizeMismatch;
        }

        ClientOutcome::Complete
    }
}
