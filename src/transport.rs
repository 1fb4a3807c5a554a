//! The datagram transport collaborator.
//!
//! spec.md treats the transport, and the routing-policy layer that rides
//! alongside it, as entirely out of scope beyond the interface they
//! present: `send`, whatever resource `prepare_to_send` needs to reserve,
//! a `router_notify` hook fired once a reply has gone out, and optional
//! NIC TX timestamp extraction.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use crate::buffer::Buffer;
use crate::error::EngineError;
use crate::protocol::HostTuple;

/// The interface the engine needs from a datagram transport. Sending a
/// slice of buffers transmits each one as its own datagram, in order,
/// standing in for `buf_list_send` over a linked chain (spec.md §6).
pub trait Transport: Send {
    /// Acquires whatever per-pair resource the transport needs before a
    /// request can be sent (spec.md §4.4 step 2). The default
    /// implementation always succeeds; a transport with finite send
    /// resources (e.g. a fixed pool of socket descriptors) overrides this
    /// to fail fast.
    fn prepare_to_send(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn send(&mut self, buffers: &[Buffer], destination: HostTuple) -> Result<(), EngineError>;

    /// Optional NIC TX timestamp extraction (spec.md §1, §4.4 "optionally
    /// extract a TX timestamp"). Absent by default.
    fn extract_tx_timestamp(&mut self) -> Option<Instant> {
        None
    }

    /// Notifies the routing layer that a reply has gone out (spec.md §4.5,
    /// §1: "routing policy selection and router notification" is an
    /// external collaborator; the engine only needs to call it at the
    /// right point). No-op by default.
    fn router_notify(&mut self) {}
}

/// A transport that accepts every send and discards the bytes. Useful when
/// a test only cares about the engine's internal state transitions.
#[derive(Debug, Default)]
pub struct NullTransport {
    pub sent_count: usize,
}

impl Transport for NullTransport {
    fn send(&mut self, _buffers: &[Buffer], _destination: HostTuple) -> Result<(), EngineError> {
        self.sent_count += 1;
        Ok(())
    }
}

/// A transport that always fails `prepare_to_send`, for exercising the
/// `SendPrepareFailed` path (spec.md §9 open question 3 / REDESIGN FLAG 2).
#[derive(Debug, Default)]
pub struct RefusingTransport;

impl Transport for RefusingTransport {
    fn prepare_to_send(&mut self) -> Result<(), EngineError> {
        Err(EngineError::SendPrepareFailed(
            "no transport resources available".into(),
        ))
    }

    fn send(&mut self, _buffers: &[Buffer], _destination: HostTuple) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A transport that queues every sent datagram (as raw wire bytes) onto an
/// `mpsc` channel instead of touching a real socket, so two in-process
/// `Worker`s can be wired together in integration tests (spec.md §8 S1-S6).
pub struct ChannelTransport {
    tx: Sender<(HostTuple, Vec<u8>)>,
}

impl ChannelTransport {
    /// Creates a connected `(transport, receiver)` pair. The receiver side
    /// is drained by the test harness and fed into the peer's
    /// `handle_incoming_pck`.
    pub fn new() -> (Self, Receiver<(HostTuple, Vec<u8>)>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, buffers: &[Buffer], destination: HostTuple) -> Result<(), EngineError> {
        for buf in buffers {
            self.tx
                .send((destination, buf.to_wire()))
                .map_err(|e| EngineError::TransportSend(e.to_string()))?;
        }
        Ok(())
    }
}
