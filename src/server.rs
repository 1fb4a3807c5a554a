//! Server-side request state machine (spec.md §4.5).
//!
//! Implicit states: absent → assembling → delivered → replying → done.
//! "absent" and "delivered"/"replying"/"done" aren't represented by a
//! `ServerState` enum the way the client side has one, because nothing
//! branches on them beyond "is this `ServerPair` still in the pending
//! registry" (assembling) versus "is it only reachable via its `Handle`
//! now" (delivered) — exactly invariant 2 of spec.md §3.

use crate::buffer::{Buffer, Message};
use crate::protocol::{HostTuple, RequestId};

/// The outcome of feeding one packet to a `ServerPair`, including the one
/// that creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOutcome {
    /// More fragments are still expected.
    AwaitingMore,
    /// Reassembly is complete; the worker should deliver the payload to
    /// the receive callback.
    Complete,
    OutOfOrder,
    SizeMismatch,
}

/// State of one inbound request (spec.md §3 "Server pair").
///
/// spec.md's `SP` also names a `reply: Message` field, but nothing ever
/// reads or writes it before a `ServerPair` is freed: `send_response`
/// assembles the reply fresh from the application's `iov` and sends it
/// directly, so carrying a second `Message` here the whole reassembly
/// lifetime would just be dead storage. Omitted rather than left unused.
pub struct ServerPair {
    pub request: Message,
    pub request_expected_packets: u8,
    pub request_received_packets: u8,
}

impl ServerPair {
    /// Creates a `ServerPair` from the first packet of a new request and
    /// folds that packet's buffer into it, returning whether reassembly
    /// is already complete (a single-packet request never enters the
    /// pending registry at all — see invariant 2).
    pub fn new(sender: HostTuple, rid: RequestId, buf: Buffer) -> (Self, ServerOutcome) {
        let header = buf.header;
        let expected = header.p_order;
        let is_last = header.is_last();

        let mut sp = ServerPair {
            request: Message::new(sender, rid),
            request_expected_packets: expected,
            request_received_packets: 1,
        };
        sp.request.push(buf);

        let outcome = if !is_last {
            ServerOutcome::AwaitingMore
        } else if sp.request_received_packets != sp.request_expected_packets {
            ServerOutcome::SizeMismatch
        } else {
            ServerOutcome::Complete
        };
        (sp, outcome)
    }

    /// Feeds a non-first packet of this request through reassembly.
    pub fn handle_subsequent(&mut self, buf: Buffer) -> ServerOutcome {
        let header = buf.header;
        // Same numbering convention as the client side (spec.md §3, §8 S3):
        // the next subsequent packet due is numbered exactly
        // `request_received_packets`, which already counts the head.
        if header.p_order != self.request_received_packets {
            return ServerOutcome::OutOfOrder;
        }
        self.request_received_packets += 1;

        let is_last = header.is_last();
        self.request.push(buf);

        if !is_last {
            return ServerOutcome::AwaitingMore;
        }

        if self.request_received_packets != self.request_expected_packets {
            return ServerOutcome::SizeMismatch;
        }

        ServerOutcome::Complete
    }
}
