//! Front door for inbound datagrams: parse, then route by message kind.

use crate::buffer::Buffer;
use crate::error::EngineError;
use crate::protocol::MessageKind;

/// Which side of the engine an inbound packet belongs to, decided purely
/// from its header (spec.md §3: `is_response(h)`).
pub enum Route {
    /// Addressed to a client pair: an ACK or a response fragment.
    Client,
    /// Addressed to a server pair: a request fragment.
    Server,
}

/// Parses a raw datagram and classifies it. Returns `Err` for anything
/// that fails to parse as a well-formed header (spec.md §7: malformed
/// packets are dropped before they reach either state machine), including
/// a reserved message kind neither state machine knows how to route.
pub fn classify(bytes: &[u8]) -> Result<(Buffer, Route), EngineError> {
    let buf = Buffer::from_wire(bytes)?;
    let kind = buf.header.message_kind();
    if !is_recognized(kind) {
        return Err(EngineError::UnrecognizedMessageKind);
    }
    let route = if kind.is_response() {
        Route::Client
    } else {
        Route::Server
    };
    Ok((buf, route))
}

/// Whether a parsed header's message kind is one the engine recognizes.
/// `MessageKind::Reserved` values parse cleanly but have no defined
/// routing; callers should drop them rather than guess.
pub fn is_recognized(kind: MessageKind) -> bool {
    !matches!(kind, MessageKind::Reserved(_))
}
