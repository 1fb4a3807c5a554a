//! Outbound fragmentation (spec.md §4.2) and inbound zero-copy delivery
//! (spec.md §4.3).

use smallvec::SmallVec;

use crate::buffer::{Buffer, Message};
use crate::error::EngineError;
use crate::header::Header;
use crate::protocol::{
    max_message_size, HostTuple, MessageKind, RequestId, RoutingPolicy, MAX_PACKETS_PER_MESSAGE,
};

/// A gather vector of payload fragments supplied by the application, in the
/// order they should be concatenated. Mirrors the original `(base, len)`
/// iovec without exposing raw pointers.
pub type IoVec<'a> = &'a [&'a [u8]];

/// Splits `iov` into a chain of framed buffers addressed to/from `peer`.
///
/// The first buffer of a multi-packet message carries at most
/// `min_payload_size` bytes; every other buffer carries up to
/// `payload_size` bytes. A single-packet message carries up to
/// `payload_size` bytes in its one buffer. After assembly the head
/// buffer's `F_FLAG` is set and its `p_order` is overwritten with the
/// total packet count; the tail buffer's `L_FLAG` is set (coinciding with
/// the head for single-packet messages).
pub fn assemble_outbound(
    iov: IoVec<'_>,
    kind: MessageKind,
    policy: RoutingPolicy,
    rid: RequestId,
    peer: HostTuple,
    min_payload_size: usize,
    payload_size: usize,
) -> Result<Message, EngineError> {
    let fragments: Vec<&[u8]> = iov.iter().copied().filter(|f| !f.is_empty()).collect();
    let total_payload: usize = fragments.iter().map(|f| f.len()).sum();
    let limit = max_message_size(min_payload_size, payload_size);
    if total_payload > limit {
        return Err(EngineError::InvalidPayload(format!(
            "{total_payload} bytes exceeds maximum message size {limit}"
        )));
    }
    let single_packet = total_payload <= payload_size;

    let mut msg = Message::new(peer, rid);
    let mut frag_idx = 0usize;
    let mut frag_off = 0usize;
    let mut remaining = total_payload;

    loop {
        let is_head = msg.is_empty();
        let cap = if is_head && !single_packet {
            min_payload_size
        } else {
            payload_size
        };
        let take = remaining.min(cap);

        let mut payload = Vec::with_capacity(take);
        let mut need = take;
        while need > 0 {
            let frag = fragments[frag_idx];
            let avail = frag.len() - frag_off;
            let n = avail.min(need);
            payload.extend_from_slice(&frag[frag_off..frag_off + n]);
            frag_off += n;
            need -= n;
            if frag_off == frag.len() {
                frag_idx += 1;
                frag_off = 0;
            }
        }

        // `msg.len()` before the push is this buffer's 0-based index, which
        // doubles as its 1-based subsequent-packet sequence number (spec.md
        // §3: "on subsequent packets: packet sequence number starting at
        // 1") — the head (index 0) gets this overwritten with the total
        // packet count below.
        let header = Header::new(kind, policy, rid, msg.len() as u8);
        msg.push(Buffer::new(header, payload));
        remaining -= take;
        if remaining == 0 {
            break;
        }
    }

    let total_packets = msg.len() as u8;
    msg.buffers[0].header.set_first(true);
    msg.buffers[0].header.p_order = total_packets;
    msg.buffers
        .last_mut()
        .expect("assembler always produces at least one buffer")
        .header
        .set_last(true);

    Ok(msg)
}

/// Builds a zero-copy delivery vector over a completed message's buffers,
/// one payload slice per packet in chain order. Bounded at 255 entries,
/// matching the 8-bit packet counter; exceeding it is a protocol violation
/// rather than something that can happen from well-formed input, since
/// reassembly itself is bounded by the first packet's advertised count.
pub fn build_delivery_iovec<'a>(
    msg: &'a Message,
) -> Result<SmallVec<[&'a [u8]; 8]>, EngineError> {
    if msg.len() > MAX_PACKETS_PER_MESSAGE {
        return Err(EngineError::TooManyFragments);
    }
    Ok(msg.buffers.iter().map(Buffer::payload).collect())
}
