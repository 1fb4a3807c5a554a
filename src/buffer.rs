//! Owned packet memory and message chains.
//!
//! spec.md models a buffer as opaque, transport-owned memory forward-linked
//! into a chain, and a message as `{ head_buffer, tail_buffer, sender,
//! req_id }`. Here a `Buffer` just owns its header and payload bytes, and a
//! `Message` is the chain as an ordered `Vec<Buffer>` (see SPEC_FULL.md
//! §4.2 Open Question resolution) — the borrow checker gives us the
//! exclusive-ownership invariant (spec.md §3 invariant 4) for free, so
//! there is no separate free-in-bulk step: dropping the `Message` drops
//! every buffer in it.

use crate::header::{Header, HEADER_SIZE};
use crate::protocol::HostTuple;
use crate::protocol::RequestId;

/// One packet's worth of owned memory: a header plus its payload.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub header: Header,
    payload: Vec<u8>,
}

impl Buffer {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Serializes header + payload into one contiguous datagram, as the
    /// transport would send it.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE + self.payload.len()];
        self.header.write(&mut out[..HEADER_SIZE]);
        out[HEADER_SIZE..].copy_from_slice(&self.payload);
        out
    }

    /// Parses a single datagram off the wire into a `Buffer`.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, crate::error::EngineError> {
        let header = Header::parse(bytes)?;
        let hsize = header.header_size as usize;
        let payload = bytes.get(hsize..).unwrap_or(&[]).to_vec();
        Ok(Self { header, payload })
    }
}

/// A chain of buffers representing one logical request or response.
#[derive(Debug, Clone)]
pub struct Message {
    pub buffers: Vec<Buffer>,
    pub sender: HostTuple,
    pub req_id: RequestId,
}

impl Message {
    pub fn new(sender: HostTuple, req_id: RequestId) -> Self {
        Self {
            buffers: Vec::new(),
            sender,
            req_id,
        }
    }

    pub fn push(&mut self, buf: Buffer) {
        self.buffers.push(buf);
    }

    pub fn head(&self) -> Option<&Buffer> {
        self.buffers.first()
    }

    pub fn tail(&self) -> Option<&Buffer> {
        self.buffers.last()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Concatenates every buffer's payload, in chain order.
    pub fn concat_payload(&self) -> Vec<u8> {
        let total: usize = self.buffers.iter().map(|b| b.payload_len()).sum();
        let mut out = Vec::with_capacity(total);
        for b in &self.buffers {
            out.extend_from_slice(b.payload());
        }
        out
    }
}
