//! Fixed wire header: pack/unpack and flag/nibble accessors.
//!
//! Layout (little-endian, spec.md §3):
//!
//! ```text
//! byte 0: magic
//! byte 1: header_size
//! byte 2: type_policy  (upper nibble = type, lower nibble = policy)
//! byte 3: flags        (F_FLAG | L_FLAG)
//! byte 4..6: rid        (u16 LE)
//! byte 6: p_order
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::EngineError;
use crate::protocol::{flags, MessageKind, RequestId, RoutingPolicy, MAGIC};

/// Size in bytes of the fixed wire header.
pub const HEADER_SIZE: usize = 7;

/// A parsed packet header.
///
/// `kind_nibble` and `policy_nibble` each hold a raw 4-bit value (0-15);
/// `type_policy` is only ever packed/unpacked at the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub header_size: u8,
    kind_nibble: u8,
    policy_nibble: u8,
    pub flags: u8,
    pub rid: RequestId,
    /// Total packet count on the first packet of a message; sequence
    /// number (starting at 1) on every subsequent packet.
    pub p_order: u8,
}

impl Header {
    /// Builds a fresh header with `flags = 0`, ready to be patched once the
    /// assembler knows whether this is the head/tail of the chain.
    pub fn new(kind: MessageKind, policy: RoutingPolicy, rid: RequestId, p_order: u8) -> Self {
        Self {
            header_size: HEADER_SIZE as u8,
            kind_nibble: kind.to_nibble() & 0x0F,
            policy_nibble: policy.0 & 0x0F,
            flags: 0,
            rid,
            p_order,
        }
    }

    pub fn message_kind(&self) -> MessageKind {
        MessageKind::from_nibble(self.kind_nibble)
    }

    pub fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy(self.policy_nibble)
    }

    pub fn is_first(&self) -> bool {
        self.flags & flags::F_FLAG != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & flags::L_FLAG != 0
    }

    pub fn set_first(&mut self, first: bool) {
        if first {
            self.flags |= flags::F_FLAG;
        } else {
            self.flags &= !flags::F_FLAG;
        }
    }

    pub fn set_last(&mut self, last: bool) {
        if last {
            self.flags |= flags::L_FLAG;
        } else {
            self.flags &= !flags::L_FLAG;
        }
    }

    /// Parses a header from the front of `buf`. Enforces `magic`; a
    /// mismatch or a too-short buffer is a hard drop (spec.md §7).
    pub fn parse(buf: &[u8]) -> Result<Self, EngineError> {
        if buf.len() < HEADER_SIZE {
            return Err(EngineError::ShortPacket);
        }
        let mut cur = Cursor::new(buf);
        let magic = cur.read_u8().map_err(|_| EngineError::ShortPacket)?;
        if magic != MAGIC {
            return Err(EngineError::BadMagic);
        }
        let header_size = cur.read_u8().map_err(|_| EngineError::ShortPacket)?;
        let type_policy = cur.read_u8().map_err(|_| EngineError::ShortPacket)?;
        let flag_bits = cur.read_u8().map_err(|_| EngineError::ShortPacket)?;
        let rid = cur
            .read_u16::<LittleEndian>()
            .map_err(|_| EngineError::ShortPacket)?;
        let p_order = cur.read_u8().map_err(|_| EngineError::ShortPacket)?;

        Ok(Self {
            header_size,
            kind_nibble: (type_policy & 0xF0) >> 4,
            policy_nibble: type_policy & 0x0F,
            flags: flag_bits,
            rid: RequestId(rid),
            p_order,
        })
    }

    /// Writes this header to the front of `buf`, which must be at least
    /// `HEADER_SIZE` bytes.
    pub fn write(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        let mut cur = Cursor::new(buf);
        let _ = cur.write_u8(MAGIC);
        let _ = cur.write_u8(self.header_size);
        let type_policy = (self.kind_nibble << 4) | self.policy_nibble;
        let _ = cur.write_u8(type_policy);
        let _ = cur.write_u8(self.flags);
        let _ = cur.write_u16::<LittleEndian>(self.rid.0);
        let _ = cur.write_u8(self.p_order);
    }
}
