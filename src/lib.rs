//! # R2P2
//!
//! A datagram-based request/response RPC protocol engine.
//!
//! A client sends a request and gets back exactly one response, addressed
//! by a 16-bit request id chosen by the client. Requests and responses
//! that don't fit in one datagram are split into a chain of fixed-size
//! fragments and reassembled on the other end; a request chain longer
//! than one packet is preceded by a small first packet and a three-way
//! handshake (first packet, ACK, remainder) so the sender doesn't have to
//! commit the rest of a large request to the wire before it knows the
//! peer is listening.
//!
//! ## Architecture
//!
//! - **Wire format**: a fixed 7-byte header (magic, header size, packed
//!   type/policy nibbles, flags, request id, packet order) in front of an
//!   opaque payload. See [`header`].
//! - **Fragmentation and reassembly**: [`assembler`] builds outbound
//!   fragment chains; [`client`] and [`server`] drive the two sides'
//!   reassembly state machines.
//! - **Memory**: every packet's bytes live in a [`buffer::Buffer`]; a
//!   [`buffer::Message`] is an owned chain of them. [`pool`] hands out
//!   generation-checked handles to pairs so a stale handle can never
//!   alias a reused slot.
//! - **Collaborators**: [`transport::Transport`] and [`timer::Clock`] are
//!   the engine's only external dependencies, both swappable for tests.
//! - **Orchestration**: [`worker::Worker`] ties all of the above into the
//!   engine's public operations.
#![forbid(unsafe_code)]

pub mod assembler;
pub mod buffer;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod timer;
pub mod transport;
pub mod worker;

pub use buffer::{Buffer, Message};
pub use client::{ClientErrorCode, ClientPair, RequestContext};
pub use error::EngineError;
pub use header::Header;
pub use pool::Handle;
pub use protocol::{HostTuple, RequestId, RoutingPolicy};
pub use server::ServerPair;
pub use timer::{Clock, SystemClock};
pub use transport::Transport;
pub use worker::{Worker, WorkerConfig};
