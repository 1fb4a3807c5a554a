use thiserror::Error;

/// Errors surfaced by the R2P2 protocol engine.
///
/// Most of these correspond directly to the error taxonomy of the protocol:
/// malformed or out-of-order packets are dropped at the point they're
/// detected and never reach application code, while the variants here are
/// the ones that escape to a `Result` or an `error_cb` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The client or server pair pool has no free slot.
    ///
    /// Pools are fixed-size and pre-provisioned for peak concurrency; this
    /// is recoverable here (the caller gets a `Result`) rather than a hard
    /// assertion, per the pool-exhaustion redesign.
    #[error("pool exhausted (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    /// A payload vector exceeded the maximum message size the 8-bit
    /// packet counter can express (`min_payload_size + 254 * payload_size`).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// `Header::parse` was given fewer bytes than `header_size`.
    #[error("packet shorter than header")]
    ShortPacket,

    /// `Header::parse` saw a magic byte that doesn't match the protocol's.
    #[error("bad magic byte")]
    BadMagic,

    /// The packet's `type_policy` kind nibble is a reserved value neither
    /// the client nor server state machine knows how to route.
    #[error("reserved/unrecognized message kind")]
    UnrecognizedMessageKind,

    /// A fragment arrived with `p_order` other than the expected next
    /// sequence number (client or server side).
    #[error("out-of-order fragment")]
    OutOfOrder,

    /// The last fragment arrived but the running count didn't match the
    /// count advertised by the first fragment.
    #[error("fragment count mismatch")]
    SizeMismatch,

    /// The transport could not allocate resources to send this pair's
    /// request (`prepare_to_send` failed).
    #[error("transport failed to prepare send: {0}")]
    SendPrepareFailed(String),

    /// The transport's `send` call itself failed.
    #[error("transport send failed: {0}")]
    TransportSend(String),

    /// The reassembly delivery vector would exceed the 255-entry bound
    /// implied by the 8-bit packet counter.
    #[error("reassembly exceeded 255 fragments")]
    TooManyFragments,

    /// `send_response` was called with a `Handle` that doesn't name a
    /// pending (or any) server pair, e.g. because it was already replied
    /// to or evicted as a stale duplicate.
    #[error("no such server pair")]
    UnknownServerPair,
}
