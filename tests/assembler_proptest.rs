//! Property-based round trip over the outbound assembler and inbound
//! delivery-vector builder (spec.md §8, invariants 1 and 2).

use proptest::prelude::*;
use std::net::Ipv4Addr;

use r2p2::assembler::{assemble_outbound, build_delivery_iovec};
use r2p2::protocol::{HostTuple, MessageKind, RequestId, RoutingPolicy};

fn peer() -> HostTuple {
    HostTuple::new(Ipv4Addr::new(10, 0, 0, 1), 4242)
}

proptest! {
    /// Invariant 1: for any payload up to the maximum message size,
    /// assembling it yields a chain whose concatenated payload equals the
    /// input byte-for-byte, and the zero-copy delivery vector concatenates
    /// to the same bytes.
    #[test]
    fn assembled_chain_round_trips_payload(
        data in prop::collection::vec(any::<u8>(), 0..6000),
        rid in any::<u16>(),
    ) {
        let msg = assemble_outbound(
            &[&data],
            MessageKind::Request,
            RoutingPolicy::FIXED_ROUTE,
            RequestId(rid),
            peer(),
            256,
            1400,
        ).unwrap();

        prop_assert_eq!(msg.concat_payload(), data.clone());

        let iovec = build_delivery_iovec(&msg).unwrap();
        let reassembled: Vec<u8> = iovec.iter().flat_map(|s| s.iter().copied()).collect();
        prop_assert_eq!(reassembled, data);
    }

    /// Invariant 2: the head packet's F_FLAG is set and L_FLAG clear
    /// (unless it's also the tail), its p_order equals the total packet
    /// count; the tail's L_FLAG is set; every intermediate packet's
    /// p_order equals its 1-based sequence index.
    #[test]
    fn header_flags_and_sequence_numbers_match_spec(
        data in prop::collection::vec(any::<u8>(), 1..6000),
    ) {
        let msg = assemble_outbound(
            &[&data],
            MessageKind::Request,
            RoutingPolicy::FIXED_ROUTE,
            RequestId(7),
            peer(),
            256,
            1400,
        ).unwrap();

        let total = msg.len();
        prop_assert!(msg.buffers[0].header.is_first());
        prop_assert_eq!(msg.buffers[0].header.p_order as usize, total);
        prop_assert!(msg.buffers[total - 1].header.is_last());

        if total > 1 {
            prop_assert!(!msg.buffers[0].header.is_last());
            for i in 1..total {
                prop_assert!(!msg.buffers[i].header.is_first());
                prop_assert_eq!(msg.buffers[i].header.p_order as usize, i);
            }
        }
    }

    /// Splitting payload across several application-supplied fragments
    /// produces the same assembled bytes as one contiguous buffer would.
    #[test]
    fn fragment_boundaries_do_not_affect_assembled_bytes(
        a in prop::collection::vec(any::<u8>(), 0..500),
        b in prop::collection::vec(any::<u8>(), 0..500),
        c in prop::collection::vec(any::<u8>(), 0..500),
    ) {
        let mut expected = Vec::new();
        expected.extend_from_slice(&a);
        expected.extend_from_slice(&b);
        expected.extend_from_slice(&c);

        let msg = assemble_outbound(
            &[&a, &b, &c],
            MessageKind::Request,
            RoutingPolicy::FIXED_ROUTE,
            RequestId(9),
            peer(),
            256,
            1400,
        ).unwrap();

        prop_assert_eq!(msg.concat_payload(), expected);
    }
}

/// Boundary: exactly `PAYLOAD_SIZE` bytes takes the single-packet path (no
/// ACK handshake needed).
#[test]
fn boundary_exactly_payload_size_is_single_packet() {
    let data = vec![0u8; r2p2::protocol::PAYLOAD_SIZE];
    let msg = assemble_outbound(
        &[&data],
        MessageKind::Request,
        RoutingPolicy::FIXED_ROUTE,
        RequestId(1),
        peer(),
        r2p2::protocol::MIN_PAYLOAD_SIZE,
        r2p2::protocol::PAYLOAD_SIZE,
    )
    .unwrap();
    assert_eq!(msg.len(), 1);
}

/// Boundary: one byte over `PAYLOAD_SIZE` triggers the multi-packet path,
/// with the first packet capped at `MIN_PAYLOAD_SIZE`.
#[test]
fn boundary_one_over_payload_size_is_multi_packet() {
    let data = vec![0u8; r2p2::protocol::PAYLOAD_SIZE + 1];
    let msg = assemble_outbound(
        &[&data],
        MessageKind::Request,
        RoutingPolicy::FIXED_ROUTE,
        RequestId(1),
        peer(),
        r2p2::protocol::MIN_PAYLOAD_SIZE,
        r2p2::protocol::PAYLOAD_SIZE,
    )
    .unwrap();
    assert!(msg.len() > 1);
    assert_eq!(
        msg.buffers[0].payload_len(),
        r2p2::protocol::MIN_PAYLOAD_SIZE
    );
}
