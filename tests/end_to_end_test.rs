//! End-to-end scenarios over a pair of in-process `Worker`s wired together
//! with `ChannelTransport`, exercising spec.md §8's S1/S2/S5/S6 scenarios.

use std::net::Ipv4Addr;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use r2p2::client::{ClientErrorCode, RequestContext};
use r2p2::protocol::{HostTuple, RoutingPolicy};
use r2p2::timer::ManualClock;
use r2p2::transport::ChannelTransport;
use r2p2::worker::{Worker, WorkerConfig};

fn client_addr() -> HostTuple {
    HostTuple::new(Ipv4Addr::LOCALHOST, 9101)
}

fn server_addr() -> HostTuple {
    HostTuple::new(Ipv4Addr::LOCALHOST, 9102)
}

/// Drains every datagram currently queued on `rx` into `worker`, as if it
/// arrived from `sender`.
fn drain(
    rx: &Receiver<(HostTuple, Vec<u8>)>,
    sender: HostTuple,
    worker: &mut Worker<ChannelTransport>,
) {
    loop {
        match rx.try_recv() {
            Ok((_dest, bytes)) => {
                worker.handle_incoming_pck(sender, &bytes).ok();
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

type OutcomeSlot = Arc<Mutex<Option<Result<Vec<u8>, ClientErrorCode>>>>;

fn request_context(destination: HostTuple, timeout: Duration, slot: OutcomeSlot) -> RequestContext {
    let success_slot = slot.clone();
    let error_slot = slot;
    RequestContext {
        destination,
        routing_policy: RoutingPolicy::FIXED_ROUTE,
        timeout: Some(timeout),
        on_success: Box::new(move |_handle, iovec, _tx_ts| {
            let payload: Vec<u8> = iovec.iter().flat_map(|s| s.iter().copied()).collect();
            *success_slot.lock().unwrap() = Some(Ok(payload));
        }),
        on_error: Box::new(move |code| {
            *error_slot.lock().unwrap() = Some(Err(code));
        }),
        on_timeout: Box::new(|| {}),
    }
}

/// S1 — single-packet echo: client sends "ping", server's receive callback
/// echoes the same bytes back via `send_response`. Expect `on_success`
/// invoked once with the concatenated payload.
#[test]
fn s1_single_packet_echo() {
    let (client_transport, client_rx) = ChannelTransport::new();
    let (server_transport, server_rx) = ChannelTransport::new();
    let clock = Arc::new(ManualClock::new(Instant::now()));

    let mut client = Worker::new(
        WorkerConfig {
            local: client_addr(),
            ..Default::default()
        },
        client_transport,
        clock.clone(),
    );
    let mut server = Worker::new(
        WorkerConfig {
            local: server_addr(),
            ..Default::default()
        },
        server_transport,
        clock,
    );

    let pending: Arc<Mutex<Vec<(r2p2::Handle, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let pending_cb = pending.clone();
    server.set_recv_cb(move |handle, _peer, _rid, iovec| {
        let payload: Vec<u8> = iovec.iter().flat_map(|s| s.iter().copied()).collect();
        pending_cb.lock().unwrap().push((handle, payload));
    });

    let result: OutcomeSlot = Arc::new(Mutex::new(None));
    let ctx = request_context(server_addr(), Duration::from_secs(5), result.clone());
    client.send_request(&[b"ping"], ctx).unwrap();

    for _ in 0..8 {
        drain(&client_rx, server_addr(), &mut server);
        let replies: Vec<_> = std::mem::take(&mut *pending.lock().unwrap());
        for (handle, payload) in replies {
            server.send_response(handle, &[&payload]).unwrap();
        }
        drain(&server_rx, client_addr(), &mut client);
        if result.lock().unwrap().is_some() {
            break;
        }
    }

    assert_eq!(result.lock().unwrap().take(), Some(Ok(b"ping".to_vec())));
}

/// S2 — multi-packet request: 4096 bytes of 0xAB with `MIN_PAYLOAD_SIZE =
/// 256`, `PAYLOAD_SIZE = 1400` assembles into 4 packets. The server must
/// ACK after the first packet before the client sends the remainder; the
/// server's receive callback must see exactly 4096 bytes.
#[test]
fn s2_multi_packet_request_handshakes_then_delivers_full_payload() {
    let (client_transport, client_rx) = ChannelTransport::new();
    let (server_transport, server_rx) = ChannelTransport::new();
    let clock = Arc::new(ManualClock::new(Instant::now()));

    let mut client = Worker::new(
        WorkerConfig {
            local: client_addr(),
            ..Default::default()
        },
        client_transport,
        clock.clone(),
    );
    let mut server = Worker::new(
        WorkerConfig {
            local: server_addr(),
            ..Default::default()
        },
        server_transport,
        clock,
    );

    let delivered: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let delivered_cb = delivered.clone();
    server.set_recv_cb(move |_handle, _peer, _rid, iovec| {
        let payload: Vec<u8> = iovec.iter().flat_map(|s| s.iter().copied()).collect();
        *delivered_cb.lock().unwrap() = Some(payload);
    });

    let payload = vec![0xABu8; 4096];
    let result: OutcomeSlot = Arc::new(Mutex::new(None));
    let ctx = request_context(server_addr(), Duration::from_secs(5), result);
    client.send_request(&[&payload], ctx).unwrap();

    // Head packet only has gone out so far (W_ACK): drive it to the
    // server, which must ACK without having the full request yet.
    drain(&client_rx, server_addr(), &mut server);
    assert!(delivered.lock().unwrap().is_none());

    // The ACK travels back; client sends the remainder.
    drain(&server_rx, client_addr(), &mut client);
    drain(&client_rx, server_addr(), &mut server);

    assert_eq!(delivered.lock().unwrap().take(), Some(payload));
}

/// S5 — timeout on a silent peer: client sends a single-packet request, no
/// response ever arrives, the armed timer fires. Expect `on_timeout`
/// invoked exactly once and the pending-client list left empty.
#[test]
fn s5_timeout_fires_once_on_silent_peer() {
    let (client_transport, _client_rx) = ChannelTransport::new();
    let now = Instant::now();
    let clock = Arc::new(ManualClock::new(now));

    let mut client = Worker::new(
        WorkerConfig {
            local: client_addr(),
            default_timeout: Duration::from_millis(50),
            ..Default::default()
        },
        client_transport,
        clock.clone(),
    );

    let timed_out = Arc::new(Mutex::new(0u32));
    let timed_out_cb = timed_out.clone();
    let ctx = RequestContext {
        destination: server_addr(),
        routing_policy: RoutingPolicy::FIXED_ROUTE,
        timeout: Some(Duration::from_millis(50)),
        on_success: Box::new(|_h, _iov, _tx_ts| panic!("no response should ever arrive")),
        on_error: Box::new(|_code| panic!("a silent peer times out, it does not error")),
        on_timeout: Box::new(move || {
            *timed_out_cb.lock().unwrap() += 1;
        }),
    };
    client.send_request(&[b"ping"], ctx).unwrap();

    // Not yet due.
    client.timer_triggered();
    assert_eq!(*timed_out.lock().unwrap(), 0);

    clock.advance(Duration::from_millis(100));
    client.timer_triggered();
    assert_eq!(*timed_out.lock().unwrap(), 1);

    // A second poll must not re-fire the same (now freed) timer.
    client.timer_triggered();
    assert_eq!(*timed_out.lock().unwrap(), 1);
}
