//! Minimal in-process echo demonstration: a client sends one request to a
//! server over a channel-backed transport, the server echoes the payload
//! back uppercased, and the client prints what it got. Exercises the
//! single-packet path (spec.md §8 scenario S1).

use std::net::Ipv4Addr;
use std::sync::mpsc::TryRecvError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use r2p2::client::{ClientErrorCode, RequestContext};
use r2p2::protocol::{HostTuple, RoutingPolicy};
use r2p2::timer::SystemClock;
use r2p2::transport::ChannelTransport;
use r2p2::worker::{Worker, WorkerConfig};

fn main() {
    tracing_subscriber::fmt::init();

    let client_addr = HostTuple::new(Ipv4Addr::LOCALHOST, 9001);
    let server_addr = HostTuple::new(Ipv4Addr::LOCALHOST, 9002);

    let (client_transport, client_rx) = ChannelTransport::new();
    let (server_transport, server_rx) = ChannelTransport::new();

    let clock = Arc::new(SystemClock);
    let mut client = Worker::new(
        WorkerConfig {
            local: client_addr,
            ..Default::default()
        },
        client_transport,
        clock.clone(),
    );
    let mut server = Worker::new(
        WorkerConfig {
            local: server_addr,
            ..Default::default()
        },
        server_transport,
        clock,
    );

    server.set_recv_cb(move |handle, _peer, _rid, iovec| {
        let mut payload: Vec<u8> = iovec.iter().flat_map(|s| s.iter().copied()).collect();
        payload.make_ascii_uppercase();
        tracing::info!(request = %String::from_utf8_lossy(&payload), "server echoing request");
        // The handle is only valid for the duration of this callback in
        // this demo; a real server would stash it and call
        // `send_response` once it has assembled the reply asynchronously.
        PENDING_REPLIES.with(|p| p.borrow_mut().push((handle, payload)));
    });

    let result: Arc<Mutex<Option<Result<Vec<u8>, ClientErrorCode>>>> = Arc::new(Mutex::new(None));
    let result_for_success = result.clone();
    let result_for_error = result.clone();

    let ctx = RequestContext {
        destination: server_addr,
        routing_policy: RoutingPolicy::FIXED_ROUTE,
        timeout: Some(Duration::from_secs(1)),
        on_success: Box::new(move |_handle, iovec, _tx_ts| {
            let payload: Vec<u8> = iovec.iter().flat_map(|s| s.iter().copied()).collect();
            *result_for_success.lock().unwrap() = Some(Ok(payload));
        }),
        on_error: Box::new(move |code| {
            *result_for_error.lock().unwrap() = Some(Err(code));
        }),
        on_timeout: Box::new(|| {
            tracing::warn!("request timed out");
        }),
    };

    let request_payload = b"hello from the client";
    client
        .send_request(&[request_payload], ctx)
        .expect("send_request should succeed against a fresh worker");

    // Pump: client -> server, server -> client, until the exchange settles.
    for _ in 0..16 {
        drain(&client_rx, server_addr, &mut server);
        drain_pending_replies(&mut server);
        drain(&server_rx, client_addr, &mut client);
        if result.lock().unwrap().is_some() {
            break;
        }
    }

    match result.lock().unwrap().take() {
        Some(Ok(payload)) => {
            println!("client received: {}", String::from_utf8_lossy(&payload));
        }
        Some(Err(code)) => {
            println!("request failed: {code:?}");
        }
        None => {
            println!("request did not complete within the demo's pump budget");
        }
    }
}

fn drain<T: r2p2::transport::Transport>(
    rx: &std::sync::mpsc::Receiver<(HostTuple, Vec<u8>)>,
    sender: HostTuple,
    worker: &mut Worker<T>,
) {
    loop {
        match rx.try_recv() {
            Ok((_destination, bytes)) => {
                if let Err(e) = worker.handle_incoming_pck(sender, &bytes) {
                    tracing::debug!(error = %e, "dropped malformed packet");
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

thread_local! {
    static PENDING_REPLIES: std::cell::RefCell<Vec<(r2p2::Handle, Vec<u8>)>> =
        std::cell::RefCell::new(Vec::new());
}

fn drain_pending_replies<T: r2p2::transport::Transport>(server: &mut Worker<T>) {
    let replies = PENDING_REPLIES.with(|p| std::mem::take(&mut *p.borrow_mut()));
    for (handle, payload) in replies {
        if let Err(e) = server.send_response(handle, &[&payload]) {
            tracing::warn!(error = %e, "failed to send response");
        }
    }
}
