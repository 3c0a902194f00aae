//! TCP Transport Integration Tests
//!
//! Runs the connection manager over loopback TCP against a small echo peer
//! that speaks the frame protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rpclink_client::{ClientTransport, ClientTransportConfig, TcpConnector, TcpConnectorConfig};
use rpclink_common::transport::{
    read_frame, write_frame, Codec, Frame, FrameKind, JsonCodec, MAX_FRAME_SIZE,
};
use rpclink_common::{Address, Request, Response, RpcError};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Loopback peer that answers every request with its args.
struct EchoPeer {
    address: Address,
    accepted: Arc<AtomicUsize>,
    one_way: Arc<AtomicUsize>,
    hangup: broadcast::Sender<()>,
}

impl EchoPeer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::from(listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let one_way = Arc::new(AtomicUsize::new(0));
        let (hangup, _) = broadcast::channel(1);

        let peer = Self {
            address,
            accepted: accepted.clone(),
            one_way: one_way.clone(),
            hangup: hangup.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, one_way.clone(), hangup.subscribe()));
            }
        });

        peer
    }

    /// Drops every connection accepted so far.
    fn hang_up(&self) {
        let _ = self.hangup.send(());
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn serve(
    mut stream: TcpStream,
    one_way: Arc<AtomicUsize>,
    mut hangup: broadcast::Receiver<()>,
) {
    loop {
        let frame = tokio::select! {
            _ = hangup.recv() => return,
            frame = read_frame(&mut stream, MAX_FRAME_SIZE) => frame,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            _ => return,
        };

        match frame.kind {
            FrameKind::Request => {
                let request = match JsonCodec.decode_request(&frame.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        let reply = Frame::error(frame.stream_id, e.to_string());
                        let _ = write_frame(&mut stream, &reply).await;
                        continue;
                    }
                };
                let response = Response::success(request.id, request.args);
                let reply = JsonCodec.encode_response(&response).unwrap();
                let frame = Frame::response(frame.stream_id, reply);
                if write_frame(&mut stream, &frame).await.is_err() {
                    return;
                }
            }
            FrameKind::FireAndForget => {
                one_way.fetch_add(1, Ordering::SeqCst);
            }
            FrameKind::Response | FrameKind::Error => return,
        }
    }
}

fn transport() -> ClientTransport<TcpConnector> {
    ClientTransport::new(
        TcpConnector::new(TcpConnectorConfig {
            connect_timeout_ms: 1000,
            ..Default::default()
        }),
        JsonCodec,
        ClientTransportConfig::default(),
    )
    .unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_channels_share_one_tcp_connection() {
    let peer = EchoPeer::start().await;
    let transport = transport();

    let channels: Vec<_> = (0..10).map(|_| transport.create(peer.address.clone())).collect();
    for (i, channel) in channels.iter().enumerate() {
        assert_eq!(channel.call("echo", json!(i)).await.unwrap(), json!(i));
    }

    assert_eq!(peer.accepted(), 1);
    assert_eq!(transport.cached_connections(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_requests_are_multiplexed() {
    let peer = EchoPeer::start().await;
    let transport = transport();
    let channel = transport.create(peer.address.clone());

    // The peer handles one connection sequentially, so replies come back in
    // request order; each request must still get its own reply.
    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("echo", json!({"i": i})).await })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap().unwrap(), json!({"i": i}));
    }
    assert_eq!(peer.accepted(), 1);
}

#[tokio::test]
async fn test_peer_hangup_evicts_and_reconnects() {
    let peer = EchoPeer::start().await;
    let transport = transport();

    let old = transport.create(peer.address.clone());
    old.call("echo", json!(1)).await.unwrap();

    peer.hang_up();
    wait_until(|| transport.cached_connections() == 0).await;

    let err = old.call("echo", json!(2)).await.unwrap_err();
    assert!(err.is_connection_lost(), "unexpected error: {:?}", err);

    let new = transport.create(peer.address.clone());
    assert_eq!(new.call("echo", json!(3)).await.unwrap(), json!(3));
    assert_eq!(peer.accepted(), 2);
}

#[tokio::test]
async fn test_refused_port_fails_channel_and_is_not_cached() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = Address::from(listener.local_addr().unwrap());
    drop(listener);

    let transport = transport();
    let channel = transport.create(address.clone());

    let err = channel
        .request_response(&Request::new("echo", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::ConnectFailure { address: ref failed, .. } if *failed == address
    ));
    assert_eq!(transport.cached_connections(), 0);
}

#[tokio::test]
async fn test_fire_and_forget_over_tcp() {
    let peer = EchoPeer::start().await;
    let transport = transport();
    let channel = transport.create(peer.address.clone());

    for _ in 0..5 {
        channel
            .fire_and_forget(&Request::new("notify", json!({})))
            .await
            .unwrap();
    }
    // A request/response round trip orders after the one-way frames.
    channel.call("echo", json!(0)).await.unwrap();

    assert_eq!(peer.one_way.load(Ordering::SeqCst), 5);
}
