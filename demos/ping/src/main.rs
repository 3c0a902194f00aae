//! # rpclink ping
//!
//! Sends a handful of requests through a [`ClientTransport`] and prints the
//! round-trip time of each.
//!
//! ## Usage
//!
//! ```bash
//! # Ping a local echo peer started by the demo itself
//! rpclink-ping
//!
//! # Ping a running peer
//! rpclink-ping --address 127.0.0.1:4801 --count 10
//! ```
//!
//! Every request goes through `create`, so all of them share one cached TCP
//! connection. Set `RUST_LOG=rpclink_client=debug` to watch the cache.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use argh::FromArgs;
use rpclink_client::{ClientTransport, ClientTransportConfig, TcpConnector};
use rpclink_common::transport::{
    read_frame, write_frame, Codec, Frame, FrameKind, JsonCodec, MAX_FRAME_SIZE,
};
use rpclink_common::{Address, Response};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

#[derive(FromArgs)]
/// Ping an rpclink peer
struct Args {
    /// peer address as host:port; starts a local echo peer when omitted
    #[argh(option, short = 'a')]
    address: Option<Address>,

    /// number of requests to send
    #[argh(option, short = 'c', default = "5")]
    count: u32,

    /// pause between requests in milliseconds
    #[argh(option, long = "interval-ms", default = "200")]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let address = match args.address {
        Some(address) => address,
        None => start_echo_peer().await?,
    };

    let transport = ClientTransport::new(
        TcpConnector::default(),
        JsonCodec,
        ClientTransportConfig::default(),
    )?;

    for seq in 0..args.count {
        let channel = transport.create(address.clone());
        let started = Instant::now();
        match channel.call("ping", json!({"seq": seq})).await {
            Ok(result) => println!(
                "{}: seq={} reply={} time={:?}",
                address,
                seq,
                result,
                started.elapsed()
            ),
            Err(e) => println!("{}: seq={} error: {}", address, seq, e),
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    tracing::info!(cached = transport.cached_connections(), "Done");
    Ok(())
}

async fn start_echo_peer() -> Result<Address> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind echo peer")?;
    let address = Address::from(listener.local_addr()?);
    tracing::info!("Echo peer listening on {}", address);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Echo peer accepted {}", peer);
                    tokio::spawn(async move {
                        if let Err(e) = echo(stream).await {
                            tracing::warn!("Echo peer connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Echo peer accept failed: {}", e);
                    break;
                }
            }
        }
    });

    Ok(address)
}

async fn echo(mut stream: TcpStream) -> rpclink_common::Result<()> {
    while let Some(frame) = read_frame(&mut stream, MAX_FRAME_SIZE).await? {
        if frame.kind != FrameKind::Request {
            continue;
        }
        let request = JsonCodec.decode_request(&frame.payload)?;
        let response = Response::success(request.id, request.args);
        let reply = JsonCodec.encode_response(&response)?;
        write_frame(&mut stream, &Frame::response(frame.stream_id, reply)).await?;
    }
    Ok(())
}
