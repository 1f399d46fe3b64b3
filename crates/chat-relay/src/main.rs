//! Line-broadcast chat relay.
//!
//! Every line a client sends is written to every connected client, the
//! sender included. Useful for trying the chat client locally.
//!
//! Set `BIND_ADDR` (default `0.0.0.0`) and `PORT` (default `5999`).

mod relay;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chat_core::config::DEFAULT_PORT;
use tracing_subscriber::EnvFilter;

use relay::ChatRelay;

#[tokio::main]
async fn main() {
    // Initialise tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ip: IpAddr = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::new(ip, port);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Chat relay listening on {addr}");

    ChatRelay::new().serve(listener).await;
}
