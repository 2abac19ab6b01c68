//! Rendezvous Relay - Entry Point
//!
//! Starts the STUN responder and the HTTP / WebSocket listener.

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;

use rendezvous_relay::config::{debug_enabled, Args};
use rendezvous_relay::logging::setup_logger;
use rendezvous_relay::{discovery, server, AppState, RelayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // DEBUG=1 turns on per-message tracing; RUST_LOG overrides both
    setup_logger(debug_enabled());

    if !args.no_discovery {
        let socket = UdpSocket::bind(&args.stun_addr).await?;
        info!("[stun] listening on UDP {}", socket.local_addr()?);
        tokio::spawn(discovery::run(socket));
    }

    let state = AppState::new(RelayConfig::default());
    let app = server::router(state, &args.web_root);

    let listener = TcpListener::bind(&args.http_addr).await?;
    info!("Relay listening on http://{}", listener.local_addr()?);
    info!("Serving assets from {}", args.web_root.display());

    server::serve(listener, app).await?;
    Ok(())
}
