//! Runtime configuration
//!
//! Command-line arguments for the binary and the connection timing
//! constants shared by every connection.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Deadline for a single write to a connection
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Period between heartbeat pings
pub const PING_PERIOD: Duration = Duration::from_secs(10);

/// How long a connection may go without a pong before it is dead
pub const PONG_WAIT: Duration = Duration::from_secs(30);

/// Largest inbound WebSocket message accepted
pub const MAX_MESSAGE_SIZE: usize = 512 << 10;

/// Connection timing and size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub write_wait: Duration,
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            write_wait: WRITE_WAIT,
            ping_period: PING_PERIOD,
            pong_wait: PONG_WAIT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "rendezvous_relay")]
#[command(about = "1:1 signaling relay with a STUN binding responder", long_about = None)]
pub struct Args {
    /// Address for the HTTP / WebSocket listener
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub http_addr: String,

    /// Address for the STUN binding responder
    #[arg(long, default_value = "0.0.0.0:3478")]
    pub stun_addr: String,

    /// Directory served for any path that is not `/ws` or `/leave`
    #[arg(long, default_value = "./web")]
    pub web_root: PathBuf,

    /// Do not start the STUN binding responder
    #[arg(long)]
    pub no_discovery: bool,
}

/// Whether verbose per-message tracing was requested through `DEBUG`
pub fn debug_enabled() -> bool {
    std::env::var("DEBUG").is_ok_and(|v| !v.is_empty())
}
