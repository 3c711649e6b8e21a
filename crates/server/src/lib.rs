//! Tailcast streaming server.
//!
//! Listens on a TCP port and serves two things on every path: a bootstrap
//! HTML page for first-time visitors (plain GET) and a WebSocket upgrade
//! on the `/ws` suffix that pushes filtered log lines as they are appended
//! to the monitored file. Reconnecting clients resume from their last
//! offset, supplied explicitly as query parameters or remembered per
//! source IP.

mod http;
mod page;
mod server;
mod session;

pub use server::{ServerConfig, TailServer};
pub use session::SessionConfig;

use std::time::Duration;

/// Time allowed for a single line frame to reach the client.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Interval between polls of the monitored file.
pub const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Extra sleep after a poll cycle that found no new content.
pub const IDLE_BACKOFF: Duration = Duration::from_secs(10);

/// Maximum size of an incoming client frame. Clients never send anything
/// meaningful, so this only needs to admit control-sized messages.
pub const WS_READ_LIMIT: usize = 512;

/// Path suffix that selects the streaming endpoint.
pub const STREAM_SUFFIX: &str = "/ws";

/// Maximum size of an HTTP request head we are willing to buffer.
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Errors produced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("request head exceeds {MAX_REQUEST_HEAD} bytes")]
    HeadTooLarge,

    #[error("not a WebSocket upgrade request")]
    NotAnUpgrade,
}
