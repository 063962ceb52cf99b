//! WebSocket relay server.
//!
//! Accepts any number of client connections, dispatches JSON envelopes and
//! raw binary frames to a [`Handler`] trait, and manages each connection's
//! lifecycle (ping/pong, graceful shutdown). Domain logic lives entirely in
//! the handler; this crate only moves frames.

mod connection;
mod handler;
mod server;

pub use connection::{ClientMeta, SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::{RelayServer, ServerConfig};

/// Per-connection send buffer capacity, in frames. Downloads push against
/// this buffer with `Sender::send_binary`, which awaits free slots.
pub const SEND_BUFFER_SIZE: usize = 2048;

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
