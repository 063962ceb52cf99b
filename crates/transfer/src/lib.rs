//! File transfer core: per-connection upload sessions, the upload state
//! machine, and download streaming.
//!
//! Inbound chunks accumulate in a local staging file until the declared
//! size is reached, then the staged file is committed to the backend exactly
//! once and all local state is discarded. Downloads are the inverse: the
//! backend file is fetched to a staging path, announced by size, streamed in
//! fixed windows, and the staging copy deleted.

mod download;
mod session;
mod upload;

pub use download::{ChunkReader, DownloadEvent, DownloadStreamer};
pub use session::{SessionRegistry, TransferSession, UploadPhase};
pub use upload::{ChunkDisposition, CommitOutcome, UploadCoordinator};

use uuid::Uuid;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    InvalidName(#[from] skiff_protocol::InvalidName),

    /// A chunk arrived for a connection with no upload in progress, or after
    /// its upload completed. A protocol violation by the client, not a fault.
    #[error("no upload session for connection {0}")]
    SessionNotFound(Uuid),

    #[error("client disconnected mid-stream")]
    Disconnected,
}

/// Removes a staging file, tolerating one that is already gone.
pub(crate) fn remove_staging(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to delete staging file: {e}");
        }
    }
}
