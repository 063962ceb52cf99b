//! Download streaming: backend fetch, size announcement, ordered chunks.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skiff_backend::StorageBridge;
use skiff_protocol::validate_name;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{TransferError, remove_staging};

/// One event in a download stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Byte length of the file about to be streamed. `Size(0)` with no
    /// following chunks is the sole failure signal for downloads.
    Size(u64),
    /// The next window of file bytes, in file order.
    Chunk(Vec<u8>),
}

/// Reads a local file in fixed-size windows.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
}

impl ChunkReader {
    pub fn open(path: &Path, chunk_size: usize) -> std::io::Result<Self> {
        Ok(Self {
            file: std::fs::File::open(path)?,
            chunk_size,
        })
    }

    /// Returns the next full window (short only at EOF), or `None` once the
    /// file is exhausted.
    pub fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

/// Fetches backend files to a staging path and emits them as an ordered,
/// finite event sequence.
pub struct DownloadStreamer {
    bridge: Arc<StorageBridge>,
    staging_dir: PathBuf,
    chunk_size: usize,
}

impl DownloadStreamer {
    pub fn new(bridge: Arc<StorageBridge>, staging_dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            bridge,
            staging_dir: staging_dir.into(),
            chunk_size,
        }
    }

    /// Streams `owner/filename` to `events`.
    ///
    /// Emits `Size(N)` followed by `ceil(N / chunk_size)` chunks whose
    /// concatenation is the file. If the backend fetch produced no local
    /// file, or the names are unusable, a single `Size(0)` is emitted.
    /// The staged copy is deleted before returning; every request
    /// re-fetches from the backend.
    pub async fn fetch(
        &self,
        conn: Uuid,
        owner: &str,
        filename: &str,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<(), TransferError> {
        if let Err(e) = validate_name("username", owner)
            .and_then(|()| validate_name("filename", filename))
        {
            tracing::warn!(%conn, "rejecting download request: {e}");
            return self.send_empty(&events).await;
        }

        std::fs::create_dir_all(&self.staging_dir)?;
        let staging_path = self.staging_dir.join(format!("{conn}_d_{filename}"));

        let fetched = self.bridge.read_file(owner, filename, &staging_path).await;
        if !fetched {
            tracing::warn!(%conn, owner, filename, "file not present after backend fetch");
            return self.send_empty(&events).await;
        }

        let result = self.stream_local(&staging_path, &events).await;
        remove_staging(&staging_path);
        result
    }

    async fn stream_local(
        &self,
        path: &Path,
        events: &mpsc::Sender<DownloadEvent>,
    ) -> Result<(), TransferError> {
        let size = std::fs::metadata(path)?.len();
        events
            .send(DownloadEvent::Size(size))
            .await
            .map_err(|_| TransferError::Disconnected)?;

        let mut reader = ChunkReader::open(path, self.chunk_size)?;
        let mut sent: u64 = 0;
        while let Some(chunk) = reader.next_chunk()? {
            sent += chunk.len() as u64;
            events
                .send(DownloadEvent::Chunk(chunk))
                .await
                .map_err(|_| TransferError::Disconnected)?;
        }
        tracing::info!(path = %path.display(), bytes = sent, "download streamed");
        Ok(())
    }

    async fn send_empty(&self, events: &mpsc::Sender<DownloadEvent>) -> Result<(), TransferError> {
        events
            .send(DownloadEvent::Size(0))
            .await
            .map_err(|_| TransferError::Disconnected)
    }
}
