//! Upload state machine: announcement, chunk accumulation, backend commit.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skiff_backend::{StorageBridge, WriteOutcome};
use skiff_protocol::validate_name;
use uuid::Uuid;

use crate::session::{SessionRegistry, TransferSession, UploadPhase};
use crate::{TransferError, remove_staging};

/// Result of an upload commit, surfaced to the client as a coarse status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    AlreadyExists,
    Failed,
}

/// What became of one received chunk.
#[derive(Debug)]
pub enum ChunkDisposition {
    /// Chunk accepted; the upload is still in progress.
    Accepted { received: u64, expected: u64 },
    /// The chunk completed the upload and the backend commit has run.
    Completed(CommitOutcome),
}

/// Drives every upload from announcement through chunk accumulation to the
/// backend commit and unconditional cleanup.
pub struct UploadCoordinator {
    registry: SessionRegistry,
    bridge: Arc<StorageBridge>,
    staging_dir: PathBuf,
}

impl UploadCoordinator {
    pub fn new(bridge: Arc<StorageBridge>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            bridge,
            staging_dir: staging_dir.into(),
        }
    }

    /// Number of uploads currently in progress.
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Opens a session for an announced upload.
    ///
    /// A second announcement on a connection with an active session replaces
    /// it: the old session is dropped and its staging file deleted. A
    /// zero-size announcement has nothing to receive and commits the empty
    /// file immediately; the returned outcome is `Some` in that case.
    pub async fn announce(
        &self,
        conn: Uuid,
        owner: &str,
        filename: &str,
        declared_size: u64,
    ) -> Result<Option<CommitOutcome>, TransferError> {
        validate_name("username", owner)?;
        validate_name("filename", filename)?;

        if let Some(old) = self.registry.remove(conn) {
            tracing::warn!(%conn, replaced = %old.filename, "replacing in-progress upload");
            remove_staging(&old.staging_path);
        }

        std::fs::create_dir_all(&self.staging_dir)?;
        let staging_path = self.staging_dir.join(format!("{conn}_u_{filename}"));
        std::fs::File::create(&staging_path)?;

        let session = TransferSession::new(owner, filename, staging_path, declared_size);
        tracing::info!(%conn, owner, filename, declared_size, "upload announced");

        if declared_size == 0 {
            return Ok(Some(self.commit(session).await));
        }

        self.registry.insert(conn, session);
        Ok(None)
    }

    /// Applies one received chunk to the connection's open session.
    ///
    /// Chunks for a connection with no session (including late chunks for
    /// an upload that already committed) yield `SessionNotFound`; callers
    /// log and drop those. When the declared size is reached the session is
    /// removed from the registry *before* the commit runs, which makes the
    /// backend write exactly-once.
    pub async fn append(&self, conn: Uuid, data: &[u8]) -> Result<ChunkDisposition, TransferError> {
        let staging_path = self
            .registry
            .with_session(conn, |s| s.staging_path.clone())
            .ok_or(TransferError::SessionNotFound(conn))?;

        // Single-writer per connection: file I/O happens outside the
        // registry lock.
        append_bytes(&staging_path, data)?;

        let (complete, received, expected) = self
            .registry
            .with_session(conn, |s| {
                let complete = s.record(data.len() as u64);
                if complete {
                    s.phase = UploadPhase::Committing;
                }
                (complete, s.bytes_received, s.declared_size)
            })
            .ok_or(TransferError::SessionNotFound(conn))?;

        if !complete {
            tracing::debug!(%conn, received, expected, "chunk received");
            return Ok(ChunkDisposition::Accepted { received, expected });
        }

        if received > expected {
            // Over-delivered bytes stay in the staged file; they are not
            // truncated.
            tracing::warn!(%conn, received, expected, "upload exceeded its declared size");
        }

        let session = self
            .registry
            .remove(conn)
            .ok_or(TransferError::SessionNotFound(conn))?;
        Ok(ChunkDisposition::Completed(self.commit(session).await))
    }

    /// Disconnect hook: drops any orphaned session and its staging file.
    pub fn discard(&self, conn: Uuid) {
        if let Some(session) = self.registry.remove(conn) {
            tracing::info!(
                %conn,
                filename = %session.filename,
                received = session.bytes_received,
                "discarding orphaned upload session"
            );
            remove_staging(&session.staging_path);
        }
    }

    /// Commits a staged file to the backend. Cleanup is unconditional: the
    /// staging file is deleted whatever the backend said, and the session is
    /// already gone from the registry.
    async fn commit(&self, session: TransferSession) -> CommitOutcome {
        let outcome = self
            .bridge
            .write_file(&session.staging_path, &session.owner, &session.filename)
            .await;
        remove_staging(&session.staging_path);

        match outcome {
            WriteOutcome::Success => {
                tracing::info!(
                    owner = %session.owner,
                    filename = %session.filename,
                    bytes = session.bytes_received,
                    "upload committed"
                );
                CommitOutcome::Committed
            }
            WriteOutcome::AlreadyExists => {
                tracing::info!(
                    owner = %session.owner,
                    filename = %session.filename,
                    "upload destination already exists"
                );
                CommitOutcome::AlreadyExists
            }
            WriteOutcome::Failure(detail) => {
                tracing::error!(
                    owner = %session.owner,
                    filename = %session.filename,
                    %detail,
                    "backend commit failed"
                );
                CommitOutcome::Failed
            }
        }
    }
}

fn append_bytes(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(data)
}
