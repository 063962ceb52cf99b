//! Upload session state and the per-connection session registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use uuid::Uuid;

/// Phase of an in-progress upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Accepting chunk data.
    Receiving,
    /// Declared size reached; the backend commit is in flight. No further
    /// chunks may be applied.
    Committing,
}

/// Per-connection state for one inbound file transfer.
#[derive(Debug)]
pub struct TransferSession {
    pub owner: String,
    pub filename: String,
    /// Local staging file accumulating the received bytes. Derived from
    /// connection id, direction and filename, so concurrent sessions never
    /// collide.
    pub staging_path: PathBuf,
    /// Size announced by the client. Trusted, compared against
    /// `bytes_received` only.
    pub declared_size: u64,
    pub bytes_received: u64,
    pub phase: UploadPhase,
}

impl TransferSession {
    pub fn new(
        owner: impl Into<String>,
        filename: impl Into<String>,
        staging_path: PathBuf,
        declared_size: u64,
    ) -> Self {
        Self {
            owner: owner.into(),
            filename: filename.into(),
            staging_path,
            declared_size,
            bytes_received: 0,
            phase: UploadPhase::Receiving,
        }
    }

    /// Records `len` received bytes; returns `true` once the declared size
    /// is reached or exceeded.
    pub fn record(&mut self, len: u64) -> bool {
        self.bytes_received += len;
        self.bytes_received >= self.declared_size
    }
}

/// Registry of active upload sessions, keyed by connection id.
///
/// A session exists iff an upload is in progress for that connection, and
/// each connection has at most one. The mutex guards only map
/// insert/remove/lookup; byte accumulation for a given connection happens on
/// that connection's read task alone.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<Uuid, TransferSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session, returning the replaced one if the connection
    /// already had an upload in progress.
    pub fn insert(&self, conn: Uuid, session: TransferSession) -> Option<TransferSession> {
        self.inner.lock().unwrap().insert(conn, session)
    }

    /// Removes and returns the session for `conn`, if any.
    pub fn remove(&self, conn: Uuid) -> Option<TransferSession> {
        self.inner.lock().unwrap().remove(&conn)
    }

    /// Runs `f` against the session for `conn` under the lock.
    pub fn with_session<T>(
        &self,
        conn: Uuid,
        f: impl FnOnce(&mut TransferSession) -> T,
    ) -> Option<T> {
        self.inner.lock().unwrap().get_mut(&conn).map(f)
    }

    pub fn contains(&self, conn: Uuid) -> bool {
        self.inner.lock().unwrap().contains_key(&conn)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
