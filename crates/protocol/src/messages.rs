//! Payload structs for every protocol event.
//!
//! Field names and status strings match the wire protocol exactly, so the
//! serde derives carry the whole compatibility burden.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests (client -> server)
// ---------------------------------------------------------------------------

/// `authenticate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
}

/// `list_files` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListFilesRequest {
    pub username: String,
}

/// `view_file` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFileRequest {
    pub username: String,
    pub filename: String,
}

/// `upload_file` intent: announces a transfer of `size` bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFileRequest {
    pub username: String,
    pub filename: String,
    pub size: u64,
}

/// `download_file` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadFileRequest {
    pub username: String,
    pub filename: String,
}

/// `delete_file` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub username: String,
    pub filename: String,
}

/// JSON form of a `file_data` chunk.
///
/// Chunks normally travel as raw binary frames; this base64 payload is the
/// fallback for clients that can only emit JSON, and the form the server
/// itself never needs to parse for downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Responses and events (server -> client)
// ---------------------------------------------------------------------------

/// Authentication outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
}

/// `auth_response` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub status: AuthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// `file_list` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<String>,
}

/// Outcome of a `view_file` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    /// The file is empty or could not be read.
    #[serde(rename = "Error")]
    Error,
    /// The view command itself could not be executed.
    #[serde(rename = "ErrorView")]
    ErrorView,
}

/// `file_view` payload: a truncated text preview or an error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileView {
    pub status: ViewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileView {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            status: ViewStatus::Success,
            data: Some(data.into()),
            message: None,
        }
    }

    pub fn error(status: ViewStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// `ack_upload` status (the only value is `ACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "ACK")]
    Ack,
}

/// `ack_upload` payload: the server is ready to receive chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckUpload {
    pub status: AckStatus,
}

impl AckUpload {
    pub fn ack() -> Self {
        Self {
            status: AckStatus::Ack,
        }
    }
}

/// Final status of an upload commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    /// The destination already exists in the backend; not a true error.
    #[serde(rename = "EXISTS")]
    Exists,
    #[serde(rename = "FAIL")]
    Fail,
}

/// `file_upload` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
    pub status: TransferStatus,
}

/// `file_download_size` payload. A size of `0` is the sole failure signal
/// for downloads: no chunks follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDownloadSize {
    pub size: u64,
}

/// Outcome of a `delete_file` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
}

/// `file_delete` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDelete {
    pub status: DeleteStatus,
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
