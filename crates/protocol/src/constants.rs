use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often the server pings each client.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Read deadline: if *nothing* arrives from a client within this window
/// (no pong, no request, no chunk) the connection is considered dead.
/// Set high enough to tolerate clients that pause between chunks.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Maximum WebSocket message size in bytes (8 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Fixed window size for file chunk streaming, in bytes.
pub const CHUNK_SIZE: usize = 1024;

/// WebSocket message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Requests from client to server
    #[serde(rename = "authenticate")]
    Authenticate,
    #[serde(rename = "list_files")]
    ListFiles,
    #[serde(rename = "view_file")]
    ViewFile,
    #[serde(rename = "upload_file")]
    UploadFile,
    #[serde(rename = "file_data")]
    FileData,
    #[serde(rename = "download_file")]
    DownloadFile,
    #[serde(rename = "delete_file")]
    DeleteFile,

    // Responses and events from server to client
    #[serde(rename = "auth_response")]
    AuthResponse,
    #[serde(rename = "file_list")]
    FileList,
    #[serde(rename = "file_view")]
    FileView,
    #[serde(rename = "ack_upload")]
    AckUpload,
    #[serde(rename = "file_upload")]
    FileUpload,
    #[serde(rename = "file_download_size")]
    FileDownloadSize,
    #[serde(rename = "file_delete")]
    FileDelete,
    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common error codes carried in the envelope `error` field.
pub const ERR_CODE_BAD_REQUEST: i32 = 400;
pub const ERR_CODE_UNAUTHORIZED: i32 = 401;
pub const ERR_CODE_NOT_IMPLEMENTED: i32 = 501;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::AckUpload).unwrap();
        assert_eq!(json, "\"ack_upload\"");
        let parsed: MessageType = serde_json::from_str("\"file_download_size\"").unwrap();
        assert_eq!(parsed, MessageType::FileDownloadSize);
    }

    #[test]
    fn unknown_message_type_is_forward_compatible() {
        let parsed: MessageType = serde_json::from_str("\"quota_report\"").unwrap();
        assert_eq!(parsed, MessageType::Unknown);
    }
}
