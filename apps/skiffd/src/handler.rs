//! Relay message handler: authentication gate plus the file operations.
//!
//! Every request except `authenticate` is checked against the connection's
//! authenticated identity, and the `username` a payload names must match
//! that identity. Transfer and backend work is delegated to the dedicated
//! crates; this module only translates between wire payloads and their
//! results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use skiff_auth::CredentialFile;
use skiff_backend::{RemoveOutcome, StorageBridge};
use skiff_protocol::MessageType;
use skiff_protocol::constants::{ERR_CODE_BAD_REQUEST, ERR_CODE_UNAUTHORIZED};
use skiff_protocol::envelope::Message;
use skiff_protocol::messages::{
    AckUpload, AuthResponse, AuthStatus, AuthenticateRequest, DeleteFileRequest, DeleteStatus,
    DownloadFileRequest, FileDelete, FileDownloadSize, FileList, FileUpload, FileView,
    ListFilesRequest, TransferStatus, UploadFileRequest, ViewFileRequest, ViewStatus,
};
use skiff_server::{ClientMeta, Handler, HandlerFuture, Sender};
use skiff_transfer::{ChunkDisposition, CommitOutcome, DownloadEvent, DownloadStreamer, UploadCoordinator};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Channel depth between the download fetch task and the socket forwarder.
const DOWNLOAD_EVENT_BUFFER: usize = 64;

pub struct RelayHandler {
    credentials: CredentialFile,
    bridge: Arc<StorageBridge>,
    uploads: UploadCoordinator,
    downloads: DownloadStreamer,
    preview_max_bytes: usize,
    /// Authenticated username per connection.
    authed: Mutex<HashMap<Uuid, String>>,
}

impl RelayHandler {
    pub fn new(
        credentials: CredentialFile,
        bridge: Arc<StorageBridge>,
        uploads: UploadCoordinator,
        downloads: DownloadStreamer,
        preview_max_bytes: usize,
    ) -> Self {
        Self {
            credentials,
            bridge,
            uploads,
            downloads,
            preview_max_bytes,
            authed: Mutex::new(HashMap::new()),
        }
    }

    /// Checks that the connection authenticated as `username`.
    ///
    /// On failure an envelope error is sent and the request must be dropped.
    fn authorize(&self, client: &ClientMeta, sender: &Sender, msg: &Message, username: &str) -> bool {
        let authed = self.authed.lock().unwrap();
        match authed.get(&client.id) {
            Some(identity) if identity == username => true,
            Some(identity) => {
                tracing::warn!(
                    client = %client.id,
                    identity,
                    requested = username,
                    "request names another user's storage"
                );
                let _ = sender.send_error(msg, ERR_CODE_UNAUTHORIZED, "username does not match session");
                false
            }
            None => {
                tracing::warn!(client = %client.id, "request on unauthenticated connection");
                let _ = sender.send_error(msg, ERR_CODE_UNAUTHORIZED, "not authenticated");
                false
            }
        }
    }
}

/// Extracts the typed payload, or sends a 400 error and returns `None`.
fn parse_request<T: DeserializeOwned>(sender: &Sender, msg: &Message) -> Option<T> {
    match msg.parse_payload::<T>() {
        Ok(Some(req)) => Some(req),
        Ok(None) => {
            let _ = sender.send_error(msg, ERR_CODE_BAD_REQUEST, "missing payload");
            None
        }
        Err(e) => {
            tracing::warn!("malformed payload: {e}");
            let _ = sender.send_error(msg, ERR_CODE_BAD_REQUEST, "malformed payload");
            None
        }
    }
}

fn transfer_status(outcome: CommitOutcome) -> TransferStatus {
    match outcome {
        CommitOutcome::Committed => TransferStatus::Success,
        CommitOutcome::AlreadyExists => TransferStatus::Exists,
        CommitOutcome::Failed => TransferStatus::Fail,
    }
}

impl Handler for RelayHandler {
    fn on_authenticate(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse_request::<AuthenticateRequest>(&sender, &msg) else {
                return;
            };

            let response = if self.credentials.authenticate(&req.username, &req.password) {
                self.authed
                    .lock()
                    .unwrap()
                    .insert(client.id, req.username.clone());
                tracing::info!(client = %client.id, username = %req.username, "authenticated");
                AuthResponse {
                    status: AuthStatus::Success,
                    username: Some(req.username),
                }
            } else {
                tracing::warn!(client = %client.id, username = %req.username, "authentication failed");
                AuthResponse {
                    status: AuthStatus::Fail,
                    username: None,
                }
            };

            if let Ok(reply) = msg.reply(MessageType::AuthResponse, Some(&response)) {
                let _ = sender.send_msg(&reply);
            }
        })
    }

    fn on_list_files(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse_request::<ListFilesRequest>(&sender, &msg) else {
                return;
            };
            if !self.authorize(&client, &sender, &msg, &req.username) {
                return;
            }

            let files = self.bridge.list_files(&req.username).await;
            if let Ok(reply) = msg.reply(MessageType::FileList, Some(&FileList { files })) {
                let _ = sender.send_msg(&reply);
            }
        })
    }

    fn on_view_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse_request::<ViewFileRequest>(&sender, &msg) else {
                return;
            };
            if !self.authorize(&client, &sender, &msg, &req.username) {
                return;
            }

            let view = match self
                .bridge
                .preview_file(&req.username, &req.filename, self.preview_max_bytes)
                .await
            {
                Err(detail) => {
                    tracing::error!(client = %client.id, %detail, "view command failed to run");
                    FileView::error(ViewStatus::ErrorView, "Failed to execute command")
                }
                Ok(data) if data.is_empty() => {
                    FileView::error(ViewStatus::Error, "unable to view the file or file is empty")
                }
                Ok(data) => FileView::success(data),
            };

            if let Ok(reply) = msg.reply(MessageType::FileView, Some(&view)) {
                let _ = sender.send_msg(&reply);
            }
        })
    }

    fn on_upload_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse_request::<UploadFileRequest>(&sender, &msg) else {
                return;
            };
            if !self.authorize(&client, &sender, &msg, &req.username) {
                return;
            }

            match self
                .uploads
                .announce(client.id, &req.username, &req.filename, req.size)
                .await
            {
                Ok(outcome) => {
                    if let Ok(ack) = msg.reply(MessageType::AckUpload, Some(&AckUpload::ack())) {
                        let _ = sender.send_msg(&ack);
                    }
                    // Zero-size uploads have no chunks to wait for; the
                    // commit already ran.
                    if let Some(outcome) = outcome {
                        let status = FileUpload {
                            status: transfer_status(outcome),
                        };
                        if let Ok(reply) = msg.reply(MessageType::FileUpload, Some(&status)) {
                            let _ = sender.send_msg(&reply);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(client = %client.id, "rejecting upload: {e}");
                    let _ = sender.send_error(&msg, ERR_CODE_BAD_REQUEST, &e.to_string());
                }
            }
        })
    }

    fn on_file_data(&self, client: ClientMeta, sender: Sender, data: Vec<u8>) -> HandlerFuture<'_> {
        Box::pin(async move {
            match self.uploads.append(client.id, &data).await {
                Ok(ChunkDisposition::Accepted { .. }) => {}
                Ok(ChunkDisposition::Completed(outcome)) => {
                    let status = FileUpload {
                        status: transfer_status(outcome),
                    };
                    match Message::new(
                        Uuid::new_v4().to_string(),
                        MessageType::FileUpload,
                        Some(&status),
                    ) {
                        Ok(reply) => {
                            let _ = sender.send_msg(&reply);
                        }
                        Err(e) => tracing::error!("failed to build file_upload message: {e}"),
                    }
                }
                Err(skiff_transfer::TransferError::SessionNotFound(_)) => {
                    // Chunk with no announced upload, or a stray chunk after
                    // commit. Drop it.
                    tracing::warn!(client = %client.id, len = data.len(), "dropping unexpected chunk");
                }
                Err(e) => {
                    tracing::error!(client = %client.id, "upload failed: {e}");
                    self.uploads.discard(client.id);
                    let status = FileUpload {
                        status: TransferStatus::Fail,
                    };
                    if let Ok(reply) = Message::new(
                        Uuid::new_v4().to_string(),
                        MessageType::FileUpload,
                        Some(&status),
                    ) {
                        let _ = sender.send_msg(&reply);
                    }
                }
            }
        })
    }

    fn on_download_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse_request::<DownloadFileRequest>(&sender, &msg) else {
                return;
            };
            if !self.authorize(&client, &sender, &msg, &req.username) {
                return;
            }

            let (tx, mut rx) = mpsc::channel::<DownloadEvent>(DOWNLOAD_EVENT_BUFFER);
            let fetch = self
                .downloads
                .fetch(client.id, &req.username, &req.filename, tx);

            // Forward events to the socket while the fetch produces them.
            // The loop ends when the fetch drops its sender; dropping `rx`
            // on a send failure makes the fetch bail out in turn.
            let forward = async {
                while let Some(event) = rx.recv().await {
                    match event {
                        DownloadEvent::Size(size) => {
                            let Ok(reply) =
                                msg.reply(MessageType::FileDownloadSize, Some(&FileDownloadSize { size }))
                            else {
                                break;
                            };
                            if sender.send_msg(&reply).is_err() {
                                break;
                            }
                        }
                        DownloadEvent::Chunk(data) => {
                            if sender.send_binary(data).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            };

            let (fetched, ()) = tokio::join!(fetch, forward);
            if let Err(e) = fetched {
                tracing::warn!(client = %client.id, filename = %req.filename, "download aborted: {e}");
            }
        })
    }

    fn on_delete_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Some(req) = parse_request::<DeleteFileRequest>(&sender, &msg) else {
                return;
            };
            if !self.authorize(&client, &sender, &msg, &req.username) {
                return;
            }

            let status = match self.bridge.remove_file(&req.username, &req.filename).await {
                RemoveOutcome::Success => DeleteStatus::Success,
                RemoveOutcome::Failure(detail) => {
                    tracing::warn!(client = %client.id, filename = %req.filename, %detail, "delete failed");
                    DeleteStatus::Fail
                }
            };

            if let Ok(reply) = msg.reply(MessageType::FileDelete, Some(&FileDelete { status })) {
                let _ = sender.send_msg(&reply);
            }
        })
    }

    fn on_disconnect(&self, client: ClientMeta) -> HandlerFuture<'_> {
        Box::pin(async move {
            self.uploads.discard(client.id);
            if let Some(username) = self.authed.lock().unwrap().remove(&client.id) {
                tracing::info!(client = %client.id, username, "session ended");
            }
        })
    }
}
