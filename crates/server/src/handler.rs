//! Handler trait for processing client messages.
//!
//! Implementors provide domain logic (auth, file operations, transfers)
//! while the server framework handles connection management and routing.

use std::future::Future;
use std::pin::Pin;

use skiff_protocol::constants::ERR_CODE_NOT_IMPLEMENTED;
use skiff_protocol::envelope::Message;

use crate::connection::{ClientMeta, Sender};

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling messages from a connected client.
///
/// The server dispatches parsed messages to the appropriate method. Each
/// method receives:
/// - `client`: identity of the connection the message arrived on
/// - `sender`: channel to send responses/events back to that client
///
/// Default implementations reply with "not implemented" so handlers only
/// need to override the message types they care about.
pub trait Handler: Send + Sync + 'static {
    /// Called for `authenticate`.
    fn on_authenticate(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `list_files`.
    fn on_list_files(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `view_file`.
    fn on_view_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `upload_file` (the transfer announcement).
    fn on_upload_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for each chunk of upload data. Binary WebSocket frames land
    /// here directly; `file_data` JSON envelopes are decoded first.
    fn on_file_data(&self, client: ClientMeta, sender: Sender, data: Vec<u8>) -> HandlerFuture<'_> {
        let _ = (sender, data);
        Box::pin(async move {
            tracing::warn!(client = %client.id, "dropping file data: no chunk handler");
        })
    }

    /// Called for `download_file`.
    fn on_download_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `delete_file`.
    fn on_delete_file(&self, client: ClientMeta, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called once when the client's connection ends, however it ends.
    /// Handlers discard per-connection state (auth, transfer sessions) here.
    fn on_disconnect(&self, client: ClientMeta) -> HandlerFuture<'_> {
        let _ = client;
        Box::pin(async {})
    }
}
