//! Client connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use skiff_protocol::constants::{
    MessageType, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};
use skiff_protocol::envelope::Message;
use skiff_protocol::messages::FileData;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::SEND_BUFFER_SIZE;
use crate::handler::Handler;

/// Identity of a connected client.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    /// Connection id, assigned at accept time. Keys all per-connection
    /// state for the lifetime of the socket.
    pub id: Uuid,
    pub remote_addr: String,
}

/// Handle for sending messages to one client.
///
/// Cloneable and cheap, wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` if the buffer is full or the client disconnected.
    pub fn send_msg(&self, msg: &Message) -> Result<(), SendError> {
        let json = serde_json::to_string(msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!("send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Sends an error response for the given request message.
    pub fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), SendError> {
        self.send_msg(&req.reply_error(code, message))
    }

    /// Sends a raw binary frame, waiting for buffer space.
    ///
    /// Download streaming can outrun the socket by orders of magnitude;
    /// awaiting here ties chunk production to what the client drains.
    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), SendError> {
        self.tx
            .send(WsMessage::Binary(data.into()))
            .await
            .map_err(|_| SendError)
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Runs the read and write pumps for one accepted WebSocket connection.
///
/// The pumps run as background tokio tasks and stop when the client
/// disconnects or the cancel token is triggered. `on_disconnect` fires
/// exactly once, after the read pump exits.
pub(crate) fn spawn_connection<S, H>(
    ws_stream: S,
    meta: ClientMeta,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> (Sender, CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = Sender { tx };

    let (ws_sink, ws_stream) = ws_stream.split();

    // Write pump.
    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    // Read pump.
    let read_cancel = cancel.clone();
    let read_sender = sender.clone();
    let read_meta = meta.clone();
    tokio::spawn(async move {
        read_pump(ws_stream, read_meta.clone(), read_sender, handler.clone(), read_cancel.clone()).await;
        // When the read pump exits, cancel the write pump too.
        read_cancel.cancel();
        handler.on_disconnect(read_meta.clone()).await;
        tracing::info!(client = %read_meta.id, addr = %read_meta.remote_addr, "client disconnected");
    });

    (sender, cancel)
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and dispatches to the handler.
async fn read_pump<S, H>(
    mut stream: S,
    meta: ClientMeta,
    sender: Sender,
    handler: Arc<H>,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let mut pong_deadline = tokio::time::interval(WS_PONG_WAIT);
    pong_deadline.reset();
    let mut got_pong = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = pong_deadline.tick() => {
                if !got_pong {
                    tracing::warn!(client = %meta.id, "pong timeout, closing connection");
                    break;
                }
                got_pong = false;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        match ws_msg {
                            WsMessage::Text(text) => {
                                if text.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!("message exceeds max size ({} > {})", text.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                dispatch_text(&handler, &meta, &sender, &text).await;
                            }
                            WsMessage::Binary(data) => {
                                if data.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!("binary message exceeds max size ({} > {})", data.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                handler.on_file_data(meta.clone(), sender.clone(), data.to_vec()).await;
                            }
                            WsMessage::Pong(_) => {
                                got_pong = true;
                                pong_deadline.reset();
                            }
                            WsMessage::Ping(data) => {
                                // Auto-respond to client pings.
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Close(_) => {
                                tracing::info!(client = %meta.id, "received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {} // Raw frames ignored.
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(client = %meta.id, "read pump error: {e}");
                        break;
                    }
                    None => break, // Stream ended.
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the appropriate handler method.
async fn dispatch_text<H: Handler>(
    handler: &Arc<H>,
    meta: &ClientMeta,
    sender: &Sender,
    text: &str,
) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(client = %meta.id, "invalid message JSON: {e}");
            return;
        }
    };

    let c = meta.clone();
    let s = sender.clone();
    match msg.msg_type {
        MessageType::Authenticate => handler.on_authenticate(c, s, msg).await,
        MessageType::ListFiles => handler.on_list_files(c, s, msg).await,
        MessageType::ViewFile => handler.on_view_file(c, s, msg).await,
        MessageType::UploadFile => handler.on_upload_file(c, s, msg).await,
        MessageType::FileData => {
            // Base64 envelope form of a chunk, used by clients that cannot
            // send binary frames. Decoded here so the handler sees bytes
            // either way.
            match msg.parse_payload::<FileData>() {
                Ok(Some(chunk)) => handler.on_file_data(c, s, chunk.data).await,
                Ok(None) => {
                    tracing::warn!(client = %meta.id, "file_data without payload");
                }
                Err(e) => {
                    tracing::error!(client = %meta.id, "invalid file_data payload: {e}");
                }
            }
        }
        MessageType::DownloadFile => handler.on_download_file(c, s, msg).await,
        MessageType::DeleteFile => handler.on_delete_file(c, s, msg).await,
        _ => {
            tracing::warn!(client = %meta.id, msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender.send_error(&msg, skiff_protocol::constants::ERR_CODE_NOT_IMPLEMENTED, "unknown message type");
        }
    }
}
