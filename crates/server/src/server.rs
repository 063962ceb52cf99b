//! Relay WebSocket server.
//!
//! Listens on a TCP port and accepts any number of client connections,
//! each with its own connection id and read/write pumps.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ServerError;
use crate::connection::{self, ClientMeta, Sender};
use crate::handler::Handler;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 0 }
    }
}

/// The relay WebSocket server.
///
/// Accepts client connections and dispatches their messages to the
/// provided [`Handler`]. Connections are independent; one client's
/// transfer never blocks another's.
pub struct RelayServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    clients: Mutex<HashMap<Uuid, Sender>>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: Handler> RelayServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            clients: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of currently connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Gracefully shuts down the server and all client connections.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("relay server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Handles a single TCP connection: upgrades to WS and starts the pumps.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let ws_stream = accept_async(stream).await?;

        let meta = ClientMeta {
            id: Uuid::new_v4(),
            remote_addr: peer_addr.to_string(),
        };
        tracing::info!(client = %meta.id, %peer_addr, "WebSocket connection established");

        let (sender, conn_cancel) = connection::spawn_connection(
            ws_stream,
            meta.clone(),
            Arc::clone(&self.handler),
            self.cancel.clone(),
        );

        self.clients.lock().await.insert(meta.id, sender);

        // Drop the registry entry once the pumps stop.
        let server = Arc::clone(self);
        tokio::spawn(async move {
            conn_cancel.cancelled().await;
            server.clients.lock().await.remove(&meta.id);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFuture;
    use skiff_protocol::envelope::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal test handler counting auth requests and chunk bytes.
    struct TestHandler {
        auth_calls: AtomicUsize,
        chunk_bytes: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl TestHandler {
        fn new() -> Self {
            Self {
                auth_calls: AtomicUsize::new(0),
                chunk_bytes: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }
        }
    }

    impl Handler for TestHandler {
        fn on_authenticate(
            &self,
            _client: ClientMeta,
            _sender: Sender,
            _msg: Message,
        ) -> HandlerFuture<'_> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }

        fn on_file_data(
            &self,
            _client: ClientMeta,
            _sender: Sender,
            data: Vec<u8>,
        ) -> HandlerFuture<'_> {
            self.chunk_bytes.fetch_add(data.len(), Ordering::SeqCst);
            Box::pin(async {})
        }

        fn on_disconnect(&self, _client: ClientMeta) -> HandlerFuture<'_> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    async fn start_server() -> (Arc<RelayServer<TestHandler>>, tokio::task::JoinHandle<()>, String) {
        let server = RelayServer::new(ServerConfig { port: 0 }, TestHandler::new());
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            server2.run().await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let url = format!("ws://127.0.0.1:{}", server.port().await);
        (server, handle, url)
    }

    #[tokio::test]
    async fn server_binds_dynamic_port() {
        let (server, handle, _url) = start_server().await;
        assert!(server.port().await > 0, "should have bound to a dynamic port");
        assert_eq!(server.client_count().await, 0);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn server_accepts_multiple_clients() {
        let (server, handle, url) = start_server().await;

        let (ws1, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (ws2, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.client_count().await, 2);

        drop(ws1);
        drop(ws2);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(server.client_count().await, 0);
        assert_eq!(server.handler.disconnects.load(Ordering::SeqCst), 2);

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn server_dispatches_text_message() {
        use futures_util::SinkExt;

        let (server, handle, url) = start_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let msg = serde_json::json!({
            "id": "test-1",
            "type": "authenticate",
            "payload": {
                "username": "alice",
                "password": "secret"
            }
        });
        ws.send(tokio_tungstenite::tungstenite::Message::Text(
            msg.to_string().into(),
        ))
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(server.handler.auth_calls.load(Ordering::SeqCst), 1);

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn server_routes_binary_frames_to_chunk_handler() {
        use futures_util::SinkExt;

        let (server, handle, url) = start_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        ws.send(tokio_tungstenite::tungstenite::Message::Binary(
            vec![1u8; 300].into(),
        ))
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(server.handler.chunk_bytes.load(Ordering::SeqCst), 300);

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn file_data_envelope_reaches_chunk_handler() {
        use futures_util::SinkExt;

        let (server, handle, url) = start_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Base64 of "hello" is aGVsbG8=.
        let msg = serde_json::json!({
            "id": "chunk-1",
            "type": "file_data",
            "payload": { "data": "aGVsbG8=" }
        });
        ws.send(tokio_tungstenite::tungstenite::Message::Text(
            msg.to_string().into(),
        ))
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(server.handler.chunk_bytes.load(Ordering::SeqCst), 5);

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }
}
