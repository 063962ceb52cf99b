//! End-to-end relay tests: a real WebSocket client against the full stack,
//! with the storage backend emulated by a scripted command runner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use skiff_auth::CredentialFile;
use skiff_backend::{BackendConfig, CommandOutput, CommandRunner, RunFuture, StorageBridge};
use skiff_protocol::constants::CHUNK_SIZE;
use skiff_server::{RelayServer, ServerConfig};
use skiff_transfer::{DownloadStreamer, UploadCoordinator};
use skiffd::handler::RelayHandler;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;
type FileMap = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Emulates the storage CLI over an in-memory map keyed by logical path.
///
/// `-put` refuses to overwrite (exit 1), matching the real tool.
struct FakeHdfs {
    files: FileMap,
}

impl CommandRunner for FakeHdfs {
    fn run(&self, command: String) -> RunFuture<'_> {
        let parts: Vec<String> = command.split_whitespace().map(str::to_owned).collect();
        let mut files = self.files.lock().unwrap();
        let (exit_code, stdout, stderr) = match parts[2].as_str() {
            "-put" => {
                let data = std::fs::read(&parts[3]).unwrap();
                if files.contains_key(&parts[4]) {
                    (Some(1), String::new(), format!("put: `{}': File exists", parts[4]))
                } else {
                    files.insert(parts[4].clone(), data);
                    (Some(0), String::new(), String::new())
                }
            }
            "-get" => match files.get(&parts[3]) {
                Some(data) => {
                    std::fs::write(&parts[4], data).unwrap();
                    (Some(0), String::new(), String::new())
                }
                None => (
                    Some(1),
                    String::new(),
                    format!("get: `{}': No such file or directory", parts[3]),
                ),
            },
            "-rm" => match files.remove(&parts[3]) {
                Some(_) => (Some(0), String::new(), String::new()),
                None => (
                    Some(1),
                    String::new(),
                    format!("rm: `{}': No such file or directory", parts[3]),
                ),
            },
            "-cat" => {
                // Full command is "... -cat <path> | head -c <n>".
                let max: usize = parts[7].parse().unwrap();
                match files.get(&parts[3]) {
                    Some(data) => {
                        let end = max.min(data.len());
                        (
                            Some(0),
                            String::from_utf8_lossy(&data[..end]).into_owned(),
                            String::new(),
                        )
                    }
                    None => (Some(1), String::new(), "cat: no such file".into()),
                }
            }
            "-ls" => {
                // The shell pipeline reduces the listing to basenames.
                let dir = parts[3].clone();
                let mut names: Vec<String> = files
                    .keys()
                    .filter(|k| k.starts_with(&dir))
                    .map(|k| k[dir.len()..].to_string())
                    .collect();
                names.sort();
                (Some(0), names.join("\n"), String::new())
            }
            op => panic!("unexpected backend op {op}: {command}"),
        };
        Box::pin(async move {
            Ok(CommandOutput {
                exit_code,
                stdout,
                stderr,
            })
        })
    }
}

struct TestRelay {
    server: Arc<RelayServer<RelayHandler>>,
    handle: tokio::task::JoinHandle<()>,
    url: String,
    files: FileMap,
    _staging: tempfile::TempDir,
    _creds: tempfile::TempDir,
}

async fn start_relay() -> TestRelay {
    let staging = tempfile::TempDir::new().unwrap();
    let creds_dir = tempfile::TempDir::new().unwrap();
    let creds_path = creds_dir.path().join("users.txt");
    std::fs::write(&creds_path, "alice secret\nbob hunter2\n").unwrap();

    let files: FileMap = Arc::new(Mutex::new(HashMap::new()));
    let bridge = Arc::new(StorageBridge::new(
        BackendConfig::default(),
        Box::new(FakeHdfs {
            files: Arc::clone(&files),
        }),
    ));

    let handler = RelayHandler::new(
        CredentialFile::new(&creds_path),
        Arc::clone(&bridge),
        UploadCoordinator::new(Arc::clone(&bridge), staging.path()),
        DownloadStreamer::new(bridge, staging.path(), CHUNK_SIZE),
        CHUNK_SIZE,
    );

    let server = RelayServer::new(ServerConfig { port: 0 }, handler);
    let server2 = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        server2.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let url = format!("ws://127.0.0.1:{}", server.port().await);

    TestRelay {
        server,
        handle,
        url,
        files,
        _staging: staging,
        _creds: creds_dir,
    }
}

impl TestRelay {
    async fn connect(&self) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(&self.url).await.unwrap();
        ws
    }

    async fn shutdown(self) {
        self.server.shutdown();
        self.handle.await.unwrap();
    }

    fn stored(&self, logical: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(logical).cloned()
    }

    fn seed(&self, logical: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(logical.into(), data.to_vec());
    }
}

async fn send_json(ws: &mut Ws, value: serde_json::Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn recv_text(ws: &mut Ws) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .unwrap();
        match frame {
            WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn recv_binary(ws: &mut Ws) -> Vec<u8> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for chunk")
            .expect("connection closed")
            .unwrap();
        match frame {
            WsMessage::Binary(data) => return data.to_vec(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
}

async fn authenticate(ws: &mut Ws, username: &str, password: &str) -> serde_json::Value {
    send_json(
        ws,
        serde_json::json!({
            "id": "auth-1",
            "type": "authenticate",
            "payload": { "username": username, "password": password }
        }),
    )
    .await;
    recv_text(ws).await
}

#[tokio::test]
async fn authenticate_accepts_and_rejects() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;

    let ok = authenticate(&mut ws, "alice", "secret").await;
    assert_eq!(ok["type"], "auth_response");
    assert_eq!(ok["payload"]["status"], "SUCCESS");
    assert_eq!(ok["payload"]["username"], "alice");

    let bad = authenticate(&mut ws, "alice", "wrong").await;
    assert_eq!(bad["payload"]["status"], "FAIL");
    assert!(bad["payload"].get("username").is_none());

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "ls-1",
            "type": "list_files",
            "payload": { "username": "alice" }
        }),
    )
    .await;

    let reply = recv_text(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], 401);

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn cannot_operate_on_another_users_storage() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "ls-2",
            "type": "list_files",
            "payload": { "username": "bob" }
        }),
    )
    .await;

    let reply = recv_text(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], 401);

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn upload_commits_once_and_duplicates_report_exists() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "up-1",
            "type": "upload_file",
            "payload": { "username": "alice", "filename": "report.csv", "size": 50 }
        }),
    )
    .await;
    let ack = recv_text(&mut ws).await;
    assert_eq!(ack["type"], "ack_upload");
    assert_eq!(ack["payload"]["status"], "ACK");

    // 50 bytes split across two binary frames.
    let content: Vec<u8> = (0u8..50).collect();
    ws.send(WsMessage::Binary(content[..30].to_vec().into()))
        .await
        .unwrap();
    ws.send(WsMessage::Binary(content[30..].to_vec().into()))
        .await
        .unwrap();

    let done = recv_text(&mut ws).await;
    assert_eq!(done["type"], "file_upload");
    assert_eq!(done["payload"]["status"], "SUCCESS");
    assert_eq!(
        relay.stored("/server_storage/alice/report.csv").unwrap(),
        content
    );

    // Same destination again: the backend refuses the overwrite.
    send_json(
        &mut ws,
        serde_json::json!({
            "id": "up-2",
            "type": "upload_file",
            "payload": { "username": "alice", "filename": "report.csv", "size": 50 }
        }),
    )
    .await;
    let ack = recv_text(&mut ws).await;
    assert_eq!(ack["type"], "ack_upload");
    ws.send(WsMessage::Binary(content.clone().into()))
        .await
        .unwrap();
    let dup = recv_text(&mut ws).await;
    assert_eq!(dup["payload"]["status"], "EXISTS");
    assert_eq!(
        relay.stored("/server_storage/alice/report.csv").unwrap(),
        content
    );

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn upload_accepts_base64_file_data_envelopes() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "up-3",
            "type": "upload_file",
            "payload": { "username": "alice", "filename": "note.txt", "size": 5 }
        }),
    )
    .await;
    let ack = recv_text(&mut ws).await;
    assert_eq!(ack["type"], "ack_upload");

    // "hello" as a JSON chunk.
    send_json(
        &mut ws,
        serde_json::json!({
            "id": "chunk-1",
            "type": "file_data",
            "payload": { "data": "aGVsbG8=" }
        }),
    )
    .await;

    let done = recv_text(&mut ws).await;
    assert_eq!(done["payload"]["status"], "SUCCESS");
    assert_eq!(
        relay.stored("/server_storage/alice/note.txt").unwrap(),
        b"hello"
    );

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn download_streams_size_then_chunks() {
    let relay = start_relay().await;
    let content: Vec<u8> = (0..7u8).cycle().take(2500).collect();
    relay.seed("/server_storage/alice/data.bin", &content);

    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "dl-1",
            "type": "download_file",
            "payload": { "username": "alice", "filename": "data.bin" }
        }),
    )
    .await;

    let size = recv_text(&mut ws).await;
    assert_eq!(size["type"], "file_download_size");
    assert_eq!(size["payload"]["size"], 2500);

    let mut received = Vec::new();
    while received.len() < 2500 {
        let chunk = recv_binary(&mut ws).await;
        assert!(chunk.len() <= CHUNK_SIZE);
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, content);

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn download_of_missing_file_announces_zero() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "dl-2",
            "type": "download_file",
            "payload": { "username": "alice", "filename": "ghost.bin" }
        }),
    )
    .await;

    let size = recv_text(&mut ws).await;
    assert_eq!(size["type"], "file_download_size");
    assert_eq!(size["payload"]["size"], 0);

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn view_file_previews_and_reports_empty() {
    let relay = start_relay().await;
    relay.seed("/server_storage/alice/log.txt", b"line 1\nline 2\n");

    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "view-1",
            "type": "view_file",
            "payload": { "username": "alice", "filename": "log.txt" }
        }),
    )
    .await;
    let view = recv_text(&mut ws).await;
    assert_eq!(view["type"], "file_view");
    assert_eq!(view["payload"]["status"], "SUCCESS");
    assert_eq!(view["payload"]["data"], "line 1\nline 2\n");

    // Missing file: the command produces no output.
    send_json(
        &mut ws,
        serde_json::json!({
            "id": "view-2",
            "type": "view_file",
            "payload": { "username": "alice", "filename": "ghost.txt" }
        }),
    )
    .await;
    let view = recv_text(&mut ws).await;
    assert_eq!(view["payload"]["status"], "Error");
    assert_eq!(
        view["payload"]["message"],
        "unable to view the file or file is empty"
    );

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn list_and_delete_roundtrip() {
    let relay = start_relay().await;
    relay.seed("/server_storage/alice/a.txt", b"a");
    relay.seed("/server_storage/alice/b.txt", b"b");
    relay.seed("/server_storage/bob/c.txt", b"c");

    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "ls-1",
            "type": "list_files",
            "payload": { "username": "alice" }
        }),
    )
    .await;
    let list = recv_text(&mut ws).await;
    assert_eq!(list["type"], "file_list");
    assert_eq!(list["payload"]["files"], serde_json::json!(["a.txt", "b.txt"]));

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "rm-1",
            "type": "delete_file",
            "payload": { "username": "alice", "filename": "a.txt" }
        }),
    )
    .await;
    let del = recv_text(&mut ws).await;
    assert_eq!(del["type"], "file_delete");
    assert_eq!(del["payload"]["status"], "SUCCESS");
    assert!(relay.stored("/server_storage/alice/a.txt").is_none());

    // Deleting it again fails.
    send_json(
        &mut ws,
        serde_json::json!({
            "id": "rm-2",
            "type": "delete_file",
            "payload": { "username": "alice", "filename": "a.txt" }
        }),
    )
    .await;
    let del = recv_text(&mut ws).await;
    assert_eq!(del["payload"]["status"], "FAIL");

    drop(ws);
    relay.shutdown().await;
}

#[tokio::test]
async fn disconnect_discards_partial_upload() {
    let relay = start_relay().await;
    let mut ws = relay.connect().await;
    authenticate(&mut ws, "alice", "secret").await;

    send_json(
        &mut ws,
        serde_json::json!({
            "id": "up-4",
            "type": "upload_file",
            "payload": { "username": "alice", "filename": "partial.bin", "size": 100 }
        }),
    )
    .await;
    let ack = recv_text(&mut ws).await;
    assert_eq!(ack["type"], "ack_upload");

    ws.send(WsMessage::Binary(vec![0u8; 40].into()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(ws);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Nothing was committed.
    assert!(relay.stored("/server_storage/alice/partial.bin").is_none());

    relay.shutdown().await;
}
