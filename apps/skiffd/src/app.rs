//! Application orchestrator: wires the relay components together.

use std::sync::Arc;

use skiff_auth::CredentialFile;
use skiff_backend::{BackendConfig, ShellRunner, StorageBridge};
use skiff_protocol::constants::CHUNK_SIZE;
use skiff_server::{RelayServer, ServerConfig};
use skiff_transfer::{DownloadStreamer, UploadCoordinator};

use crate::config::Config;
use crate::handler::RelayHandler;

/// Runs the relay until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.staging_dir)?;

    // -- Storage backend --
    let backend_config = BackendConfig {
        bin: config.backend_bin.clone(),
        root: config.storage_root.clone(),
    };
    let bridge = Arc::new(StorageBridge::new(backend_config, Box::new(ShellRunner)));

    // -- Transfers --
    let uploads = UploadCoordinator::new(Arc::clone(&bridge), &config.staging_dir);
    let downloads = DownloadStreamer::new(Arc::clone(&bridge), &config.staging_dir, CHUNK_SIZE);

    // -- Auth --
    let credentials = CredentialFile::new(&config.credentials_path);
    tracing::info!(path = %config.credentials_path, "credential file configured");

    // -- WS relay --
    let handler = RelayHandler::new(
        credentials,
        bridge,
        uploads,
        downloads,
        config.preview_max_bytes,
    );

    let server = RelayServer::new(ServerConfig { port: config.port }, handler);
    let server_run = Arc::clone(&server);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server_run.run().await {
            tracing::error!("server error: {e}");
        }
    });

    // Wait for the server to bind.
    let port = loop {
        let p = server.port().await;
        if p > 0 {
            break p;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    };
    tracing::info!(port, "relay ready");

    // -- Main loop: wait for shutdown --
    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, shutting down");

    server.shutdown();
    server_task.await?;
    Ok(())
}
