//! Skiff relay daemon entry point.

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting skiffd");

    // Load configuration.
    let config = skiffd::config::Config::load()?;
    tracing::info!(port = config.port, "configuration loaded");

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(skiffd::app::run(config))?;

    tracing::info!("skiffd shut down cleanly");
    Ok(())
}
