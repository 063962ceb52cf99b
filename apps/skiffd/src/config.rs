//! Daemon configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/skiff/skiffd.toml`
//! - elsewhere: `/tmp/skiff/skiffd.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port the WebSocket relay listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Binary invoked for every storage operation.
    #[serde(default = "default_backend_bin")]
    pub backend_bin: String,

    /// Backend root under which per-user directories live.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,

    /// Local directory for in-flight transfer staging files.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Credential file, one `username password` pair per line.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    /// Byte cap on `view_file` previews.
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: usize,
}

fn default_port() -> u16 {
    65432
}

fn default_backend_bin() -> String {
    "hadoop".into()
}

fn default_storage_root() -> String {
    "/server_storage".into()
}

fn default_staging_dir() -> String {
    "/tmp/skiff/staging".into()
}

fn default_credentials_path() -> String {
    "users.txt".into()
}

fn default_preview_max_bytes() -> usize {
    skiff_protocol::constants::CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend_bin: default_backend_bin(),
            storage_root: default_storage_root(),
            staging_dir: default_staging_dir(),
            credentials_path: default_credentials_path(),
            preview_max_bytes: default_preview_max_bytes(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("skiff")
            .join("skiffd.toml"))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(PathBuf::from("/tmp/skiff/skiffd.toml"))
    }
}
