//! Storage bridge: builds backend commands and interprets their exit codes.
//!
//! Exit-code semantics are backend-specific, so they are centralized here as
//! tagged outcomes. Nothing above this layer ever inspects a raw code.

use std::path::Path;

use skiff_protocol::validate_name;

use crate::executor::CommandRunner;

/// Backend invocation settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend CLI entry point.
    pub bin: String,
    /// Root of the per-user namespace.
    pub root: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bin: "hadoop".into(),
            root: "/server_storage".into(),
        }
    }
}

/// Outcome of a backend write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    /// The destination path already exists; a success-adjacent outcome, not
    /// a failure.
    AlreadyExists,
    Failure(String),
}

/// Outcome of a backend remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Success,
    Failure(String),
}

/// One operation per backend action against the per-user namespace
/// `{root}/{owner}/{filename}`.
pub struct StorageBridge {
    config: BackendConfig,
    runner: Box<dyn CommandRunner>,
}

impl StorageBridge {
    pub fn new(config: BackendConfig, runner: Box<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Builds the backend-visible path for a user's file.
    pub fn logical_path(&self, owner: &str, filename: &str) -> String {
        format!("{}/{owner}/{filename}", self.config.root)
    }

    /// Lists the filenames stored for `owner`.
    ///
    /// Returns an empty list on any failure; this layer does not distinguish
    /// "no files" from "listing failed".
    pub async fn list_files(&self, owner: &str) -> Vec<String> {
        if let Err(e) = validate_name("username", owner) {
            tracing::warn!("rejecting list request: {e}");
            return Vec::new();
        }

        let command = format!(
            "{} fs -ls {}/{owner}/ | awk '{{print $8}}' | xargs -n 1 basename",
            self.config.bin, self.config.root
        );
        match self.runner.run(command).await {
            Ok(out) if out.success() => out
                .stdout
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect(),
            Ok(out) => {
                tracing::warn!(owner, stderr = %out.stderr.trim(), "file listing failed");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(owner, "backend unavailable: {e}");
                Vec::new()
            }
        }
    }

    /// Copies a staged local file into the backend.
    ///
    /// Exit 0 maps to `Success`, exit 1 to `AlreadyExists`, and anything
    /// else (including failure to launch the command) to `Failure`.
    pub async fn write_file(&self, local: &Path, owner: &str, filename: &str) -> WriteOutcome {
        if let Err(e) = self.validate_pair(owner, filename) {
            return WriteOutcome::Failure(e);
        }

        let logical = self.logical_path(owner, filename);
        let command = format!("{} fs -put {} {logical}", self.config.bin, local.display());
        match self.runner.run(command).await {
            Ok(out) => match out.exit_code {
                Some(0) => WriteOutcome::Success,
                Some(1) => WriteOutcome::AlreadyExists,
                code => WriteOutcome::Failure(format!(
                    "exit {code:?}: {}",
                    out.stderr.trim()
                )),
            },
            Err(e) => WriteOutcome::Failure(e.to_string()),
        }
    }

    /// Fetches a backend file into `local`.
    ///
    /// Returns `true` only if the command succeeded *and* the local file
    /// exists afterwards.
    pub async fn read_file(&self, owner: &str, filename: &str, local: &Path) -> bool {
        if let Err(e) = self.validate_pair(owner, filename) {
            tracing::warn!("rejecting read request: {e}");
            return false;
        }

        let logical = self.logical_path(owner, filename);
        let command = format!("{} fs -get {logical} {}", self.config.bin, local.display());
        match self.runner.run(command).await {
            Ok(out) if out.success() => local.is_file(),
            Ok(out) => {
                tracing::warn!(owner, filename, stderr = %out.stderr.trim(), "backend fetch failed");
                false
            }
            Err(e) => {
                tracing::error!(owner, filename, "backend unavailable: {e}");
                false
            }
        }
    }

    /// Removes a backend file.
    pub async fn remove_file(&self, owner: &str, filename: &str) -> RemoveOutcome {
        if let Err(e) = self.validate_pair(owner, filename) {
            return RemoveOutcome::Failure(e);
        }

        let logical = self.logical_path(owner, filename);
        let command = format!("{} fs -rm {logical}", self.config.bin);
        match self.runner.run(command).await {
            Ok(out) if out.success() => RemoveOutcome::Success,
            Ok(out) => RemoveOutcome::Failure(format!(
                "exit {:?}: {}",
                out.exit_code,
                out.stderr.trim()
            )),
            Err(e) => RemoveOutcome::Failure(e.to_string()),
        }
    }

    /// Reads the first `max_bytes` bytes of a backend file as text.
    ///
    /// `Err` means the command could not be executed at all. `Ok` carries
    /// whatever the backend printed, possibly empty, and the caller
    /// decides what an empty preview means.
    pub async fn preview_file(
        &self,
        owner: &str,
        filename: &str,
        max_bytes: usize,
    ) -> Result<String, String> {
        self.validate_pair(owner, filename)?;

        let logical = self.logical_path(owner, filename);
        let command = format!(
            "{} fs -cat {logical} | head -c {max_bytes}",
            self.config.bin
        );
        match self.runner.run(command).await {
            Ok(out) => {
                if !out.success() {
                    tracing::warn!(owner, filename, exit = ?out.exit_code, "preview command failed");
                }
                Ok(out.stdout)
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn validate_pair(&self, owner: &str, filename: &str) -> Result<(), String> {
        validate_name("username", owner).map_err(|e| e.to_string())?;
        validate_name("filename", filename).map_err(|e| e.to_string())?;
        Ok(())
    }
}
