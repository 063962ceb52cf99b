//! Credential-file authentication gate.
//!
//! Credentials live in an externally-maintained text file, one
//! `username password` pair per line, whitespace separated. The file is
//! re-read on every check so an operator can edit it without restarting the
//! relay. Passwords may not contain whitespace; that is a property of the
//! file format, not of this crate.

use std::path::{Path, PathBuf};

/// Checks username/password pairs against a credential file.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the underlying credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` iff the file contains a line matching both fields.
    ///
    /// A missing or unreadable file denies everyone. Lines that are not
    /// exactly two fields are skipped.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "credential file unreadable: {e}");
                return false;
            }
        };

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(user), Some(pass), None) => {
                    if user == username && pass == password {
                        tracing::debug!(username, "credential match");
                        return true;
                    }
                }
                _ => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        "skipping malformed credential line"
                    );
                }
            }
        }

        tracing::debug!(username, "no credential match");
        false
    }
}
