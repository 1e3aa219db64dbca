//! Persistent client identity.
//!
//! The backend keys conversation history by the id in the connection URL, so
//! the client reuses the same id across runs. It is stored as a single line
//! in `<data_dir>/streamchat/client_id` and generated (UUID v4) on first use.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Errors that can occur while loading or creating the client id.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The identity file exists but could not be read.
    #[error("failed to read identity file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A new identity could not be written.
    #[error("failed to write identity file {path}: {source}")]
    Write {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No platform data directory is available.
    #[error("no data directory available for the identity file")]
    NoDataDir,
}

/// Identifier the client presents to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Default location of the identity file.
///
/// # Errors
///
/// Returns [`IdentityError::NoDataDir`] if the platform has no data directory.
pub fn default_identity_path() -> Result<PathBuf, IdentityError> {
    dirs::data_dir()
        .map(|dir| dir.join("streamchat").join("client_id"))
        .ok_or(IdentityError::NoDataDir)
}

/// Read the id stored at `path`, creating and persisting one if needed.
///
/// A missing or blank file is treated as "no id yet".
///
/// # Errors
///
/// Returns [`IdentityError`] if the file cannot be read or written.
pub fn load_or_create(path: &Path) -> Result<ClientId, IdentityError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim();
            if !id.is_empty() {
                tracing::debug!(path = %path.display(), "loaded client id");
                return Ok(ClientId::new(id));
            }
            tracing::warn!(path = %path.display(), "identity file is blank, regenerating");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(IdentityError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }

    let id = ClientId::generate();
    let write_err = |source| IdentityError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, format!("{id}\n")).map_err(write_err)?;
    tracing::info!(path = %path.display(), client_id = %id, "created client id");
    Ok(id)
}

/// Resolve the id to use: an explicit override, else the persisted one.
///
/// # Errors
///
/// Returns [`IdentityError`] if the persisted id cannot be loaded or created.
pub fn resolve(explicit: Option<&str>, file: Option<&Path>) -> Result<ClientId, IdentityError> {
    if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(ClientId::new(id));
    }
    match file {
        Some(path) => load_or_create(path),
        None => load_or_create(&default_identity_path()?),
    }
}
