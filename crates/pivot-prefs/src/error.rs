//! Preferences error types.
//!
//! Every fallible operation of the store surfaces a [`PrefsError`]. Failures
//! on the persistence paths (write, read, existence checks, delete, dump and
//! list) are always wrapped as [`PrefsError::Serialization`] with the original
//! cause attached, so callers can match on one variant and still walk the
//! `source()` chain for details.
//!
//! Initialization problems are deliberately absent here: they are reported
//! through [`InitStatus`](crate::backend::InitStatus) instead.

use std::path::PathBuf;

/// Unified error type for the preferences store.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    /// A key was empty on `get`, `put` or `remove`.
    #[error("not a valid key \"{key}\"")]
    InvalidKey { key: String },

    /// An I/O, encoding or remote-service failure on a persistence path.
    #[error("unable to {op}: {source}")]
    Serialization {
        op: &'static str,
        #[source]
        source: Cause,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl PrefsError {
    /// Wrap `source` as a serialization failure of operation `op`.
    pub fn serialization(op: &'static str, source: impl Into<Cause>) -> Self {
        Self::Serialization {
            op,
            source: source.into(),
        }
    }
}

/// The underlying failure carried by [`PrefsError::Serialization`].
#[derive(Debug, thiserror::Error)]
pub enum Cause {
    /// Filesystem or stream failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The stored text is not a JSON object of preferences.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A resource name did not form a valid URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// The persistence service rejected the request.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Serialized bytes were not valid UTF-8.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Errors raised by a [`PersistenceService`](crate::remote::PersistenceService).
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// No managed session is available in this environment.
    #[error("persistence service unavailable: {reason}")]
    Unavailable { reason: String },

    /// No entry exists for the URL.
    #[error("no persistent entry for {url}")]
    NotFound { url: String },

    /// `create` was called for a URL that already has an entry.
    #[error("persistent entry already exists for {url}")]
    AlreadyExists { url: String },

    /// Stream-level failure while reading or writing an entry.
    #[error("persistence io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PrefsError>;
