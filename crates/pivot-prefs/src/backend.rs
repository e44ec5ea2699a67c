//! Pluggable storage backends.
//!
//! A [`StorageBackend`] owns the translation from a [`PrefsLayout`] and a
//! context name to actual bytes. The store never touches storage directly;
//! it resolves the layout once through the backend, then delegates every
//! persistence operation to it:
//!
//! - [`FileSystemBackend`](crate::fs::FileSystemBackend) — one JSON file per
//!   context under the user's home directory.
//! - [`RemoteServiceBackend`](crate::remote::RemoteServiceBackend) — one
//!   URL-keyed entry per context in a managed persistence service.

use std::collections::HashMap;
use std::fmt;

use crate::error::Result;
use crate::layout::PrefsLayout;

/// The in-memory preferences map: non-empty string keys to JSON values.
pub type PrefsMap = HashMap<String, serde_json::Value>;

/// Which storage medium a backend writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// JSON files under the user's home directory.
    FileSystem,
    /// Entries of a URL-keyed persistence service.
    Remote,
}

impl BackendKind {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileSystem => "filesystem",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the backend's construction-time initialization.
///
/// Initialization never raises. A failed backend leaves the store usable as a
/// plain in-memory map, but persistence operations will not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    /// The backend is ready to persist.
    Initialized,
    /// Setup failed; `reason` is the diagnostic.
    Failed { reason: String },
}

impl InitStatus {
    /// A failed status carrying `reason`.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether persistence operations can be attempted.
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized)
    }

    /// The diagnostic captured when initialization failed.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Initialized => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}

/// Storage-medium-specific half of the preferences lifecycle.
///
/// Methods take `&mut self` because backends may lazily acquire and cache
/// session handles; each store owns its backend exclusively.
pub trait StorageBackend {
    /// The storage medium this backend targets.
    fn kind(&self) -> BackendKind;

    /// Separator placed between `base_name` and the context name.
    fn path_separator(&self) -> &str;

    /// Compute the path triple for `application_name`. Must be deterministic.
    fn resolve_layout(&self, application_name: &str) -> PrefsLayout;

    /// Prepare the preferences area. Failures are reported, never raised.
    fn init(&mut self, layout: &PrefsLayout) -> InitStatus;

    /// Replace the resource for `context` with the serialized `prefs`.
    fn write(&mut self, layout: &PrefsLayout, context: &str, prefs: &PrefsMap) -> Result<()>;

    /// Deserialize the resource for `context` into a fresh map.
    fn read(&mut self, layout: &PrefsLayout, context: &str) -> Result<PrefsMap>;

    /// Whether the resource for `context` is present.
    fn exists(&mut self, layout: &PrefsLayout, context: &str) -> Result<bool>;

    /// Remove the resource for `context`; `false` if nothing was removed.
    fn delete(&mut self, layout: &PrefsLayout, context: &str) -> Result<bool>;

    /// Textual content of the resource for `context`.
    fn dump(&mut self, layout: &PrefsLayout, context: &str) -> Result<String>;

    /// Context names stored for the application, or `None` when the backend
    /// cannot enumerate or the preferences area does not exist.
    fn list(&mut self, layout: &PrefsLayout) -> Result<Option<Vec<String>>>;

    /// Remove the whole preferences area of the application.
    fn delete_preferences_path(&mut self, layout: &PrefsLayout) -> bool;
}
