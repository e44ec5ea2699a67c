//! Store configuration.
//!
//! [`PrefsConfig`] controls where the filesystem backend roots its files and
//! how much space the remote backend requests per entry. Defaults match the
//! historical on-disk layout, a builder-style API customises individual
//! fields, and [`PrefsConfig::load`] reads the same fields from a TOML file:
//!
//! ```toml
//! home_dir = "/srv/prefs-home"
//! flatten_home_dots = false
//! pretty = true
//! max_resource_size = 8192
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PrefsError, Result};

/// Settings shared by both backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefsConfig {
    /// Root for the filesystem backend. `None` uses the user's home directory.
    pub home_dir: Option<PathBuf>,

    /// Replace literal dots in the home path with the path separator.
    ///
    /// Default: **true** (legacy layout: `/home/j.doe` roots at
    /// `/home/j/doe/`).
    pub flatten_home_dots: bool,

    /// Pretty-print JSON written by the filesystem backend.
    ///
    /// Default: **false**.
    pub pretty: bool,

    /// Bytes requested when the remote backend creates an entry.
    ///
    /// Default: **4096**.
    pub max_resource_size: u64,
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            home_dir: None,
            flatten_home_dots: true,
            pretty: false,
            max_resource_size: 4096,
        }
    }
}

impl PrefsConfig {
    /// Same as [`PrefsConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration from a TOML file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PrefsError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text).map_err(|reason| PrefsError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!(path = %path.display(), "loaded preferences config");
        Ok(config)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Root the filesystem backend at `dir` instead of the user's home.
    pub fn with_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(dir.into());
        self
    }

    /// Toggle turning dots in the home path into separators.
    pub fn with_flatten_home_dots(mut self, flatten: bool) -> Self {
        self.flatten_home_dots = flatten;
        self
    }

    /// Toggle indented JSON output.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Maximum size, in bytes, of a remote entry.
    pub fn with_max_resource_size(mut self, bytes: u64) -> Self {
        self.max_resource_size = bytes;
        self
    }
}
