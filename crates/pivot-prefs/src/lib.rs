//! # pivot-prefs
//!
//! Per-application preferences, persisted as one JSON object per context.
//!
//! A [`PreferencesStore`] holds an in-memory map of settings and delegates
//! persistence to a pluggable [`StorageBackend`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  PreferencesStore  (map + active context)    │
//! ├──────────────────────────────────────────────┤
//! │  StorageBackend    (layout, read/write/list) │
//! ├──────────────────────┬───────────────────────┤
//! │  FileSystemBackend   │  RemoteServiceBackend │
//! │  ~/.pivot/<app>/…    │  PersistenceService   │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`store`] — the dictionary API and the load/save lifecycle.
//! - [`backend`] — the backend trait and initialization status.
//! - [`layout`] — path-triple resolution and naming constants.
//! - [`fs`] — JSON files under the user's home directory.
//! - [`remote`] — URL-keyed persistence service, plus an in-memory service.
//! - [`config`] — TOML-loadable settings.
//! - [`error`] — unified error types.

pub mod backend;
pub mod config;
pub mod error;
pub mod fs;
pub mod layout;
pub mod remote;
pub mod store;

pub use backend::{BackendKind, InitStatus, PrefsMap, StorageBackend};
pub use config::PrefsConfig;
pub use error::{Cause, PersistenceError, PrefsError, Result};
pub use fs::FileSystemBackend;
pub use layout::{DEFAULT_CONTEXT, PREFS_DIR, PREFS_EXTENSION, PrefsLayout};
pub use remote::{
    MemoryPersistenceService, PersistenceService, RemoteContents, RemoteServiceBackend,
    ServiceLocator, ServiceResult, UnavailableLocator,
};
pub use store::PreferencesStore;
