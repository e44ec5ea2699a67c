//! The preferences store.
//!
//! [`PreferencesStore`] pairs a dictionary-style API over an in-memory
//! [`PrefsMap`] with explicit persistence through a [`StorageBackend`]. The
//! map and the persisted resource are never synchronized implicitly: callers
//! `load` to replace the map with a stored context and `save` to persist it.
//!
//! ```rust,no_run
//! use pivot_prefs::PreferencesStore;
//! use serde_json::json;
//!
//! # fn example() -> pivot_prefs::Result<()> {
//! let mut prefs = PreferencesStore::file_system("com.example.App");
//! prefs.put("theme", json!("dark"))?;
//! prefs.save(Some("settings"))?;
//!
//! let mut reloaded = PreferencesStore::file_system("com.example.App");
//! reloaded.load(Some("settings"))?;
//! assert_eq!(reloaded.get("theme")?, Some(&json!("dark")));
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{InitStatus, PrefsMap, StorageBackend};
use crate::config::PrefsConfig;
use crate::error::{PrefsError, Result};
use crate::fs::FileSystemBackend;
use crate::layout::{self, DEFAULT_CONTEXT, PrefsLayout};
use crate::remote::{RemoteServiceBackend, ServiceLocator};

/// A named bag of settings for one application, persisted per context.
pub struct PreferencesStore<B: StorageBackend> {
    application_name: String,
    context_name: String,
    layout: PrefsLayout,
    prefs: PrefsMap,
    status: InitStatus,
    backend: B,
}

impl PreferencesStore<FileSystemBackend> {
    /// Store under the current user's home directory.
    pub fn file_system(application_name: &str) -> Self {
        Self::new(application_name, FileSystemBackend::new())
    }
}

impl PreferencesStore<RemoteServiceBackend> {
    /// Store backed by the persistence service `locator` finds.
    pub fn remote(application_name: &str, locator: &dyn ServiceLocator) -> Self {
        Self::new(
            application_name,
            RemoteServiceBackend::new(locator, &PrefsConfig::default()),
        )
    }
}

impl<B: StorageBackend> PreferencesStore<B> {
    /// Resolve the layout for `application_name` and initialize `backend`.
    ///
    /// Never fails: check [`is_initialized`](Self::is_initialized) before
    /// relying on persistence. An empty application name falls back to
    /// [`DEFAULT_APPLICATION_NAME`](crate::layout::DEFAULT_APPLICATION_NAME).
    pub fn new(application_name: &str, mut backend: B) -> Self {
        let application_name = layout::application_name(application_name);
        let layout = backend.resolve_layout(&application_name);
        let status = backend.init(&layout);

        match status.diagnostic() {
            None => debug!(
                application = %application_name,
                backend = %backend.kind(),
                path = %layout,
                "preferences store ready"
            ),
            Some(reason) => warn!(
                application = %application_name,
                backend = %backend.kind(),
                reason,
                "preferences store not initialized, persistence unavailable"
            ),
        }

        Self {
            application_name,
            context_name: DEFAULT_CONTEXT.to_string(),
            layout,
            prefs: PrefsMap::new(),
            status,
            backend,
        }
    }

    // -- Identity and layout ----------------------------------------------

    /// The application name after defaulting.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// The active context, used by persistence calls that name none.
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Switch the active context; empty names select the default context.
    pub fn set_context_name(&mut self, context_name: &str) {
        self.context_name = layout::context_name(context_name);
    }

    /// Root of the layout: the home directory or the service codebase.
    pub fn root_path(&self) -> &str {
        &self.layout.root_path
    }

    /// Segment between the root and the application name.
    pub fn base_path(&self) -> &str {
        &self.layout.base_path
    }

    /// The application name as used in resource names.
    pub fn base_name(&self) -> &str {
        &self.layout.base_name
    }

    /// The full resolved layout.
    pub fn layout(&self) -> &PrefsLayout {
        &self.layout
    }

    /// Directory (or URL prefix) holding every context of the application.
    pub fn preferences_path(&self) -> String {
        self.layout.preferences_path()
    }

    /// Resource identifier of the active context.
    pub fn context_resource_name(&self) -> String {
        self.layout.resource_name(&self.context_name)
    }

    /// Outcome of backend initialization.
    pub fn init_status(&self) -> &InitStatus {
        &self.status
    }

    /// Whether the backend initialized successfully.
    pub fn is_initialized(&self) -> bool {
        self.status.is_initialized()
    }

    /// The storage backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // -- Dictionary -------------------------------------------------------

    /// Keys are valid when non-empty; no other syntax is enforced.
    pub fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
    }

    /// Fail with [`PrefsError::InvalidKey`] unless `key` is valid.
    pub fn check_valid_key(key: &str) -> Result<()> {
        if Self::is_valid_key(key) {
            Ok(())
        } else {
            Err(PrefsError::InvalidKey {
                key: key.to_string(),
            })
        }
    }

    /// The value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        Self::check_valid_key(key)?;
        Ok(self.prefs.get(key))
    }

    /// Insert `value`, returning the previous value for `key`.
    pub fn put(&mut self, key: &str, value: Value) -> Result<Option<Value>> {
        Self::check_valid_key(key)?;
        debug!(key, "prefs.put");
        Ok(self.prefs.insert(key.to_string(), value))
    }

    /// Insert `value`, or `default` when `value` is absent or JSON `null`.
    ///
    /// Unlike [`put`](Self::put), the key is not validated.
    pub fn put_or(&mut self, key: &str, value: Option<Value>, default: Value) -> Option<Value> {
        let value = match value {
            Some(Value::Null) | None => default,
            Some(v) => v,
        };
        self.prefs.insert(key.to_string(), value)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        Self::check_valid_key(key)?;
        debug!(key, "prefs.remove");
        Ok(self.prefs.remove(key))
    }

    /// Whether `key` has a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.prefs.contains_key(key)
    }

    /// Whether the map holds no settings.
    pub fn is_empty(&self) -> bool {
        self.prefs.is_empty()
    }

    /// Number of settings in the map.
    pub fn len(&self) -> usize {
        self.prefs.len()
    }

    /// Iterate over the settings in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.prefs.iter()
    }

    /// Empty the map and return to the default context. Nothing is persisted.
    pub fn clear(&mut self) {
        debug!(entries = self.prefs.len(), "prefs.clear");
        self.prefs = PrefsMap::new();
        self.context_name = DEFAULT_CONTEXT.to_string();
    }

    // -- Persistence ------------------------------------------------------

    fn activate(&mut self, context_name: Option<&str>) {
        if let Some(name) = context_name {
            self.set_context_name(name);
        }
    }

    /// Persist the map under `context_name` (or the active context).
    pub fn save(&mut self, context_name: Option<&str>) -> Result<bool> {
        self.activate(context_name);
        self.backend
            .write(&self.layout, &self.context_name, &self.prefs)?;
        Ok(true)
    }

    /// Replace the map with the stored `context_name`.
    ///
    /// On failure the map is left exactly as it was. A missing resource is
    /// reported as [`PrefsError::Serialization`]; use
    /// [`exists`](Self::exists) first to tell absence apart.
    pub fn load(&mut self, context_name: Option<&str>) -> Result<bool> {
        self.activate(context_name);
        let prefs = self.backend.read(&self.layout, &self.context_name)?;
        self.prefs = prefs;
        Ok(true)
    }

    /// Whether `context_name` (or the active context) is stored.
    pub fn exists(&mut self, context_name: Option<&str>) -> Result<bool> {
        self.activate(context_name);
        self.backend.exists(&self.layout, &self.context_name)
    }

    /// Remove the stored context; `false` if nothing was removed.
    pub fn delete(&mut self, context_name: Option<&str>) -> Result<bool> {
        self.activate(context_name);
        self.backend.delete(&self.layout, &self.context_name)
    }

    /// Textual content of the stored context, as the backend renders it.
    pub fn dump(&mut self, context_name: Option<&str>) -> Result<String> {
        self.activate(context_name);
        self.backend.dump(&self.layout, &self.context_name)
    }

    /// Contexts stored for this application; `None` when the backend cannot
    /// enumerate or nothing has been created yet.
    pub fn list_contexts(&mut self) -> Result<Option<Vec<String>>> {
        self.backend.list(&self.layout)
    }

    /// Remove every stored context of this application.
    pub fn delete_preferences_path(&mut self) -> bool {
        self.backend.delete_preferences_path(&self.layout)
    }
}

impl<B: StorageBackend> fmt::Display for PreferencesStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PreferencesStore {{ application: \"{}\", context: \"{}\", backend: {}, entries: {} }}",
            self.application_name,
            self.context_name,
            self.backend.kind(),
            self.prefs.len()
        )
    }
}

impl<B: StorageBackend + fmt::Debug> fmt::Debug for PreferencesStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferencesStore")
            .field("application_name", &self.application_name)
            .field("context_name", &self.context_name)
            .field("layout", &self.layout)
            .field("status", &self.status)
            .field("prefs", &self.prefs)
            .field("backend", &self.backend)
            .finish()
    }
}
