//! Storage-path resolution.
//!
//! Every backend maps an application name onto a path triple
//! (`root_path`, `base_path`, `base_name`) plus a separator. The triple is
//! resolved once, when the store is constructed, and together with a context
//! name and the fixed [`PREFS_EXTENSION`] it identifies one resource:
//!
//! ```text
//! <root_path><base_path><base_name><separator><context>.json
//! ```

use std::fmt;

/// Hidden directory that groups all applications' preferences.
pub const PREFS_DIR: &str = ".pivot";

/// Context used when none (or an empty one) is given.
pub const DEFAULT_CONTEXT: &str = "defaultPreferences";

/// Extension of every serialized context resource.
pub const PREFS_EXTENSION: &str = ".json";

/// Application name used when the caller supplies an empty one.
pub const DEFAULT_APPLICATION_NAME: &str = "pivot.prefs.Preferences";

/// The resolved location of an application's preferences area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefsLayout {
    /// Root of all preferences: the home directory or the service codebase.
    pub root_path: String,
    /// Segment between the root and the application name.
    pub base_path: String,
    /// The application name as it appears in resource names.
    pub base_name: String,
    /// Joins the base name to a context name.
    pub separator: String,
}

impl PrefsLayout {
    /// The directory (or directory-equivalent prefix) holding all contexts.
    pub fn preferences_path(&self) -> String {
        format!(
            "{}{}{}{}",
            self.root_path, self.base_path, self.base_name, self.separator
        )
    }

    /// The full resource name for `context`.
    pub fn resource_name(&self, context: &str) -> String {
        format!("{}{context}{PREFS_EXTENSION}", self.preferences_path())
    }
}

impl fmt::Display for PrefsLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preferences_path())
    }
}

/// Normalize an application name; empty names fall back to
/// [`DEFAULT_APPLICATION_NAME`].
pub fn application_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_APPLICATION_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Normalize a context name; empty names fall back to [`DEFAULT_CONTEXT`].
pub fn context_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_CONTEXT.to_string()
    } else {
        name.to_string()
    }
}

/// Drop everything from the last `.` on. Names without a dot are kept whole.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}
