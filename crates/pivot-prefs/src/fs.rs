//! Filesystem backend.
//!
//! Contexts are stored as one JSON file each, below a hidden directory in the
//! user's home:
//!
//! ```text
//! <home>/.pivot/com/example/App/settings.json
//! ```
//!
//! Dots in the application name become nested directories. Dots in the home
//! path itself are replaced with the path separator as well; this keeps the
//! layout of preferences written by earlier releases and can be switched off
//! through [`PrefsConfig::flatten_home_dots`].

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::backend::{BackendKind, InitStatus, PrefsMap, StorageBackend};
use crate::config::PrefsConfig;
use crate::error::{PrefsError, Result};
use crate::layout::{PREFS_DIR, PREFS_EXTENSION, PrefsLayout, strip_extension};

/// Stores each context as `<preferences path>/<context>.json`.
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    home: Option<PathBuf>,
    flatten_home_dots: bool,
    pretty: bool,
}

impl FileSystemBackend {
    /// Backend rooted at the current user's home directory.
    pub fn new() -> Self {
        Self::with_config(&PrefsConfig::default())
    }

    /// Backend honouring the home override and output options of `config`.
    ///
    /// Without an override the home directory comes from `dirs::home_dir`.
    /// If that cannot be resolved either, initialization reports
    /// [`InitStatus::Failed`] and every persistence operation fails.
    pub fn with_config(config: &PrefsConfig) -> Self {
        Self::rooted_at(config.home_dir.clone().or_else(dirs::home_dir), config)
    }

    fn rooted_at(home: Option<PathBuf>, config: &PrefsConfig) -> Self {
        Self {
            home,
            flatten_home_dots: config.flatten_home_dots,
            pretty: config.pretty,
        }
    }

    /// The home directory this backend roots its preferences in.
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    fn resource_path(
        &self,
        op: &'static str,
        layout: &PrefsLayout,
        context: &str,
    ) -> Result<PathBuf> {
        if self.home.is_none() {
            return Err(PrefsError::serialization(op, no_home()));
        }
        Ok(PathBuf::from(layout.resource_name(context)))
    }
}

fn no_home() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "home directory unavailable")
}

impl Default for FileSystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for FileSystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::FileSystem
    }

    fn path_separator(&self) -> &str {
        MAIN_SEPARATOR_STR
    }

    fn resolve_layout(&self, application_name: &str) -> PrefsLayout {
        let sep = self.path_separator();
        let root_path = match &self.home {
            Some(home) => {
                let home = home.to_string_lossy();
                if self.flatten_home_dots {
                    format!("{}{sep}", home.replace('.', sep))
                } else {
                    format!("{home}{sep}")
                }
            }
            None => String::new(),
        };

        PrefsLayout {
            root_path,
            base_path: format!("{PREFS_DIR}{sep}"),
            base_name: application_name.replace('.', "/"),
            separator: sep.to_string(),
        }
    }

    fn init(&mut self, layout: &PrefsLayout) -> InitStatus {
        if self.home.is_none() {
            warn!("home directory unavailable, preferences cannot be persisted");
            return InitStatus::failed(no_home().to_string());
        }
        let dir = PathBuf::from(layout.preferences_path());
        if dir.exists() {
            return InitStatus::Initialized;
        }
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "created preferences directory");
                InitStatus::Initialized
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "cannot create preferences directory");
                InitStatus::failed(format!("cannot create {}: {e}", dir.display()))
            }
        }
    }

    fn write(&mut self, layout: &PrefsLayout, context: &str, prefs: &PrefsMap) -> Result<()> {
        let path = self.resource_path("write", layout, context)?;
        let file = File::create(&path).map_err(|e| PrefsError::serialization("write", e))?;
        let mut out = BufWriter::new(file);

        let encoded = if self.pretty {
            serde_json::to_writer_pretty(&mut out, prefs)
        } else {
            serde_json::to_writer(&mut out, prefs)
        };
        encoded.map_err(|e| PrefsError::serialization("write", e))?;
        out.flush().map_err(|e| PrefsError::serialization("write", e))?;

        info!(path = %path.display(), entries = prefs.len(), "saved preferences");
        Ok(())
    }

    fn read(&mut self, layout: &PrefsLayout, context: &str) -> Result<PrefsMap> {
        let path = self.resource_path("read", layout, context)?;
        let file = File::open(&path).map_err(|e| PrefsError::serialization("read", e))?;
        let prefs: PrefsMap = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PrefsError::serialization("read", e))?;

        debug!(path = %path.display(), entries = prefs.len(), "loaded preferences");
        Ok(prefs)
    }

    fn exists(&mut self, layout: &PrefsLayout, context: &str) -> Result<bool> {
        let Ok(path) = self.resource_path("check for existence", layout, context) else {
            return Ok(false);
        };
        Ok(path.is_file() && File::open(&path).is_ok())
    }

    fn delete(&mut self, layout: &PrefsLayout, context: &str) -> Result<bool> {
        let Ok(path) = self.resource_path("delete", layout, context) else {
            return Ok(false);
        };
        let writable_file = std::fs::metadata(&path)
            .map(|m| m.is_file() && !m.permissions().readonly())
            .unwrap_or(false);
        if !writable_file {
            return Ok(false);
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted preferences");
                Ok(true)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "preferences file not removed");
                Ok(false)
            }
        }
    }

    fn dump(&mut self, layout: &PrefsLayout, context: &str) -> Result<String> {
        let path = self.resource_path("dump", layout, context)?;
        let file = File::open(&path).map_err(|e| PrefsError::serialization("dump", e))?;

        let mut dump = String::new();
        for line in BufReader::new(file).lines() {
            dump.push_str(&line.map_err(|e| PrefsError::serialization("dump", e))?);
        }
        Ok(dump)
    }

    fn list(&mut self, layout: &PrefsLayout) -> Result<Option<Vec<String>>> {
        if self.home.is_none() {
            return Ok(None);
        }
        let dir = PathBuf::from(layout.preferences_path());
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut contexts = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| PrefsError::serialization("list", e))? {
            let entry = entry.map_err(|e| PrefsError::serialization("list", e))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(PREFS_EXTENSION) {
                contexts.push(strip_extension(&name).to_string());
            }
        }
        contexts.sort();
        Ok(Some(contexts))
    }

    fn delete_preferences_path(&mut self, layout: &PrefsLayout) -> bool {
        if self.home.is_none() {
            return false;
        }
        let dir = PathBuf::from(layout.preferences_path());
        let removed = delete_dir(&dir);
        if removed {
            info!(path = %dir.display(), "deleted preferences directory");
        }
        removed
    }
}

/// Recursively delete `path`, children first.
///
/// Returns `false` as soon as any entry cannot be removed; the remaining
/// siblings at that level are left in place. Symbolic links are removed
/// without being followed.
pub fn delete_dir(path: &Path) -> bool {
    let is_dir = std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false);

    if is_dir {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read directory");
                return false;
            }
        };
        for entry in entries {
            let Ok(entry) = entry else {
                return false;
            };
            if !delete_dir(&entry.path()) {
                return false;
            }
        }
        std::fs::remove_dir(path).is_ok()
    } else {
        std::fs::remove_file(path).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn home() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("prefs-home-")
            .tempdir()
            .unwrap()
    }

    fn backend(home: &Path) -> FileSystemBackend {
        FileSystemBackend::with_config(
            &PrefsConfig::new()
                .with_home_dir(home)
                .with_flatten_home_dots(false),
        )
    }

    fn sample() -> PrefsMap {
        let mut prefs = PrefsMap::new();
        prefs.insert("theme".into(), json!("dark"));
        prefs.insert("size".into(), json!({"w": 800, "h": 600}));
        prefs
    }

    #[cfg(unix)]
    #[test]
    fn layout_maps_dotted_application_to_nested_dirs() {
        let fs = FileSystemBackend::with_config(&PrefsConfig::new().with_home_dir("/home/alice"));
        let layout = fs.resolve_layout("com.example.App");

        assert_eq!(layout.root_path, "/home/alice/");
        assert_eq!(layout.base_path, ".pivot/");
        assert_eq!(layout.base_name, "com/example/App");
        assert_eq!(
            layout.resource_name("settings"),
            "/home/alice/.pivot/com/example/App/settings.json"
        );
    }

    #[cfg(unix)]
    #[test]
    fn dots_in_home_are_flattened_by_default() {
        let fs = FileSystemBackend::with_config(&PrefsConfig::new().with_home_dir("/home/j.doe"));
        assert_eq!(fs.resolve_layout("App").root_path, "/home/j/doe/");

        let kept = FileSystemBackend::with_config(
            &PrefsConfig::new()
                .with_home_dir("/home/j.doe")
                .with_flatten_home_dots(false),
        );
        assert_eq!(kept.resolve_layout("App").root_path, "/home/j.doe/");
    }

    #[test]
    fn init_creates_preferences_directory() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("org.acme.Tool");

        assert!(fs.init(&layout).is_initialized());
        assert!(home.path().join(".pivot/org/acme/Tool").is_dir());
        // Idempotent.
        assert!(fs.init(&layout).is_initialized());
    }

    #[test]
    fn init_reports_failure_without_raising() {
        let home = home();
        let blocker = home.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut fs = backend(&blocker);
        let layout = fs.resolve_layout("App");
        let status = fs.init(&layout);
        assert!(!status.is_initialized());
        assert!(status.diagnostic().is_some());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);

        fs.write(&layout, "main", &sample()).unwrap();
        let read = fs.read(&layout, "main").unwrap();
        assert_eq!(read, sample());
    }

    #[test]
    fn read_missing_resource_is_serialization_error() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);

        let err = fs.read(&layout, "absent").unwrap_err();
        assert!(matches!(err, PrefsError::Serialization { op: "read", .. }));
    }

    #[test]
    fn read_rejects_non_object_root() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);
        std::fs::write(layout.resource_name("list"), "[1, 2, 3]").unwrap();

        assert!(fs.read(&layout, "list").is_err());
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");

        let err = fs.write(&layout, "main", &sample()).unwrap_err();
        assert!(matches!(err, PrefsError::Serialization { op: "write", .. }));
    }

    #[test]
    fn exists_and_delete() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);

        assert!(!fs.exists(&layout, "main").unwrap());
        assert!(!fs.delete(&layout, "main").unwrap());

        fs.write(&layout, "main", &sample()).unwrap();
        assert!(fs.exists(&layout, "main").unwrap());
        assert!(fs.delete(&layout, "main").unwrap());
        assert!(!fs.exists(&layout, "main").unwrap());
    }

    #[test]
    fn delete_refuses_read_only_file() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);
        fs.write(&layout, "locked", &sample()).unwrap();

        let path = layout.resource_name("locked");
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        assert!(!fs.delete(&layout, "locked").unwrap());
        assert!(Path::new(&path).exists());
    }

    #[test]
    fn dump_joins_raw_lines() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);
        std::fs::write(layout.resource_name("raw"), "{\n  \"a\": 1\n}\n").unwrap();

        assert_eq!(fs.dump(&layout, "raw").unwrap(), "{  \"a\": 1}");
    }

    #[test]
    fn dump_does_not_parse() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);
        std::fs::write(layout.resource_name("broken"), "{ not json").unwrap();

        assert_eq!(fs.dump(&layout, "broken").unwrap(), "{ not json");
        assert!(fs.read(&layout, "broken").is_err());
    }

    #[test]
    fn pretty_output_is_still_loadable() {
        let home = home();
        let mut fs = FileSystemBackend::with_config(
            &PrefsConfig::new()
                .with_home_dir(home.path())
                .with_flatten_home_dots(false)
                .with_pretty(true),
        );
        let layout = fs.resolve_layout("App");
        fs.init(&layout);

        fs.write(&layout, "pretty", &sample()).unwrap();
        let raw = std::fs::read_to_string(layout.resource_name("pretty")).unwrap();
        assert!(raw.contains('\n'));
        assert_eq!(fs.read(&layout, "pretty").unwrap(), sample());
    }

    #[test]
    fn list_is_none_without_directory() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");

        assert_eq!(fs.list(&layout).unwrap(), None);
    }

    #[test]
    fn list_returns_sorted_contexts_without_extension() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);

        assert_eq!(fs.list(&layout).unwrap(), Some(vec![]));

        fs.write(&layout, "window", &sample()).unwrap();
        fs.write(&layout, "colors", &sample()).unwrap();
        let dir = PathBuf::from(layout.preferences_path());
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.join("nested.json")).unwrap();

        assert_eq!(
            fs.list(&layout).unwrap(),
            Some(vec!["colors".to_string(), "window".to_string()])
        );
    }

    #[test]
    fn delete_dir_removes_tree() {
        let home = home();
        let root = home.path().join("tree");
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::write(root.join("a/b/leaf.json"), "{}").unwrap();
        std::fs::write(root.join("top.json"), "{}").unwrap();

        assert!(delete_dir(&root));
        assert!(!root.exists());
    }

    #[test]
    fn delete_dir_on_missing_path_is_false() {
        let home = home();
        assert!(!delete_dir(&home.path().join("nothing-here")));
    }

    #[cfg(unix)]
    #[test]
    fn delete_dir_stops_at_undeletable_child() {
        use std::os::unix::fs::PermissionsExt;

        let home = home();
        let root = home.path().join("tree");
        let locked = root.join("locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(locked.join("leaf.json"), "{}").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        // Permission bits do not bind root; the failure cannot be provoked.
        if std::fs::write(locked.join("canary"), b"").is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }

        let removed = delete_dir(&root);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();

        assert!(!removed);
        assert!(root.is_dir());
        assert!(locked.is_dir());
        assert!(locked.join("leaf.json").is_file());
    }

    #[test]
    fn directory_at_resource_path_is_not_a_context() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("App");
        fs.init(&layout);
        let resource = layout.resource_name("d");
        std::fs::create_dir(&resource).unwrap();

        assert!(!fs.exists(&layout, "d").unwrap());
        assert!(!fs.delete(&layout, "d").unwrap());
        assert!(fs.read(&layout, "d").is_err());
        assert!(Path::new(&resource).is_dir());
    }

    #[test]
    fn missing_home_fails_init_and_persistence() {
        let mut fs = FileSystemBackend::rooted_at(None, &PrefsConfig::default());
        assert_eq!(fs.home(), None);

        let layout = fs.resolve_layout("App");
        assert_eq!(layout.root_path, "");
        let status = fs.init(&layout);
        assert!(!status.is_initialized());
        assert_eq!(status.diagnostic(), Some("home directory unavailable"));

        assert!(matches!(
            fs.write(&layout, "main", &sample()),
            Err(PrefsError::Serialization { op: "write", .. })
        ));
        assert!(fs.read(&layout, "main").is_err());
        assert!(fs.dump(&layout, "main").is_err());
        assert!(!fs.exists(&layout, "main").unwrap());
        assert!(!fs.delete(&layout, "main").unwrap());
        assert_eq!(fs.list(&layout).unwrap(), None);
        assert!(!fs.delete_preferences_path(&layout));
    }

    #[test]
    fn delete_preferences_path_removes_application_area() {
        let home = home();
        let mut fs = backend(home.path());
        let layout = fs.resolve_layout("com.example.App");
        fs.init(&layout);
        fs.write(&layout, "a", &sample()).unwrap();

        assert!(fs.delete_preferences_path(&layout));
        assert_eq!(fs.list(&layout).unwrap(), None);
        assert!(home.path().join(".pivot/com/example").is_dir());
    }
}
