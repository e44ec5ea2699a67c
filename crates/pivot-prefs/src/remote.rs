//! Remote persistence backend.
//!
//! Managed host environments expose a URL-keyed persistence service instead
//! of a writable filesystem. Entries live next to the application's codebase
//! URL and the whole path triple is flattened into a single name:
//!
//! ```text
//! http://apps.example.com/demo/_pivot_com.example.App_settings.json
//! ```
//!
//! The session is never looked up globally: callers hand a [`ServiceLocator`]
//! to [`RemoteServiceBackend::new`]. A failed lookup is captured and reported
//! through [`InitStatus`], so construction always succeeds.
//!
//! Known limitation: [`StorageBackend::exists`] only proves that a handle for
//! the entry can be acquired, not that it holds readable preferences.

use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{BackendKind, InitStatus, PrefsMap, StorageBackend};
use crate::config::PrefsConfig;
use crate::error::{PersistenceError, PrefsError, Result};
use crate::layout::{PREFS_DIR, PrefsLayout, strip_extension};

// ---------------------------------------------------------------------------
// Service boundary
// ---------------------------------------------------------------------------

/// Result of a call into a [`PersistenceService`].
pub type ServiceResult<T> = std::result::Result<T, PersistenceError>;

/// An open handle on one persistent entry.
pub trait RemoteContents {
    /// Stream over the entry's current bytes.
    fn reader(&self) -> io::Result<Box<dyn Read>>;

    /// Stream that replaces (or, with `append`, extends) the entry's bytes.
    /// Data is committed when the writer is flushed.
    fn writer(&self, append: bool) -> io::Result<Box<dyn Write>>;

    /// Maximum size in bytes granted when the entry was created.
    fn max_length(&self) -> u64;
}

/// URL-keyed persistence provided by a managed runtime.
pub trait PersistenceService: Send + Sync {
    /// Base URL the application was served from.
    fn codebase(&self) -> &Url;

    /// Create an empty entry; returns the granted maximum size.
    fn create(&self, url: &Url, max_size: u64) -> ServiceResult<u64>;

    /// Acquire a handle on an existing entry.
    fn get(&self, url: &Url) -> ServiceResult<Box<dyn RemoteContents>>;

    /// Remove an entry.
    fn delete(&self, url: &Url) -> ServiceResult<()>;

    /// Names of the entries under `url`, or `None` if enumeration is not
    /// supported.
    fn names(&self, url: &Url) -> ServiceResult<Option<Vec<String>>>;
}

/// Finds the persistence service of the current environment.
pub trait ServiceLocator {
    /// The service to persist through, or why none is reachable.
    fn persistence_service(&self) -> ServiceResult<Arc<dyn PersistenceService>>;
}

/// Locator for environments without a managed session.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLocator;

impl ServiceLocator for UnavailableLocator {
    fn persistence_service(&self) -> ServiceResult<Arc<dyn PersistenceService>> {
        Err(PersistenceError::Unavailable {
            reason: "no managed session in this environment".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// In-process service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Entry {
    data: Vec<u8>,
    max_size: u64,
}

/// Persistence service kept entirely in memory.
///
/// Clones share the same entries, so a clone can serve as the locator of one
/// store while another clone is inspected or handed to a second store.
#[derive(Debug, Clone)]
pub struct MemoryPersistenceService {
    codebase: Url,
    entries: Arc<DashMap<Url, Entry>>,
    listing: bool,
}

impl MemoryPersistenceService {
    /// An empty service rooted at `codebase`.
    pub fn new(codebase: Url) -> Self {
        Self {
            codebase,
            entries: Arc::new(DashMap::new()),
            listing: true,
        }
    }

    /// Report enumeration as unsupported, like restricted hosts do.
    pub fn without_listing(mut self) -> Self {
        self.listing = false;
        self
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry exists at `url`.
    pub fn contains(&self, url: &Url) -> bool {
        self.entries.contains_key(url)
    }
}

impl PersistenceService for MemoryPersistenceService {
    fn codebase(&self) -> &Url {
        &self.codebase
    }

    fn create(&self, url: &Url, max_size: u64) -> ServiceResult<u64> {
        if self.entries.contains_key(url) {
            return Err(PersistenceError::AlreadyExists {
                url: url.to_string(),
            });
        }
        self.entries.insert(
            url.clone(),
            Entry {
                data: Vec::new(),
                max_size,
            },
        );
        Ok(max_size)
    }

    fn get(&self, url: &Url) -> ServiceResult<Box<dyn RemoteContents>> {
        if !self.entries.contains_key(url) {
            return Err(PersistenceError::NotFound {
                url: url.to_string(),
            });
        }
        Ok(Box::new(MemoryContents {
            url: url.clone(),
            entries: Arc::clone(&self.entries),
        }))
    }

    fn delete(&self, url: &Url) -> ServiceResult<()> {
        self.entries
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound {
                url: url.to_string(),
            })
    }

    fn names(&self, url: &Url) -> ServiceResult<Option<Vec<String>>> {
        if !self.listing {
            return Ok(None);
        }
        let prefix = url.as_str();
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.key().as_str().strip_prefix(prefix).map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        Ok(Some(names))
    }
}

impl ServiceLocator for MemoryPersistenceService {
    fn persistence_service(&self) -> ServiceResult<Arc<dyn PersistenceService>> {
        Ok(Arc::new(self.clone()))
    }
}

struct MemoryContents {
    url: Url,
    entries: Arc<DashMap<Url, Entry>>,
}

impl MemoryContents {
    fn missing(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("entry {} was deleted", self.url),
        )
    }
}

impl RemoteContents for MemoryContents {
    fn reader(&self) -> io::Result<Box<dyn Read>> {
        let entry = self.entries.get(&self.url).ok_or_else(|| self.missing())?;
        Ok(Box::new(Cursor::new(entry.data.clone())))
    }

    fn writer(&self, append: bool) -> io::Result<Box<dyn Write>> {
        let entry = self.entries.get(&self.url).ok_or_else(|| self.missing())?;
        let buf = if append { entry.data.clone() } else { Vec::new() };
        Ok(Box::new(MemoryWriter {
            url: self.url.clone(),
            entries: Arc::clone(&self.entries),
            max_size: entry.max_size,
            buf,
        }))
    }

    fn max_length(&self) -> u64 {
        self.entries
            .get(&self.url)
            .map(|e| e.max_size)
            .unwrap_or(0)
    }
}

struct MemoryWriter {
    url: Url,
    entries: Arc<DashMap<Url, Entry>>,
    max_size: u64,
    buf: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if (self.buf.len() + data.len()) as u64 > self.max_size {
            return Err(io::Error::other(format!(
                "entry {} exceeds its maximum size of {} bytes",
                self.url, self.max_size
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut entry = self.entries.get_mut(&self.url).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("entry {} was deleted", self.url),
            )
        })?;
        entry.data = self.buf.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Stores each context as one entry of a [`PersistenceService`].
pub struct RemoteServiceBackend {
    service: Option<Arc<dyn PersistenceService>>,
    lookup_failure: Option<String>,
    max_resource_size: u64,
}

impl RemoteServiceBackend {
    /// Look up the persistence service through `locator`.
    ///
    /// A failed lookup is logged and remembered; the backend then reports a
    /// failed [`InitStatus`] and every persistence operation fails.
    pub fn new(locator: &dyn ServiceLocator, config: &PrefsConfig) -> Self {
        let (service, lookup_failure) = match locator.persistence_service() {
            Ok(service) => (Some(service), None),
            Err(e) => {
                warn!(error = %e, "persistence service lookup failed");
                (None, Some(e.to_string()))
            }
        };
        Self {
            service,
            lookup_failure,
            max_resource_size: config.max_resource_size,
        }
    }

    /// Codebase URL of the session, if one was found.
    pub fn codebase(&self) -> Option<&Url> {
        self.service.as_ref().map(|s| s.codebase())
    }

    fn service(&self, op: &'static str) -> Result<Arc<dyn PersistenceService>> {
        self.service.clone().ok_or_else(|| {
            PrefsError::serialization(
                op,
                PersistenceError::Unavailable {
                    reason: self
                        .lookup_failure
                        .clone()
                        .unwrap_or_else(|| "no persistence service".into()),
                },
            )
        })
    }

    fn fetch(&self, op: &'static str, layout: &PrefsLayout, context: &str) -> Result<PrefsMap> {
        let service = self.service(op)?;
        let url = parse_url(op, &layout.resource_name(context))?;

        let contents = service
            .get(&url)
            .map_err(|e| PrefsError::serialization(op, e))?;
        let reader = contents
            .reader()
            .map_err(|e| PrefsError::serialization(op, e))?;
        let prefs: PrefsMap =
            serde_json::from_reader(reader).map_err(|e| PrefsError::serialization(op, e))?;

        debug!(url = %url, entries = prefs.len(), "fetched remote preferences");
        Ok(prefs)
    }
}

impl std::fmt::Debug for RemoteServiceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteServiceBackend")
            .field("codebase", &self.codebase().map(Url::as_str))
            .field("lookup_failure", &self.lookup_failure)
            .field("max_resource_size", &self.max_resource_size)
            .finish()
    }
}

fn parse_url(op: &'static str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| PrefsError::serialization(op, e))
}

impl StorageBackend for RemoteServiceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn path_separator(&self) -> &str {
        "_"
    }

    fn resolve_layout(&self, application_name: &str) -> PrefsLayout {
        let sep = self.path_separator();
        PrefsLayout {
            root_path: self.codebase().map(Url::to_string).unwrap_or_default(),
            base_path: format!("{}{sep}", PREFS_DIR.replace('.', "_")),
            base_name: application_name.to_string(),
            separator: sep.to_string(),
        }
    }

    fn init(&mut self, _layout: &PrefsLayout) -> InitStatus {
        match (&self.service, &self.lookup_failure) {
            (Some(_), _) => InitStatus::Initialized,
            (None, Some(reason)) => InitStatus::failed(reason.clone()),
            (None, None) => InitStatus::failed("no persistence service"),
        }
    }

    fn write(&mut self, layout: &PrefsLayout, context: &str, prefs: &PrefsMap) -> Result<()> {
        const OP: &str = "write";
        let service = self.service(OP)?;
        let url = parse_url(OP, &layout.resource_name(context))?;

        // No atomic overwrite: clear the slot so `create` can succeed.
        match service.delete(&url) {
            Ok(()) | Err(PersistenceError::NotFound { .. }) => {}
            Err(e) => return Err(PrefsError::serialization(OP, e)),
        }
        service
            .create(&url, self.max_resource_size)
            .map_err(|e| PrefsError::serialization(OP, e))?;
        let contents = service
            .get(&url)
            .map_err(|e| PrefsError::serialization(OP, e))?;

        let mut out = contents
            .writer(false)
            .map_err(|e| PrefsError::serialization(OP, e))?;
        serde_json::to_writer(&mut out, prefs).map_err(|e| PrefsError::serialization(OP, e))?;
        out.flush().map_err(|e| PrefsError::serialization(OP, e))?;

        info!(url = %url, entries = prefs.len(), "saved remote preferences");
        Ok(())
    }

    fn read(&mut self, layout: &PrefsLayout, context: &str) -> Result<PrefsMap> {
        self.fetch("read", layout, context)
    }

    fn exists(&mut self, layout: &PrefsLayout, context: &str) -> Result<bool> {
        const OP: &str = "check for existence";
        let service = self.service(OP)?;
        let url = parse_url(OP, &layout.resource_name(context))?;

        match service.get(&url) {
            Ok(_) => Ok(true),
            Err(PersistenceError::NotFound { .. }) => Ok(false),
            Err(e) => Err(PrefsError::serialization(OP, e)),
        }
    }

    fn delete(&mut self, layout: &PrefsLayout, context: &str) -> Result<bool> {
        const OP: &str = "delete";
        let service = self.service(OP)?;
        let url = parse_url(OP, &layout.resource_name(context))?;

        match service.delete(&url) {
            Ok(()) => {
                info!(url = %url, "deleted remote preferences");
                Ok(true)
            }
            Err(PersistenceError::NotFound { .. }) => Ok(false),
            Err(e) => Err(PrefsError::serialization(OP, e)),
        }
    }

    fn dump(&mut self, layout: &PrefsLayout, context: &str) -> Result<String> {
        const OP: &str = "dump";
        let prefs = self.fetch(OP, layout, context)?;
        let bytes = serde_json::to_vec(&prefs).map_err(|e| PrefsError::serialization(OP, e))?;
        String::from_utf8(bytes).map_err(|e| PrefsError::serialization(OP, e))
    }

    fn list(&mut self, layout: &PrefsLayout) -> Result<Option<Vec<String>>> {
        const OP: &str = "list";
        let service = self.service(OP)?;
        let url = parse_url(OP, &layout.preferences_path())?;

        let names = service
            .names(&url)
            .map_err(|e| PrefsError::serialization(OP, e))?;
        Ok(names.map(|names| {
            names
                .iter()
                .map(|name| strip_extension(name).to_string())
                .collect()
        }))
    }

    fn delete_preferences_path(&mut self, layout: &PrefsLayout) -> bool {
        debug!(path = %layout, "remote backend keeps no preferences directory");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Cause;
    use serde_json::json;

    fn service() -> MemoryPersistenceService {
        MemoryPersistenceService::new(Url::parse("http://apps.example.com/demo/").unwrap())
    }

    fn backend(service: &MemoryPersistenceService) -> (RemoteServiceBackend, PrefsLayout) {
        let mut remote = RemoteServiceBackend::new(service, &PrefsConfig::default());
        let layout = remote.resolve_layout("com.example.App");
        assert!(remote.init(&layout).is_initialized());
        (remote, layout)
    }

    fn sample() -> PrefsMap {
        let mut prefs = PrefsMap::new();
        prefs.insert("theme".into(), json!("dark"));
        prefs.insert("recent".into(), json!(["a.txt", "b.txt"]));
        prefs
    }

    #[test]
    fn layout_flattens_into_codebase_url() {
        let svc = service();
        let (_, layout) = backend(&svc);

        assert_eq!(layout.root_path, "http://apps.example.com/demo/");
        assert_eq!(layout.base_path, "_pivot_");
        assert_eq!(layout.base_name, "com.example.App");
        assert_eq!(
            layout.resource_name("settings"),
            "http://apps.example.com/demo/_pivot_com.example.App_settings.json"
        );
    }

    #[test]
    fn write_then_read_roundtrip() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);

        remote.write(&layout, "main", &sample()).unwrap();
        assert_eq!(remote.read(&layout, "main").unwrap(), sample());
    }

    #[test]
    fn every_access_reacquires_the_entry() {
        let svc = service();
        let (mut first, layout) = backend(&svc);
        let (mut second, _) = backend(&svc);

        first.write(&layout, "main", &sample()).unwrap();
        assert!(first.exists(&layout, "main").unwrap());

        let mut newer = PrefsMap::new();
        newer.insert("theme".into(), json!("light"));
        second.write(&layout, "main", &newer).unwrap();
        assert_eq!(first.read(&layout, "main").unwrap(), newer);

        assert!(second.delete(&layout, "main").unwrap());
        assert!(!first.exists(&layout, "main").unwrap());
        assert!(first.dump(&layout, "main").is_err());
    }

    #[test]
    fn write_replaces_existing_entry() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);

        remote.write(&layout, "main", &sample()).unwrap();
        let mut smaller = PrefsMap::new();
        smaller.insert("only".into(), json!(1));
        remote.write(&layout, "main", &smaller).unwrap();

        assert_eq!(remote.read(&layout, "main").unwrap(), smaller);
        assert_eq!(svc.len(), 1);
    }

    #[test]
    fn write_over_size_limit_fails() {
        let svc = service();
        let mut remote =
            RemoteServiceBackend::new(&svc, &PrefsConfig::new().with_max_resource_size(8));
        let layout = remote.resolve_layout("App");

        let err = remote.write(&layout, "big", &sample()).unwrap_err();
        assert!(matches!(err, PrefsError::Serialization { op: "write", .. }));
    }

    #[test]
    fn exists_only_checks_handle_acquisition() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);
        assert!(!remote.exists(&layout, "main").unwrap());

        // An entry that was created but never written still "exists".
        let url = Url::parse(&layout.resource_name("main")).unwrap();
        svc.create(&url, 4096).unwrap();
        assert!(remote.exists(&layout, "main").unwrap());
        assert!(remote.read(&layout, "main").is_err());
    }

    #[test]
    fn delete_reports_whether_entry_was_removed() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);

        assert!(!remote.delete(&layout, "main").unwrap());
        remote.write(&layout, "main", &sample()).unwrap();
        assert!(remote.delete(&layout, "main").unwrap());
        assert!(svc.is_empty());
    }

    #[test]
    fn dump_reserializes_stored_map() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);
        remote.write(&layout, "main", &sample()).unwrap();

        let dump = remote.dump(&layout, "main").unwrap();
        let parsed: PrefsMap = serde_json::from_str(&dump).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn dump_missing_entry_fails() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);

        let err = remote.dump(&layout, "absent").unwrap_err();
        assert!(matches!(
            err,
            PrefsError::Serialization {
                op: "dump",
                source: Cause::Persistence(PersistenceError::NotFound { .. })
            }
        ));
    }

    #[test]
    fn list_strips_extension() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);
        remote.write(&layout, "window", &sample()).unwrap();
        remote.write(&layout, "colors", &sample()).unwrap();

        let other = remote.resolve_layout("other.App");
        remote.write(&other, "ignored", &sample()).unwrap();

        assert_eq!(
            remote.list(&layout).unwrap(),
            Some(vec!["colors".to_string(), "window".to_string()])
        );
    }

    #[test]
    fn list_is_none_without_enumeration_support() {
        let svc = service().without_listing();
        let (mut remote, layout) = backend(&svc);
        remote.write(&layout, "main", &sample()).unwrap();

        assert_eq!(remote.list(&layout).unwrap(), None);
    }

    #[test]
    fn unavailable_session_fails_softly() {
        let mut remote = RemoteServiceBackend::new(&UnavailableLocator, &PrefsConfig::default());
        let layout = remote.resolve_layout("App");

        assert_eq!(layout.root_path, "");
        let status = remote.init(&layout);
        assert!(!status.is_initialized());
        assert!(status.diagnostic().unwrap().contains("no managed session"));

        let err = remote.write(&layout, "main", &sample()).unwrap_err();
        assert!(matches!(
            err,
            PrefsError::Serialization {
                source: Cause::Persistence(PersistenceError::Unavailable { .. }),
                ..
            }
        ));
    }

    #[test]
    fn delete_preferences_path_is_unsupported() {
        let svc = service();
        let (mut remote, layout) = backend(&svc);
        assert!(!remote.delete_preferences_path(&layout));
    }

    #[test]
    fn memory_service_rejects_duplicate_create() {
        let svc = service();
        let url = Url::parse("http://apps.example.com/demo/x.json").unwrap();
        assert_eq!(svc.create(&url, 16).unwrap(), 16);
        assert!(matches!(
            svc.create(&url, 16),
            Err(PersistenceError::AlreadyExists { .. })
        ));
        assert_eq!(svc.get(&url).unwrap().max_length(), 16);
    }
}
