//! Gateway-owned documents the manager does not keep for us: human names of
//! installed applications and the saved configuration-document templates.

use std::{
    collections::{HashMap, HashSet},
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::info;

use crate::{error::GatewayError, logging::category_registry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Document {
    Applications,
    Templates,
}

impl Document {
    pub fn file_name(&self) -> &'static str {
        match self {
            Document::Applications => "apps.json",
            Document::Templates => "yamls.json",
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Whole-document storage. `read` yields `None` for a document never written.
pub trait DocumentStore: Send + Sync {
    fn read(&self, document: Document) -> io::Result<Option<Vec<u8>>>;
    fn write(&self, document: Document, bytes: &[u8]) -> io::Result<()>;
}

pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, document: Document) -> PathBuf {
        self.dir.join(document.file_name())
    }
}

impl DocumentStore for FileDocumentStore {
    fn read(&self, document: Document) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_of(document)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, document: Document, bytes: &[u8]) -> io::Result<()> {
        write_bytes_to_disk(&self.path_of(document), bytes)
    }
}

fn write_bytes_to_disk(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, bytes)?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(&temp_path, path)
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<Document, Vec<u8>>>,
}

impl DocumentStore for MemoryDocumentStore {
    fn read(&self, document: Document) -> io::Result<Option<Vec<u8>>> {
        let guard = self
            .documents
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        Ok(guard.get(&document).cloned())
    }

    fn write(&self, document: Document, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        guard.insert(document, bytes.to_vec());
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRegistryEntry {
    pub id: String,
    pub name: String,
    /// Device the application was installed on; absent in older documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRegistry {
    #[serde(default)]
    pub apps: Vec<ApplicationRegistryEntry>,
}

impl ApplicationRegistry {
    pub fn name_of(&self, app_id: &str) -> Option<&str> {
        self.apps
            .iter()
            .find(|entry| entry.id == app_id)
            .map(|entry| entry.name.as_str())
    }
}

/// Saved templates, kept in append order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateRegistry {
    #[serde(default)]
    pub yamls: Vec<Value>,
}

#[derive(Clone)]
pub struct LocalRegistry {
    store: Arc<dyn DocumentStore>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl LocalRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDocumentStore::default()))
    }

    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileDocumentStore::new(dir)))
    }

    pub fn applications(&self) -> Result<ApplicationRegistry, GatewayError> {
        self.load(Document::Applications)
    }

    /// Records a freshly installed application, keyed by the manager-assigned
    /// id. An entry left behind by an earlier install with the same id is
    /// replaced. Returns `true` when the id was not known before.
    pub async fn record_application(
        &self,
        entry: ApplicationRegistryEntry,
    ) -> Result<bool, GatewayError> {
        let _write_guard = self.write_lock.lock().await;
        let mut registry: ApplicationRegistry = self.load(Document::Applications)?;
        info!(
            "{} recording application id={} name={}",
            category_registry(),
            entry.id,
            entry.name
        );
        let inserted = match registry.apps.iter_mut().find(|existing| existing.id == entry.id) {
            Some(existing) => {
                *existing = entry;
                false
            }
            None => {
                registry.apps.push(entry);
                true
            }
        };
        self.save(Document::Applications, &registry)?;
        Ok(inserted)
    }

    /// Drops entries installed on `device_id` whose id is not in `live_ids`.
    /// Entries without a recorded device are never touched.
    pub async fn prune_applications(
        &self,
        device_id: &str,
        live_ids: &HashSet<String>,
    ) -> Result<Vec<String>, GatewayError> {
        let _write_guard = self.write_lock.lock().await;
        let mut registry: ApplicationRegistry = self.load(Document::Applications)?;
        let mut pruned = Vec::new();
        registry.apps.retain(|entry| {
            let stale =
                entry.device.as_deref() == Some(device_id) && !live_ids.contains(&entry.id);
            if stale {
                pruned.push(entry.id.clone());
            }
            !stale
        });
        if !pruned.is_empty() {
            info!(
                "{} pruned {} stale application(s) for device={device_id}",
                category_registry(),
                pruned.len()
            );
            self.save(Document::Applications, &registry)?;
        }
        Ok(pruned)
    }

    pub fn templates(&self) -> Result<TemplateRegistry, GatewayError> {
        self.load(Document::Templates)
    }

    /// Appends one template and returns the new collection length.
    pub async fn append_template(&self, template: Value) -> Result<usize, GatewayError> {
        let _write_guard = self.write_lock.lock().await;
        let mut registry: TemplateRegistry = self.load(Document::Templates)?;
        registry.yamls.push(template);
        self.save(Document::Templates, &registry)?;
        info!(
            "{} saved template count={}",
            category_registry(),
            registry.yamls.len()
        );
        Ok(registry.yamls.len())
    }

    fn load<T: DeserializeOwned + Default>(&self, document: Document) -> Result<T, GatewayError> {
        let bytes = self
            .store
            .read(document)
            .map_err(|err| GatewayError::LocalStoreIo {
                document,
                reason: err.to_string(),
            })?;
        let Some(bytes) = bytes else {
            return Ok(T::default());
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::LocalStoreCorrupt {
            document,
            reason: err.to_string(),
        })
    }

    fn save<T: Serialize>(&self, document: Document, value: &T) -> Result<(), GatewayError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|err| GatewayError::LocalStoreIo {
            document,
            reason: err.to_string(),
        })?;
        self.store
            .write(document, &bytes)
            .map_err(|err| GatewayError::LocalStoreIo {
                document,
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::{SystemTime, UNIX_EPOCH},
    };

    use serde_json::json;

    static TEST_DIR_SEQUENCE: AtomicU64 = AtomicU64::new(0);

    fn unique_dir(test_name: &str) -> PathBuf {
        let seq = TEST_DIR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("sda-gateway-{test_name}-{now}-{seq}"))
    }

    fn entry(id: &str, name: &str, device: Option<&str>) -> ApplicationRegistryEntry {
        ApplicationRegistryEntry {
            id: id.to_string(),
            name: name.to_string(),
            device: device.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn templates_come_back_in_append_order() {
        let registry = LocalRegistry::in_memory();
        assert!(registry.templates().expect("empty read").yamls.is_empty());

        registry
            .append_template(json!({"name": "first", "yaml": "a: 1"}))
            .await
            .expect("append should succeed");
        let count = registry
            .append_template(json!({"name": "second", "yaml": "b: 2"}))
            .await
            .expect("append should succeed");
        assert_eq!(count, 2);

        let templates = registry.templates().expect("read should succeed");
        assert_eq!(templates.yamls[0]["name"], "first");
        assert_eq!(templates.yamls[1]["name"], "second");
    }

    #[tokio::test]
    async fn recording_a_known_id_replaces_the_entry() {
        let registry = LocalRegistry::in_memory();
        assert!(
            registry
                .record_application(entry("7", "old", Some("d1")))
                .await
                .expect("record should succeed")
        );
        assert!(
            !registry
                .record_application(entry("7", "N", Some("d2")))
                .await
                .expect("record should succeed")
        );
        let apps = registry.applications().expect("read should succeed");
        assert_eq!(apps.apps, vec![entry("7", "N", Some("d2"))]);
        assert_eq!(apps.name_of("7"), Some("N"));
        assert_eq!(apps.name_of("8"), None);

        // Retrying the same record leaves a single entry.
        registry
            .record_application(entry("7", "N", Some("d2")))
            .await
            .expect("record should succeed");
        assert_eq!(registry.applications().expect("read").apps.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_records_do_not_lose_entries() {
        let registry = LocalRegistry::in_memory();
        let mut tasks = Vec::new();
        for idx in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .record_application(entry(&idx.to_string(), "app", None))
                    .await
            }));
        }
        for task in tasks {
            task.await
                .expect("task should join")
                .expect("record should succeed");
        }
        assert_eq!(registry.applications().expect("read").apps.len(), 16);
    }

    #[tokio::test]
    async fn prune_only_touches_entries_of_the_device() {
        let registry = LocalRegistry::in_memory();
        for item in [
            entry("1", "live", Some("d1")),
            entry("2", "gone", Some("d1")),
            entry("3", "other device", Some("d2")),
            entry("4", "legacy", None),
        ] {
            registry
                .record_application(item)
                .await
                .expect("record should succeed");
        }

        let live = HashSet::from(["1".to_string()]);
        let pruned = registry
            .prune_applications("d1", &live)
            .await
            .expect("prune should succeed");
        assert_eq!(pruned, vec!["2".to_string()]);

        let ids = registry
            .applications()
            .expect("read")
            .apps
            .into_iter()
            .map(|entry| entry.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "3", "4"]);
    }

    #[test]
    fn corrupt_document_is_reported() {
        let store = Arc::new(MemoryDocumentStore::default());
        store
            .write(Document::Applications, b"{not json")
            .expect("write should succeed");
        let registry = LocalRegistry::new(store);
        let err = registry.applications().expect_err("corrupt read should fail");
        assert!(matches!(
            err,
            GatewayError::LocalStoreCorrupt {
                document: Document::Applications,
                ..
            }
        ));
        // Other documents stay readable.
        assert!(registry.templates().is_ok());
    }

    #[test]
    fn empty_document_reads_as_default() {
        let store = Arc::new(MemoryDocumentStore::default());
        store
            .write(Document::Templates, b"  \n")
            .expect("write should succeed");
        let registry = LocalRegistry::new(store);
        assert!(registry.templates().expect("read").yamls.is_empty());
    }

    #[tokio::test]
    async fn file_store_round_trips_and_reads_legacy_entries() {
        let dir = unique_dir("file-store");
        let store = FileDocumentStore::new(&dir);
        store
            .write(
                Document::Applications,
                br#"{"apps":[{"id":"1","name":"legacy"}]}"#,
            )
            .expect("write should succeed");

        let registry = LocalRegistry::on_disk(&dir);
        registry
            .record_application(entry("2", "new", Some("d1")))
            .await
            .expect("record should succeed");

        let reopened = LocalRegistry::on_disk(&dir);
        let apps = reopened.applications().expect("read should succeed");
        assert_eq!(apps.apps[0], entry("1", "legacy", None));
        assert_eq!(apps.apps[1], entry("2", "new", Some("d1")));
        assert!(!dir.join("apps.json.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
