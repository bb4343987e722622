//! Persisted host records.
//!
//! A record carries everything needed to rebuild a [`Host`]: its options,
//! the driver family name and the driver's raw blob. The driver itself is
//! resolved again on every load.

use crate::error::{Error, Result};
use crate::host::{validate_host_name, Host, HostOptions};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File holding a host record inside its machine directory.
pub const CONFIG_FILE: &str = "config.json";

/// On-disk form of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Record layout version.
    pub config_version: u32,
    /// Machine name.
    pub name: String,
    /// Driver family name.
    pub driver_name: String,
    /// Creation options.
    #[serde(default)]
    pub host_options: HostOptions,
    /// Opaque driver blob.
    #[serde(
        serialize_with = "serialize_raw",
        deserialize_with = "deserialize_raw",
        default
    )]
    pub raw_driver: Vec<u8>,
}

impl HostRecord {
    /// Snapshot `host`, asking its driver for a fresh raw blob.
    pub fn from_host(host: &Host) -> Result<Self> {
        Ok(Self {
            config_version: host.config_version,
            name: host.name.clone(),
            driver_name: host.driver_name.clone(),
            host_options: host.host_options.clone(),
            raw_driver: host.driver.raw_config()?,
        })
    }
}

fn serialize_raw<S: Serializer>(raw: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&BASE64.encode(raw))
}

fn deserialize_raw<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(d)?;
    BASE64.decode(encoded).map_err(serde::de::Error::custom)
}

/// Host persistence.
pub trait Store: Send + Sync {
    /// Check whether a host named `name` is stored.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Load a record. Missing hosts are [`Error::HostDoesNotExist`].
    fn load(&self, name: &str) -> Result<HostRecord>;

    /// Create or replace a record.
    fn save(&self, record: &HostRecord) -> Result<()>;

    /// Delete a record and any local state kept with it.
    fn remove(&self, name: &str) -> Result<()>;

    /// Names of every stored host, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// Records stored as `<machines>/<name>/config.json`.
#[derive(Debug, Clone)]
pub struct Filestore {
    machines_dir: PathBuf,
}

impl Filestore {
    /// Store rooted at `machines_dir`.
    pub fn new(machines_dir: impl Into<PathBuf>) -> Self {
        Self {
            machines_dir: machines_dir.into(),
        }
    }

    /// Directory holding all machine directories.
    pub fn machines_dir(&self) -> &Path {
        &self.machines_dir
    }

    /// Directory of the machine `name`. Names outside the host name
    /// grammar never map to a path.
    fn machine_dir(&self, name: &str) -> Result<PathBuf> {
        if !validate_host_name(name) {
            return Err(Error::InvalidHostName(name.to_string()));
        }
        Ok(self.machines_dir.join(name))
    }

    fn config_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.machine_dir(name)?.join(CONFIG_FILE))
    }
}

impl Store for Filestore {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.config_path(name)?.is_file())
    }

    fn load(&self, name: &str) -> Result<HostRecord> {
        let path = self.config_path(name)?;
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::HostDoesNotExist(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content)
            .map_err(|e| Error::store(format!("{}: {}", path.display(), e)))
    }

    fn save(&self, record: &HostRecord) -> Result<()> {
        let dir = self.machine_dir(&record.name)?;
        std::fs::create_dir_all(&dir)?;

        let content = serde_json::to_vec_pretty(record)?;
        let tmp = dir.join(format!("{}.tmp", CONFIG_FILE));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, dir.join(CONFIG_FILE))?;

        tracing::debug!(machine = %record.name, path = %dir.display(), "saved host");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let dir = self.machine_dir(name)?;
        if !dir.exists() {
            return Err(Error::HostDoesNotExist(name.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;
        tracing::debug!(machine = %name, "removed host directory");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.machines_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().join(CONFIG_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, HostRecord>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.records.lock().contains_key(name))
    }

    fn load(&self, name: &str) -> Result<HostRecord> {
        self.records
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::HostDoesNotExist(name.to_string()))
    }

    fn save(&self, record: &HostRecord) -> Result<()> {
        self.records
            .lock()
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.records
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::HostDoesNotExist(name.to_string()))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CONFIG_VERSION;
    use tempfile::TempDir;

    fn record(name: &str) -> HostRecord {
        HostRecord {
            config_version: CONFIG_VERSION,
            name: name.to_string(),
            driver_name: "virtualbox".to_string(),
            host_options: HostOptions {
                driver: "virtualbox".to_string(),
                memory_mb: 1024,
                ..HostOptions::default()
            },
            raw_driver: br#"{"machine_name":"x"}"#.to_vec(),
        }
    }

    #[test]
    fn test_filestore_save_load_list_remove() {
        let tmp = TempDir::new().unwrap();
        let store = Filestore::new(tmp.path().join("machines"));

        assert!(store.list().unwrap().is_empty());
        assert!(!store.exists("b").unwrap());

        store.save(&record("b")).unwrap();
        store.save(&record("a")).unwrap();

        assert!(store.exists("b").unwrap());
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
        assert_eq!(store.load("b").unwrap(), record("b"));

        store.remove("b").unwrap();
        assert!(!store.exists("b").unwrap());
        assert_eq!(store.list().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_filestore_missing_host() {
        let tmp = TempDir::new().unwrap();
        let store = Filestore::new(tmp.path());

        assert!(matches!(store.load("ghost"), Err(Error::HostDoesNotExist(_))));
        assert!(matches!(store.remove("ghost"), Err(Error::HostDoesNotExist(_))));
    }

    #[test]
    fn test_filestore_rejects_names_outside_grammar() {
        let tmp = TempDir::new().unwrap();
        let machines = tmp.path().join("machines");
        let store = Filestore::new(&machines);
        store.save(&record("dev")).unwrap();
        std::fs::create_dir_all(tmp.path().join("certs")).unwrap();

        for name in ["..", "", ".", "../certs", "dev/.."] {
            assert!(matches!(store.remove(name), Err(Error::InvalidHostName(_))));
            assert!(matches!(store.load(name), Err(Error::InvalidHostName(_))));
            assert!(matches!(store.exists(name), Err(Error::InvalidHostName(_))));
        }
        assert!(matches!(
            store.save(&record("../escape")),
            Err(Error::InvalidHostName(_))
        ));

        assert!(tmp.path().join("certs").is_dir());
        assert!(store.exists("dev").unwrap());
    }

    #[test]
    fn test_filestore_corrupt_record() {
        let tmp = TempDir::new().unwrap();
        let store = Filestore::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("bad")).unwrap();
        std::fs::write(tmp.path().join("bad").join(CONFIG_FILE), "{").unwrap();

        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_raw_driver_is_opaque() {
        let mut rec = record("dev");
        rec.raw_driver = vec![0, 159, 146, 150];

        let json = serde_json::to_string(&rec).unwrap();
        let back: HostRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.raw_driver, vec![0, 159, 146, 150]);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.save(&record("dev")).unwrap();
        assert!(store.exists("dev").unwrap());
        store.remove("dev").unwrap();
        assert!(matches!(store.load("dev"), Err(Error::HostDoesNotExist(_))));
    }
}
