//! Persisted host-key trust store.
//!
//! The store is a dictionary of one record per (host, port) pair, host
//! compared case-insensitively. Persistence goes through the [`TrustBackend`]
//! trait; the crate ships a JSON file backend with atomic writes and an
//! in-memory backend for tests and headless embedding.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::write_atomic;
use crate::error::TrustStoreError;

/// One remembered host key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostKeyRecord {
    pub host: String,
    pub port: u16,
    /// Canonical `SHA256:` fingerprint
    pub fingerprint: String,
    /// Legacy MD5 fingerprint, display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_fingerprint: Option<String>,
    pub key_type: String,
    pub algorithm: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Storage collaborator for the trust store
pub trait TrustBackend: Send + Sync {
    fn load(&self) -> Result<Vec<HostKeyRecord>, TrustStoreError>;
    fn save(&self, records: &[HostKeyRecord]) -> Result<(), TrustStoreError>;
}

/// JSON file persistence with atomic replace-on-write
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TrustBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<HostKeyRecord>, TrustStoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| TrustStoreError::ReadFile {
                path: self.path.clone(),
                source,
            })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, records: &[HostKeyRecord]) -> Result<(), TrustStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TrustStoreError::WriteFile {
                path: self.path.clone(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(records)?;
        write_atomic(&self.path, &content).map_err(|source| TrustStoreError::WriteFile {
            path: self.path.clone(),
            source,
        })
    }
}

/// Volatile backend for tests and embedders that persist elsewhere
#[derive(Default)]
pub struct MemoryBackend {
    records: std::sync::Mutex<Vec<HostKeyRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<HostKeyRecord>, TrustStoreError> {
        // A poisoned lock still holds valid records, keep serving them
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.clone())
    }

    fn save(&self, records: &[HostKeyRecord]) -> Result<(), TrustStoreError> {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records.to_vec();
        Ok(())
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().to_ascii_lowercase()
}

/// Dictionary of trusted host keys, keyed by normalized (host, port)
pub struct TrustStore {
    records: HashMap<(String, u16), HostKeyRecord>,
    backend: Box<dyn TrustBackend>,
}

impl TrustStore {
    /// Load all records from the backend
    pub fn load(backend: Box<dyn TrustBackend>) -> Result<Self, TrustStoreError> {
        let mut records = HashMap::new();
        for record in backend.load()? {
            let key = (normalize_host(&record.host), record.port);
            records.insert(key, record);
        }
        Ok(Self { records, backend })
    }

    /// Open the default on-disk store under the config directory
    pub fn open_default() -> Result<Self, TrustStoreError> {
        let path = crate::config::paths::trust_store_file().ok_or_else(|| {
            TrustStoreError::ReadFile {
                path: PathBuf::from("trusted_hosts.json"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "could not determine config directory",
                ),
            }
        })?;
        Self::load(Box::new(JsonFileBackend::new(path)))
    }

    pub fn get(&self, host: &str, port: u16) -> Option<&HostKeyRecord> {
        self.records.get(&(normalize_host(host), port))
    }

    /// Insert or overwrite the record for its (host, port) pair
    pub fn upsert(&mut self, record: HostKeyRecord) -> Result<(), TrustStoreError> {
        let key = (normalize_host(&record.host), record.port);
        self.records.insert(key, record);
        self.persist()
    }

    /// Cheap path for the frequent matched case: bump last_seen only
    pub fn touch_last_seen(&mut self, host: &str, port: u16) -> Result<(), TrustStoreError> {
        let key = (normalize_host(host), port);
        if let Some(record) = self.records.get_mut(&key) {
            record.last_seen = Utc::now();
            self.persist()?;
        }
        Ok(())
    }

    /// Remove one record; returns whether it existed
    pub fn remove(&mut self, host: &str, port: u16) -> Result<bool, TrustStoreError> {
        let removed = self.records.remove(&(normalize_host(host), port)).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Remove every record
    pub fn clear(&mut self) -> Result<(), TrustStoreError> {
        self.records.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &HostKeyRecord> {
        self.records.values()
    }

    fn persist(&self) -> Result<(), TrustStoreError> {
        let mut records: Vec<HostKeyRecord> = self.records.values().cloned().collect();
        // Stable file ordering keeps diffs readable
        records.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        self.backend.save(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(host: &str, port: u16, fingerprint: &str) -> HostKeyRecord {
        let now = Utc::now();
        HostKeyRecord {
            host: host.to_string(),
            port,
            fingerprint: fingerprint.to_string(),
            legacy_fingerprint: Some("aa:bb:cc".to_string()),
            key_type: "ED25519".to_string(),
            algorithm: "ssh-ed25519".to_string(),
            first_seen: now,
            last_seen: now,
        }
    }

    fn memory_store() -> TrustStore {
        TrustStore::load(Box::new(MemoryBackend::new())).expect("load")
    }

    #[test]
    fn memory_backend_survives_a_poisoned_lock() {
        let backend = std::sync::Arc::new(MemoryBackend::new());
        backend
            .save(&[record("example.com", 22, "SHA256:abc")])
            .expect("save");

        // Poison the lock from a panicking thread
        let poisoner = backend.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.records.lock().unwrap();
            panic!("poison the backend lock");
        })
        .join();

        assert_eq!(backend.load().expect("load").len(), 1);
        backend
            .save(&[
                record("example.com", 22, "SHA256:abc"),
                record("other.example", 22, "SHA256:def"),
            ])
            .expect("save after poison");
        assert_eq!(backend.load().expect("load").len(), 2);
    }

    #[test]
    fn empty_store_has_no_records() {
        let store = memory_store();
        assert!(store.is_empty());
        assert!(store.get("example.com", 22).is_none());
    }

    #[test]
    fn upsert_then_get_roundtrip() {
        let mut store = memory_store();
        store
            .upsert(record("example.com", 22, "SHA256:abc"))
            .expect("upsert");
        let found = store.get("example.com", 22).expect("record");
        assert_eq!(found.fingerprint, "SHA256:abc");
    }

    #[test]
    fn host_lookup_is_case_insensitive() {
        let mut store = memory_store();
        store
            .upsert(record("Example.COM", 22, "SHA256:abc"))
            .expect("upsert");
        assert!(store.get("example.com", 22).is_some());
        assert!(store.get("EXAMPLE.com", 22).is_some());
    }

    #[test]
    fn port_is_matched_exactly() {
        let mut store = memory_store();
        store
            .upsert(record("example.com", 22, "SHA256:abc"))
            .expect("upsert");
        assert!(store.get("example.com", 2222).is_none());
    }

    #[test]
    fn repeated_upsert_never_duplicates() {
        let mut store = memory_store();
        for i in 0..10 {
            store
                .upsert(record("example.com", 22, &format!("SHA256:v{}", i)))
                .expect("upsert");
        }
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("example.com", 22).unwrap().fingerprint,
            "SHA256:v9"
        );
    }

    #[test]
    fn case_variants_of_host_collapse_to_one_record() {
        let mut store = memory_store();
        store
            .upsert(record("example.com", 22, "SHA256:a"))
            .expect("upsert");
        store
            .upsert(record("EXAMPLE.COM", 22, "SHA256:b"))
            .expect("upsert");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("example.com", 22).unwrap().fingerprint, "SHA256:b");
    }

    #[test]
    fn touch_last_seen_only_bumps_timestamp() {
        let mut store = memory_store();
        let mut rec = record("example.com", 22, "SHA256:abc");
        rec.last_seen = rec.last_seen - chrono::Duration::hours(1);
        let old_first = rec.first_seen;
        let old_last = rec.last_seen;
        store.upsert(rec).expect("upsert");

        store.touch_last_seen("example.com", 22).expect("touch");

        let found = store.get("example.com", 22).expect("record");
        assert_eq!(found.first_seen, old_first);
        assert!(found.last_seen > old_last);
        assert_eq!(found.fingerprint, "SHA256:abc");
    }

    #[test]
    fn touch_last_seen_on_missing_record_is_noop() {
        let mut store = memory_store();
        store.touch_last_seen("missing.example", 22).expect("touch");
        assert!(store.is_empty());
    }

    #[test]
    fn remove_returns_whether_record_existed() {
        let mut store = memory_store();
        store
            .upsert(record("example.com", 22, "SHA256:abc"))
            .expect("upsert");
        assert!(store.remove("EXAMPLE.com", 22).expect("remove"));
        assert!(!store.remove("example.com", 22).expect("remove again"));
    }

    #[test]
    fn clear_removes_everything() {
        let mut store = memory_store();
        store
            .upsert(record("a.example", 22, "SHA256:a"))
            .expect("upsert");
        store
            .upsert(record("b.example", 2222, "SHA256:b"))
            .expect("upsert");
        store.clear().expect("clear");
        assert!(store.is_empty());
    }

    #[test]
    fn json_backend_roundtrips_records() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("trusted_hosts.json");

        {
            let backend = Box::new(JsonFileBackend::new(path.clone()));
            let mut store = TrustStore::load(backend).expect("load empty");
            store
                .upsert(record("example.com", 22, "SHA256:abc"))
                .expect("upsert");
        }

        let backend = Box::new(JsonFileBackend::new(path));
        let store = TrustStore::load(backend).expect("reload");
        assert_eq!(store.len(), 1);
        let found = store.get("example.com", 22).expect("record");
        assert_eq!(found.fingerprint, "SHA256:abc");
        assert_eq!(found.legacy_fingerprint.as_deref(), Some("aa:bb:cc"));
    }

    #[test]
    fn json_backend_tolerates_missing_file() {
        let dir = tempdir().expect("temp dir");
        let backend = JsonFileBackend::new(dir.path().join("absent.json"));
        assert!(backend.load().expect("load").is_empty());
    }

    #[test]
    fn json_backend_tolerates_empty_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("trusted_hosts.json");
        std::fs::write(&path, "").expect("write");
        let backend = JsonFileBackend::new(path);
        assert!(backend.load().expect("load").is_empty());
    }

    #[test]
    fn json_backend_rejects_corrupt_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("trusted_hosts.json");
        std::fs::write(&path, "not json at all").expect("write");
        let backend = JsonFileBackend::new(path);
        assert!(matches!(backend.load(), Err(TrustStoreError::Parse(_))));
    }

    #[test]
    fn record_without_legacy_fingerprint_parses() {
        let json = r#"[{
            "host": "example.com",
            "port": 22,
            "fingerprint": "SHA256:abc",
            "key_type": "ED25519",
            "algorithm": "ssh-ed25519",
            "first_seen": "2026-01-01T00:00:00Z",
            "last_seen": "2026-01-02T00:00:00Z"
        }]"#;
        let records: Vec<HostKeyRecord> = serde_json::from_str(json).expect("parse");
        assert_eq!(records.len(), 1);
        assert!(records[0].legacy_fingerprint.is_none());
    }
}
