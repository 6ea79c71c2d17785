//! Calibration Store
//!
//! Versioned persistence of calibration outcomes keyed by vehicle
//! identity. The map of records is JSON-serialized into a single
//! string value held by a pluggable key-value backend; a stored record
//! is usable without recalibration only when its schema version
//! matches, it is verified, and the owning spec is flagged verified.
//! Writes are last-write-wins; malformed persisted data degrades to a
//! cache miss, never an error.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::{CalibrationOverrides, MeasuredMetrics, PerformanceTarget};
use crate::config::CarSpec;

/// Bump when the record layout or the simulation semantics change in a
/// way that invalidates stored calibrations.
pub const CALIBRATION_SCHEMA_VERSION: u32 = 3;

/// Key under which the record map is stored in the backend.
const STORE_KEY: &str = "apexsim.calibration";

/// Errors from the persistence backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record map failed to serialize
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of one calibration run for one vehicle.
///
/// Created by the calibration controller, persisted by the store, and
/// never mutated afterwards except by a fresh calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Schema version the record was written under
    pub schema_version: u32,
    /// True when the run completed and met its targets
    pub verified: bool,
    /// Tuned coefficient deltas relative to the base config
    pub overrides: CalibrationOverrides,
    /// Metrics from the final measurement pass
    pub measured: MeasuredMetrics,
    /// Targets the run calibrated against
    pub target: PerformanceTarget,
    /// Correction iterations performed
    pub iterations: u32,
    /// RFC3339 creation time
    pub timestamp: String,
    /// Failure or skip note, when applicable
    pub note: Option<String>,
}

/// String key-value persistence the store runs on.
pub trait KeyValueStore {
    /// Read the value for a key, if present.
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    /// Delete a key; deleting an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

/// File-backed backend: each key becomes one JSON file in a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Backend rooted at an explicit directory, created on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default per-user data location.
    pub fn default_dir() -> io::Result<PathBuf> {
        let base = dirs::data_dir().or_else(dirs::home_dir).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Could not find data directory")
        })?;
        Ok(base.join("apexsim"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are dotted identifiers; keep the filename flat.
        self.dir.join(format!("{}.json", key.replace('/', "_")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serialized shape of the persisted record map.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    schema_version: u32,
    records: BTreeMap<String, CalibrationRecord>,
}

/// Vehicle-id → record map over a key-value backend.
#[derive(Debug)]
pub struct CalibrationStore<S: KeyValueStore> {
    backend: S,
}

impl<S: KeyValueStore> CalibrationStore<S> {
    /// Wrap a backend.
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    fn load_document(&self) -> StoreDocument {
        let Some(raw) = self.backend.get(STORE_KEY) else {
            return StoreDocument::default();
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("malformed calibration store, treating as empty: {e}");
                StoreDocument::default()
            }
        }
    }

    /// Look up the record for a vehicle id.
    pub fn get(&self, vehicle_id: &str) -> Option<CalibrationRecord> {
        self.load_document().records.get(vehicle_id).cloned()
    }

    /// Persist a record, replacing any previous one (last-write-wins).
    pub fn put(&mut self, vehicle_id: &str, record: CalibrationRecord) -> Result<(), StoreError> {
        let mut doc = self.load_document();
        doc.schema_version = CALIBRATION_SCHEMA_VERSION;
        doc.records.insert(vehicle_id.to_string(), record);
        self.backend.set(STORE_KEY, serde_json::to_string(&doc)?)
    }

    /// Drop the record for a vehicle id.
    pub fn remove(&mut self, vehicle_id: &str) -> Result<(), StoreError> {
        let mut doc = self.load_document();
        if doc.records.remove(vehicle_id).is_some() {
            self.backend.set(STORE_KEY, serde_json::to_string(&doc)?)?;
        }
        Ok(())
    }

    /// Drop everything.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.backend.remove(STORE_KEY)
    }

    /// True when the stored record for this spec can be used without
    /// recalibration: version matches, record verified, spec verified.
    pub fn is_current(&self, spec: &CarSpec) -> bool {
        if !spec.verified {
            return false;
        }
        match self.get(&spec.id) {
            Some(record) => {
                record.schema_version == CALIBRATION_SCHEMA_VERSION && record.verified
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(verified: bool) -> CalibrationRecord {
        CalibrationRecord {
            schema_version: CALIBRATION_SCHEMA_VERSION,
            verified,
            overrides: CalibrationOverrides::default(),
            measured: MeasuredMetrics::default(),
            target: PerformanceTarget::default(),
            iterations: 3,
            timestamp: Utc::now().to_rfc3339(),
            note: None,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let mut store = CalibrationStore::new(MemoryStore::new());
        store.put("gt-300", record(true)).unwrap();
        let back = store.get("gt-300").unwrap();
        assert!(back.verified);
        assert_eq!(back.iterations, 3);
        assert!(store.get("other").is_none());
    }

    #[test]
    fn last_write_wins() {
        let mut store = CalibrationStore::new(MemoryStore::new());
        store.put("gt-300", record(false)).unwrap();
        store.put("gt-300", record(true)).unwrap();
        assert!(store.get("gt-300").unwrap().verified);
    }

    #[test]
    fn malformed_backend_data_is_a_cache_miss() {
        let mut backend = MemoryStore::new();
        backend
            .set(STORE_KEY, "{not json".to_string())
            .unwrap();
        let store = CalibrationStore::new(backend);
        assert!(store.get("gt-300").is_none());
    }

    #[test]
    fn is_current_requires_all_three_flags() {
        let mut store = CalibrationStore::new(MemoryStore::new());
        let mut spec = CarSpec {
            id: "gt-300".to_string(),
            verified: true,
            ..CarSpec::default()
        };

        // No record yet.
        assert!(!store.is_current(&spec));

        // Unverified record.
        store.put("gt-300", record(false)).unwrap();
        assert!(!store.is_current(&spec));

        // Verified record, verified spec.
        store.put("gt-300", record(true)).unwrap();
        assert!(store.is_current(&spec));

        // Unmarked spec invalidates the hit.
        spec.verified = false;
        assert!(!store.is_current(&spec));

        // Stale schema version invalidates the hit.
        spec.verified = true;
        let mut stale = record(true);
        stale.schema_version = CALIBRATION_SCHEMA_VERSION - 1;
        store.put("gt-300", stale).unwrap();
        assert!(!store.is_current(&spec));
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CalibrationStore::new(FileStore::new(dir.path()));
        store.put("gt-300", record(true)).unwrap();
        assert!(store.get("gt-300").unwrap().verified);
        store.clear().unwrap();
        assert!(store.get("gt-300").is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }
}
