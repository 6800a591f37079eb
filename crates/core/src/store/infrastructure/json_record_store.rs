use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::store::domain::profile::Profile;
use crate::store::domain::record::{ExtractionRecord, FeatureSlot};
use crate::store::domain::record_store::{RecordStore, StoreError};

use super::memory_record_store::MemoryRecordStore;

const RECORDS_FILE: &str = "records.json";
const PROFILES_FILE: &str = "profiles.json";

/// Record store persisted as JSON files under a data directory.
///
/// All reads are served from an in-memory store; every mutation is written
/// through to disk before returning. Files are replaced atomically via a
/// temp file rename, so a crash mid-write leaves the previous state intact.
pub struct JsonRecordStore {
    inner: MemoryRecordStore,
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonRecordStore {
    /// Open (or initialize) a store under `dir`, loading any existing data.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let store = Self {
            inner: MemoryRecordStore::new(),
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        };

        let records = store.load_file(RECORDS_FILE)?;
        let profiles = store.load_file(PROFILES_FILE)?;
        store.inner.restore(records, profiles);
        Ok(store)
    }

    fn load_file<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let guard = match self.write_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (records, profiles) = self.inner.snapshot();
        self.write_file(RECORDS_FILE, &records)?;
        self.write_file(PROFILES_FILE, &profiles)?;
        drop(guard);
        Ok(())
    }

    fn write_file<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let io_err = |p: &PathBuf| {
            let p = p.clone();
            move |e: std::io::Error| StoreError::Io { path: p, source: e }
        };

        let bytes = serde_json::to_vec(value)?;
        fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }
}

impl RecordStore for JsonRecordStore {
    fn create(
        &self,
        slots: BTreeMap<FeatureSlot, Vec<u8>>,
        location: Option<String>,
    ) -> Result<ExtractionRecord, StoreError> {
        let record = self.inner.create(slots, location)?;
        self.persist()?;
        Ok(record)
    }

    fn list_unassigned(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        self.inner.list_unassigned()
    }

    fn list_all(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        self.inner.list_all()
    }

    fn list_by_profile(&self, profile_id: &str) -> Result<Vec<ExtractionRecord>, StoreError> {
        self.inner.list_by_profile(profile_id)
    }

    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        self.inner.list_profiles()
    }

    fn create_profile(&self) -> Result<Profile, StoreError> {
        let profile = self.inner.create_profile()?;
        self.persist()?;
        Ok(profile)
    }

    fn assign_profile(&self, record_id: &str, profile_id: &str) -> Result<(), StoreError> {
        self.inner.assign_profile(record_id, profile_id)?;
        self.persist()
    }

    fn clear_profiles(&self) -> Result<usize, StoreError> {
        let removed = self.inner.clear_profiles()?;
        self.persist()?;
        Ok(removed)
    }

    fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self.inner.delete_all()?;
        self.persist()?;
        Ok(removed)
    }
}
