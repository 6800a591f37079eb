use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::domain::profile::Profile;
use crate::store::domain::record::{ExtractionRecord, FeatureSlot};
use crate::store::domain::record_store::{RecordStore, StoreError};

/// In-memory record store guarded by a single mutex.
///
/// Every trait method is one critical section, so observers never see a
/// record attached to a profile that doesn't list it.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Vec<ExtractionRecord>,
    profiles: Vec<Profile>,
    next_profile_seq: u64,
    last_ts: u64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the full store contents, for persistence backends.
    pub fn snapshot(&self) -> (Vec<ExtractionRecord>, Vec<Profile>) {
        let inner = self.lock();
        (inner.records.clone(), inner.profiles.clone())
    }

    /// Replace the store contents, re-deriving the profile name sequence and
    /// the timestamp floor from the loaded data.
    pub fn restore(&self, records: Vec<ExtractionRecord>, profiles: Vec<Profile>) {
        let mut inner = self.lock();
        inner.last_ts = records.iter().map(|r| r.created_at_ms).max().unwrap_or(0);
        inner.next_profile_seq = profiles
            .iter()
            .filter_map(|p| profile_sequence(&p.name))
            .max()
            .unwrap_or(0);
        inner.records = records;
        inner.profiles = profiles;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-update; the data itself is still
        // a consistent snapshot of completed operations.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Inner {
    fn record_mut(&mut self, record_id: &str) -> Result<&mut ExtractionRecord, StoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| StoreError::UnknownRecord(record_id.to_string()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(
        &self,
        slots: BTreeMap<FeatureSlot, Vec<u8>>,
        location: Option<String>,
    ) -> Result<ExtractionRecord, StoreError> {
        if slots.is_empty() {
            return Err(StoreError::EmptyRecord);
        }

        let mut inner = self.lock();

        // Wall clock can step backwards; clamp so creation order and
        // timestamp order never disagree.
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let ts = now.max(inner.last_ts);
        inner.last_ts = ts;

        let record = ExtractionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at_ms: ts,
            slots,
            location,
            profile_id: None,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    fn list_unassigned(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.profile_id.is_none())
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        Ok(self.lock().records.clone())
    }

    fn list_by_profile(&self, profile_id: &str) -> Result<Vec<ExtractionRecord>, StoreError> {
        let inner = self.lock();
        let profile = inner
            .profiles
            .iter()
            .find(|p| p.id == profile_id)
            .ok_or_else(|| StoreError::UnknownProfile(profile_id.to_string()))?;

        Ok(profile
            .record_ids
            .iter()
            .filter_map(|id| inner.records.iter().find(|r| &r.id == id))
            .cloned()
            .collect())
    }

    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.lock().profiles.clone())
    }

    fn create_profile(&self) -> Result<Profile, StoreError> {
        let mut inner = self.lock();
        inner.next_profile_seq += 1;
        let profile = Profile {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("Person {}", inner.next_profile_seq),
            record_ids: Vec::new(),
        };
        inner.profiles.push(profile.clone());
        Ok(profile)
    }

    fn assign_profile(&self, record_id: &str, profile_id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();

        if !inner.profiles.iter().any(|p| p.id == profile_id) {
            return Err(StoreError::UnknownProfile(profile_id.to_string()));
        }

        let previous = {
            let record = inner.record_mut(record_id)?;
            record.profile_id.replace(profile_id.to_string())
        };

        if let Some(old_id) = previous {
            if let Some(old) = inner.profiles.iter_mut().find(|p| p.id == old_id) {
                old.record_ids.retain(|id| id != record_id);
            }
        }

        if let Some(profile) = inner.profiles.iter_mut().find(|p| p.id == profile_id) {
            if !profile.record_ids.iter().any(|id| id == record_id) {
                profile.record_ids.push(record_id.to_string());
            }
        }
        Ok(())
    }

    fn clear_profiles(&self) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let removed = inner.profiles.len();
        inner.profiles.clear();
        inner.next_profile_seq = 0;
        for record in &mut inner.records {
            record.profile_id = None;
        }
        Ok(removed)
    }

    fn delete_all(&self) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let removed = inner.records.len();
        inner.records.clear();
        inner.profiles.clear();
        inner.next_profile_seq = 0;
        Ok(removed)
    }
}

/// Parse the sequence number out of a "Person N" display name.
fn profile_sequence(name: &str) -> Option<u64> {
    name.strip_prefix("Person ")?.parse().ok()
}
