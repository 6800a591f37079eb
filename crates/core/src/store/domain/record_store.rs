use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use super::profile::Profile;
use super::record::{ExtractionRecord, FeatureSlot};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record must contain at least one feature slot")]
    EmptyRecord,
    #[error("unknown record: {0}")]
    UnknownRecord(String),
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Storage for extraction records and the profiles built over them.
///
/// Implementations must preserve creation order in `list_unassigned` and
/// `list_all`, and must be safe to share across the capture thread and
/// on-demand clustering.
pub trait RecordStore: Send + Sync {
    /// Persist a new record. Fails with `EmptyRecord` when no slot decoded.
    fn create(
        &self,
        slots: BTreeMap<FeatureSlot, Vec<u8>>,
        location: Option<String>,
    ) -> Result<ExtractionRecord, StoreError>;

    /// Records with no profile, in creation order.
    fn list_unassigned(&self) -> Result<Vec<ExtractionRecord>, StoreError>;

    /// All records, in creation order.
    fn list_all(&self) -> Result<Vec<ExtractionRecord>, StoreError>;

    /// Records assigned to one profile, in assignment order.
    fn list_by_profile(&self, profile_id: &str) -> Result<Vec<ExtractionRecord>, StoreError>;

    /// All profiles, in creation order.
    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// Create an empty profile with the next sequential display name.
    fn create_profile(&self) -> Result<Profile, StoreError>;

    /// Attach a record to a profile. Reassignment overwrites the previous
    /// membership.
    fn assign_profile(&self, record_id: &str, profile_id: &str) -> Result<(), StoreError>;

    /// Delete all profiles and detach every record. Returns the number of
    /// profiles removed.
    fn clear_profiles(&self) -> Result<usize, StoreError>;

    /// Delete all records and profiles. Returns the number of records
    /// removed.
    fn delete_all(&self) -> Result<usize, StoreError>;
}
