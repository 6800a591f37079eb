use serde::{Deserialize, Serialize};

/// A cluster of records judged to show the same person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Display name, assigned sequentially ("Person 1", "Person 2", ...).
    pub name: String,
    /// Record ids in assignment order.
    pub record_ids: Vec<String>,
}

impl Profile {
    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }
}
