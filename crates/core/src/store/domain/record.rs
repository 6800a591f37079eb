use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named slot for one encoded feature crop in a record.
///
/// A record holds at most one image per slot; eyes are split into left and
/// right by their x position in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSlot {
    Body,
    Face,
    LeftEye,
    RightEye,
    Mouth,
}

impl FeatureSlot {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureSlot::Body => "body",
            FeatureSlot::Face => "face",
            FeatureSlot::LeftEye => "left_eye",
            FeatureSlot::RightEye => "right_eye",
            FeatureSlot::Mouth => "mouth",
        }
    }
}

/// One captured observation: encoded feature crops plus capture metadata.
///
/// Slot images are PNG-encoded bytes. `profile_id` is `None` until the
/// record is claimed by a clustering pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: String,
    pub created_at_ms: u64,
    pub slots: BTreeMap<FeatureSlot, Vec<u8>>,
    pub location: Option<String>,
    pub profile_id: Option<String>,
}

impl ExtractionRecord {
    pub fn slot(&self, slot: FeatureSlot) -> Option<&[u8]> {
        self.slots.get(&slot).map(|v| v.as_slice())
    }

    pub fn is_assigned(&self) -> bool {
        self.profile_id.is_some()
    }
}
