use std::sync::Arc;

use log::{debug, warn};

use crate::grouping::domain::similarity_scorer::SimilarityScorer;
use crate::shared::frame::Frame;
use crate::store::domain::record::{ExtractionRecord, FeatureSlot};
use crate::store::domain::record_store::RecordStore;

/// What one clustering pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterReport {
    pub records_considered: usize,
    pub profiles_created: usize,
    pub records_assigned: usize,
}

/// Use case: group unassigned records into profiles by face similarity.
///
/// The pass walks a creation-order snapshot of unassigned records. Each
/// still-unassigned record founds a new profile and claims every later
/// record whose face scores above the threshold against the founder's face.
/// Claimed records are never revisited, so membership depends on capture
/// order and is deliberately not a transitive closure: a record similar to
/// a claimed member but not to the founder starts its own profile.
///
/// Every assignment is persisted as it happens; interrupting a pass leaves
/// the completed profiles behind, and the next pass continues with whatever
/// is still unassigned.
pub struct ClusterProfilesUseCase {
    store: Arc<dyn RecordStore>,
    scorer: Box<dyn SimilarityScorer>,
}

impl ClusterProfilesUseCase {
    pub fn new(store: Arc<dyn RecordStore>, scorer: Box<dyn SimilarityScorer>) -> Self {
        Self { store, scorer }
    }

    pub fn execute(&self, threshold: f64) -> Result<ClusterReport, Box<dyn std::error::Error>> {
        let snapshot = self.store.list_unassigned()?;
        let faces: Vec<Option<Frame>> = snapshot.iter().map(decode_face).collect();

        let mut assigned = vec![false; snapshot.len()];
        let mut profiles_created = 0usize;
        let mut records_assigned = 0usize;

        for i in 0..snapshot.len() {
            if assigned[i] {
                continue;
            }

            let profile = self.store.create_profile()?;
            self.store.assign_profile(&snapshot[i].id, &profile.id)?;
            assigned[i] = true;
            profiles_created += 1;
            records_assigned += 1;

            // A record without a usable face can't be compared, so its
            // profile stays a singleton.
            let Some(founder_face) = &faces[i] else {
                continue;
            };

            for j in (i + 1)..snapshot.len() {
                if assigned[j] {
                    continue;
                }
                let Some(candidate_face) = &faces[j] else {
                    continue;
                };
                let score = self.scorer.score(founder_face, candidate_face);
                if score > threshold {
                    debug!(
                        "Record {} joins {} (score {score:.3})",
                        snapshot[j].id, profile.name
                    );
                    self.store.assign_profile(&snapshot[j].id, &profile.id)?;
                    assigned[j] = true;
                    records_assigned += 1;
                }
            }
        }

        Ok(ClusterReport {
            records_considered: snapshot.len(),
            profiles_created,
            records_assigned,
        })
    }
}

/// Decode a record's face slot into a frame, if present and readable.
fn decode_face(record: &ExtractionRecord) -> Option<Frame> {
    let bytes = record.slot(FeatureSlot::Face)?;
    match image::load_from_memory(bytes) {
        Ok(img) => Some(Frame::from_rgb_image(&img.to_rgb8(), 0)),
        Err(e) => {
            warn!("Record {} has an undecodable face image: {e}", record.id);
            None
        }
    }
}
