use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use log::{debug, warn};

use crate::detection::domain::detection_set::Detection;
use crate::detection::domain::feature_class::FeatureClass;
use crate::detection::domain::region_detector::RegionDetector;
use crate::extraction::location_provider::{location_or_placeholder, LocationProvider};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::store::domain::record::FeatureSlot;
use crate::store::domain::record_store::RecordStore;

/// A persisted extraction plus the frame-space geometry of everything that
/// was cropped, for annotation.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record_id: String,
    pub geometry: Vec<(FeatureClass, Region)>,
}

/// Turns one top-level detection into a stored record.
///
/// The region is cropped from the frame, secondary features (face inside a
/// body, eyes and mouth inside a face) are located with a part detector,
/// and every crop that survives clamping is PNG-encoded into its slot.
pub struct RecordExtractor {
    part_detector: Box<dyn RegionDetector>,
    store: Arc<dyn RecordStore>,
    location: Box<dyn LocationProvider>,
}

impl RecordExtractor {
    pub fn new(
        part_detector: Box<dyn RegionDetector>,
        store: Arc<dyn RecordStore>,
        location: Box<dyn LocationProvider>,
    ) -> Self {
        Self {
            part_detector,
            store,
            location,
        }
    }

    /// Extract and persist one record for `top`.
    ///
    /// Returns `Ok(None)` when the detection clamps to nothing inside the
    /// frame; such detections are discarded without a record.
    pub fn extract(
        &mut self,
        frame: &Frame,
        top: &Detection,
        top_class: FeatureClass,
    ) -> Result<Option<Extraction>, Box<dyn std::error::Error>> {
        let top_region = top.region.clamped_to(frame.width(), frame.height());
        if top_region.is_empty() {
            debug!("Discarding {} detection outside the frame", top_class.name());
            return Ok(None);
        }
        let Some(top_crop) = frame.crop(&top_region) else {
            return Ok(None);
        };

        let mut slots = BTreeMap::new();
        let mut geometry = vec![(top_class, top_region)];
        slots.insert(slot_for(top_class), encode_png(&top_crop)?);

        // Locate the face: it is the top crop itself for face captures, or a
        // secondary detection inside the body for person captures.
        let face_region = match top_class {
            FeatureClass::Face => Some(top_region),
            FeatureClass::Body => {
                let face = self.best_part(frame, FeatureClass::Face, &top_region);
                if let Some(region) = face {
                    if let Some(crop) = frame.crop(&region) {
                        slots.insert(FeatureSlot::Face, encode_png(&crop)?);
                        geometry.push((FeatureClass::Face, region));
                    }
                }
                face
            }
            _ => None,
        };

        if let Some(face_region) = face_region {
            self.extract_eyes(frame, &face_region, &mut slots, &mut geometry)?;
            self.extract_mouth(frame, &face_region, &mut slots, &mut geometry)?;
        }

        let location = location_or_placeholder(self.location.as_ref());
        let record = self.store.create(slots, Some(location))?;

        Ok(Some(Extraction {
            record_id: record.id,
            geometry,
        }))
    }

    /// Highest-confidence part detection inside `search`, in frame coords,
    /// clamped. Detector failures degrade to "not found".
    fn best_part(
        &mut self,
        frame: &Frame,
        class: FeatureClass,
        search: &Region,
    ) -> Option<Region> {
        let set = match self.part_detector.detect_within(frame, class, Some(search)) {
            Ok(set) => set.into_frame_coords(),
            Err(e) => {
                warn!("{} detection failed: {e}", class.name());
                return None;
            }
        };
        best_detection(&set.detections)
            .map(|d| d.region.clamped_to(frame.width(), frame.height()))
            .filter(|r| !r.is_empty())
    }

    fn extract_eyes(
        &mut self,
        frame: &Frame,
        face_region: &Region,
        slots: &mut BTreeMap<FeatureSlot, Vec<u8>>,
        geometry: &mut Vec<(FeatureClass, Region)>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let set = match self
            .part_detector
            .detect_within(frame, FeatureClass::Eye, Some(face_region))
        {
            Ok(set) => set.into_frame_coords(),
            Err(e) => {
                warn!("eye detection failed: {e}");
                return Ok(());
            }
        };

        // The image-left eye gets the left slot, regardless of which eye it
        // anatomically is.
        let mut eyes: Vec<Region> = set
            .detections
            .iter()
            .map(|d| d.region.clamped_to(frame.width(), frame.height()))
            .filter(|r| !r.is_empty())
            .collect();
        eyes.sort_by_key(|r| r.x);
        eyes.truncate(2);

        for (region, slot) in eyes
            .iter()
            .zip([FeatureSlot::LeftEye, FeatureSlot::RightEye])
        {
            if let Some(crop) = frame.crop(region) {
                slots.insert(slot, encode_png(&crop)?);
                geometry.push((FeatureClass::Eye, *region));
            }
        }
        Ok(())
    }

    fn extract_mouth(
        &mut self,
        frame: &Frame,
        face_region: &Region,
        slots: &mut BTreeMap<FeatureSlot, Vec<u8>>,
        geometry: &mut Vec<(FeatureClass, Region)>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(region) = self.best_part(frame, FeatureClass::Mouth, face_region) {
            if let Some(crop) = frame.crop(&region) {
                slots.insert(FeatureSlot::Mouth, encode_png(&crop)?);
                geometry.push((FeatureClass::Mouth, region));
            }
        }
        Ok(())
    }
}

fn slot_for(class: FeatureClass) -> FeatureSlot {
    match class {
        FeatureClass::Body => FeatureSlot::Body,
        FeatureClass::Face => FeatureSlot::Face,
        FeatureClass::Eye => FeatureSlot::LeftEye,
        FeatureClass::Mouth => FeatureSlot::Mouth,
    }
}

fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().max_by(|a, b| {
        a.confidence
            .unwrap_or(0.0)
            .partial_cmp(&b.confidence.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// PNG-encode a frame crop.
fn encode_png(frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let img = frame
        .to_rgb_image()
        .ok_or("frame buffer does not match its dimensions")?;
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_set::DetectionSet;
    use crate::extraction::location_provider::FixedLocationProvider;
    use crate::shared::constants::PLACEHOLDER_LOCATION;
    use crate::store::infrastructure::memory_record_store::MemoryRecordStore;

    // --- Stubs ---

    /// Scripted part detector: answers each class with a fixed, crop-local
    /// detection list.
    struct ScriptedDetector {
        faces: Vec<Region>,
        eyes: Vec<Region>,
        mouths: Vec<Region>,
        fail: bool,
    }

    impl ScriptedDetector {
        fn empty() -> Self {
            Self {
                faces: Vec::new(),
                eyes: Vec::new(),
                mouths: Vec::new(),
                fail: false,
            }
        }
    }

    impl RegionDetector for ScriptedDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            class: FeatureClass,
        ) -> Result<DetectionSet, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("detector offline".into());
            }
            let regions = match class {
                FeatureClass::Face => &self.faces,
                FeatureClass::Eye => &self.eyes,
                FeatureClass::Mouth => &self.mouths,
                FeatureClass::Body => return Ok(DetectionSet::empty()),
            };
            Ok(DetectionSet::new(
                regions
                    .iter()
                    .enumerate()
                    .map(|(i, r)| Detection::with_confidence(*r, 0.9 - i as f32 * 0.1))
                    .collect(),
            ))
        }
    }

    struct FailingLocation;

    impl LocationProvider for FailingLocation {
        fn current_location(&self) -> Result<String, Box<dyn std::error::Error>> {
            Err("gps offline".into())
        }
    }

    fn gradient_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.push((x * 3 % 256) as u8);
                data.push((y * 5 % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        Frame::new(data, w, h, 3, 0)
    }

    fn extractor(
        detector: ScriptedDetector,
        store: Arc<MemoryRecordStore>,
    ) -> RecordExtractor {
        RecordExtractor::new(
            Box::new(detector),
            store,
            Box::new(FixedLocationProvider::new("10.0,20.0")),
        )
    }

    #[test]
    fn test_face_capture_creates_face_record() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut ex = extractor(ScriptedDetector::empty(), store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::with_confidence(Region::new(8, 8, 32, 32), 0.9);

        let result = ex.extract(&frame, &top, FeatureClass::Face).unwrap();
        let extraction = result.unwrap();

        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, extraction.record_id);
        assert!(records[0].slot(FeatureSlot::Face).is_some());
        assert_eq!(records[0].location.as_deref(), Some("10.0,20.0"));
    }

    #[test]
    fn test_detection_outside_frame_is_discarded() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut ex = extractor(ScriptedDetector::empty(), store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::new(Region::new(100, 100, 32, 32));

        let result = ex.extract(&frame, &top, FeatureClass::Face).unwrap();
        assert!(result.is_none());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_body_capture_extracts_face_within() {
        let store = Arc::new(MemoryRecordStore::new());
        // Face is crop-local to the body search region
        let detector = ScriptedDetector {
            faces: vec![Region::new(4, 2, 16, 16)],
            ..ScriptedDetector::empty()
        };
        let mut ex = extractor(detector, store.clone());
        let frame = gradient_frame(80, 80);
        let top = Detection::with_confidence(Region::new(10, 10, 40, 60), 0.8);

        let extraction = ex.extract(&frame, &top, FeatureClass::Body).unwrap().unwrap();

        let records = store.list_all().unwrap();
        assert!(records[0].slot(FeatureSlot::Body).is_some());
        assert!(records[0].slot(FeatureSlot::Face).is_some());

        // Face geometry is in frame coordinates, not crop-local
        let face_geom = extraction
            .geometry
            .iter()
            .find(|(c, _)| *c == FeatureClass::Face)
            .map(|(_, r)| *r)
            .unwrap();
        assert_eq!(face_geom, Region::new(14, 12, 16, 16));
    }

    #[test]
    fn test_eyes_assigned_by_x_order() {
        let store = Arc::new(MemoryRecordStore::new());
        // Eyes listed right-first; slots must still follow x order
        let detector = ScriptedDetector {
            eyes: vec![Region::new(20, 4, 6, 6), Region::new(4, 4, 6, 6)],
            ..ScriptedDetector::empty()
        };
        let mut ex = extractor(detector, store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::with_confidence(Region::new(8, 8, 32, 32), 0.9);

        ex.extract(&frame, &top, FeatureClass::Face).unwrap().unwrap();

        let records = store.list_all().unwrap();
        assert!(records[0].slot(FeatureSlot::LeftEye).is_some());
        assert!(records[0].slot(FeatureSlot::RightEye).is_some());
        // Left eye crop (6x6) and right eye crop (6x6) come from different
        // frame areas, so their encodings differ on a gradient frame
        assert_ne!(
            records[0].slot(FeatureSlot::LeftEye),
            records[0].slot(FeatureSlot::RightEye)
        );
    }

    #[test]
    fn test_leftmost_two_of_three_eye_candidates_kept() {
        let store = Arc::new(MemoryRecordStore::new());
        // Three crop-local candidates out of x order; the two leftmost in
        // frame space fill the slots, the rightmost is dropped
        let detector = ScriptedDetector {
            eyes: vec![
                Region::new(22, 4, 6, 6),
                Region::new(2, 4, 6, 6),
                Region::new(12, 4, 6, 6),
            ],
            ..ScriptedDetector::empty()
        };
        let mut ex = extractor(detector, store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::with_confidence(Region::new(8, 8, 32, 32), 0.9);

        let extraction = ex.extract(&frame, &top, FeatureClass::Face).unwrap().unwrap();

        let mut eye_xs: Vec<i32> = extraction
            .geometry
            .iter()
            .filter(|(c, _)| *c == FeatureClass::Eye)
            .map(|(_, r)| r.x)
            .collect();
        eye_xs.sort_unstable();
        assert_eq!(eye_xs, vec![10, 20]);

        let records = store.list_all().unwrap();
        assert!(records[0].slot(FeatureSlot::LeftEye).is_some());
        assert!(records[0].slot(FeatureSlot::RightEye).is_some());
    }

    #[test]
    fn test_single_eye_takes_left_slot() {
        let store = Arc::new(MemoryRecordStore::new());
        let detector = ScriptedDetector {
            eyes: vec![Region::new(20, 4, 6, 6)],
            ..ScriptedDetector::empty()
        };
        let mut ex = extractor(detector, store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::new(Region::new(8, 8, 32, 32));

        ex.extract(&frame, &top, FeatureClass::Face).unwrap().unwrap();

        let records = store.list_all().unwrap();
        assert!(records[0].slot(FeatureSlot::LeftEye).is_some());
        assert!(records[0].slot(FeatureSlot::RightEye).is_none());
    }

    #[test]
    fn test_mouth_slot_filled() {
        let store = Arc::new(MemoryRecordStore::new());
        let detector = ScriptedDetector {
            mouths: vec![Region::new(10, 24, 12, 6)],
            ..ScriptedDetector::empty()
        };
        let mut ex = extractor(detector, store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::new(Region::new(8, 8, 32, 32));

        ex.extract(&frame, &top, FeatureClass::Face).unwrap().unwrap();
        let records = store.list_all().unwrap();
        assert!(records[0].slot(FeatureSlot::Mouth).is_some());
    }

    #[test]
    fn test_part_detector_failure_still_creates_record() {
        let store = Arc::new(MemoryRecordStore::new());
        let detector = ScriptedDetector {
            fail: true,
            ..ScriptedDetector::empty()
        };
        let mut ex = extractor(detector, store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::new(Region::new(8, 8, 32, 32));

        let extraction = ex.extract(&frame, &top, FeatureClass::Face).unwrap();
        assert!(extraction.is_some());
        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slots.len(), 1);
    }

    #[test]
    fn test_location_failure_uses_placeholder() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut ex = RecordExtractor::new(
            Box::new(ScriptedDetector::empty()),
            store.clone(),
            Box::new(FailingLocation),
        );
        let frame = gradient_frame(64, 64);
        let top = Detection::new(Region::new(8, 8, 32, 32));

        ex.extract(&frame, &top, FeatureClass::Face).unwrap().unwrap();
        let records = store.list_all().unwrap();
        assert_eq!(records[0].location.as_deref(), Some(PLACEHOLDER_LOCATION));
    }

    #[test]
    fn test_stored_face_slot_is_png() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut ex = extractor(ScriptedDetector::empty(), store.clone());
        let frame = gradient_frame(64, 64);
        let top = Detection::new(Region::new(0, 0, 16, 16));

        ex.extract(&frame, &top, FeatureClass::Face).unwrap().unwrap();
        let records = store.list_all().unwrap();
        let bytes = records[0].slot(FeatureSlot::Face).unwrap();
        let img = image::load_from_memory(bytes).unwrap();
        assert_eq!(img.width(), 16);
        assert_eq!(img.height(), 16);
    }
}
