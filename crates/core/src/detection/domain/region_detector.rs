use crate::detection::domain::detection_set::DetectionSet;
use crate::detection::domain::feature_class::FeatureClass;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for region detection, polymorphic over backend.
///
/// Implementations may be stateful (sessions, caches), hence `&mut self`.
/// A backend asked for a class it does not support returns an empty set.
pub trait RegionDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        class: FeatureClass,
    ) -> Result<DetectionSet, Box<dyn std::error::Error>>;

    /// Runs detection constrained to `search`, when given.
    ///
    /// The returned set carries the clamped crop origin as its offset, so
    /// the caller composes coordinates with [`DetectionSet::into_frame_coords`]
    /// before persisting or drawing anything. An empty search intersection
    /// yields an empty set.
    fn detect_within(
        &mut self,
        frame: &Frame,
        class: FeatureClass,
        search: Option<&Region>,
    ) -> Result<DetectionSet, Box<dyn std::error::Error>> {
        let Some(search) = search else {
            return self.detect(frame, class);
        };
        let clamped = search.clamped_to(frame.width(), frame.height());
        let Some(crop) = frame.crop(&clamped) else {
            return Ok(DetectionSet::empty());
        };
        let set = self.detect(&crop, class)?;
        Ok(DetectionSet::with_offset(
            set.detections,
            (clamped.x, clamped.y),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_set::Detection;

    /// Reports one fixed region anywhere it is asked to look.
    struct FixedDetector {
        region: Region,
        seen_sizes: Vec<(u32, u32)>,
    }

    impl RegionDetector for FixedDetector {
        fn detect(
            &mut self,
            frame: &Frame,
            _class: FeatureClass,
        ) -> Result<DetectionSet, Box<dyn std::error::Error>> {
            self.seen_sizes.push((frame.width(), frame.height()));
            Ok(DetectionSet::new(vec![Detection::new(self.region)]))
        }
    }

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![10u8; (w * h * 3) as usize], w, h, 3, 0)
    }

    #[test]
    fn test_detect_within_none_delegates() {
        let mut det = FixedDetector {
            region: Region::new(1, 1, 4, 4),
            seen_sizes: Vec::new(),
        };
        let set = det.detect_within(&frame(20, 20), FeatureClass::Face, None).unwrap();
        assert_eq!(set.offset, (0, 0));
        assert_eq!(det.seen_sizes, vec![(20, 20)]);
    }

    #[test]
    fn test_detect_within_crops_and_sets_offset() {
        let mut det = FixedDetector {
            region: Region::new(1, 1, 4, 4),
            seen_sizes: Vec::new(),
        };
        let search = Region::new(5, 6, 8, 8);
        let set = det
            .detect_within(&frame(20, 20), FeatureClass::Face, Some(&search))
            .unwrap();
        assert_eq!(set.offset, (5, 6));
        assert_eq!(det.seen_sizes, vec![(8, 8)]);

        let composed = set.into_frame_coords();
        assert_eq!(composed.detections[0].region, Region::new(6, 7, 4, 4));
    }

    #[test]
    fn test_detect_within_offset_uses_clamped_origin() {
        let mut det = FixedDetector {
            region: Region::new(0, 0, 2, 2),
            seen_sizes: Vec::new(),
        };
        let search = Region::new(-4, -4, 10, 10);
        let set = det
            .detect_within(&frame(20, 20), FeatureClass::Face, Some(&search))
            .unwrap();
        assert_eq!(set.offset, (0, 0));
        assert_eq!(det.seen_sizes, vec![(6, 6)]);
    }

    #[test]
    fn test_detect_within_empty_search_yields_empty_set() {
        let mut det = FixedDetector {
            region: Region::new(0, 0, 2, 2),
            seen_sizes: Vec::new(),
        };
        let search = Region::new(50, 50, 10, 10); // outside the frame
        let set = det
            .detect_within(&frame(20, 20), FeatureClass::Face, Some(&search))
            .unwrap();
        assert!(set.is_empty());
        assert!(det.seen_sizes.is_empty(), "detector must not run on an empty crop");
    }
}
