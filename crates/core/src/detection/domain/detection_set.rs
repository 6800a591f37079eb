use crate::shared::region::Region;

/// One detected region with whatever metadata the backend can provide.
///
/// Confidence and keypoints are optional: cascade-style detectors report
/// binary presence only, learned multi-task detectors add scores and
/// facial keypoints. Callers must not assume either is present.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub region: Region,
    pub confidence: Option<f32>,
    /// Keypoints in the same coordinate space as `region`.
    pub keypoints: Option<Vec<(f32, f32)>>,
}

impl Detection {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            confidence: None,
            keypoints: None,
        }
    }

    pub fn with_confidence(region: Region, confidence: f32) -> Self {
        Self {
            region,
            confidence: Some(confidence),
            keypoints: None,
        }
    }
}

/// The output of one detector invocation on one image.
///
/// When detection ran inside a search crop, `offset` records the crop's
/// origin in the parent image: every region and keypoint is local to the
/// crop until [`DetectionSet::into_frame_coords`] composes the offset.
/// Detections must always be composed before persistence or display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
    pub offset: (i32, i32),
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            offset: (0, 0),
        }
    }

    pub fn with_offset(detections: Vec<Detection>, offset: (i32, i32)) -> Self {
        Self { detections, offset }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Translates all geometry by the carried offset, producing a set whose
    /// coordinates are valid in the parent (full-frame) coordinate space.
    pub fn into_frame_coords(self) -> DetectionSet {
        let (dx, dy) = self.offset;
        if dx == 0 && dy == 0 {
            return self;
        }
        let detections = self
            .detections
            .into_iter()
            .map(|d| Detection {
                region: d.region.translated(dx, dy),
                confidence: d.confidence,
                keypoints: d.keypoints.map(|kps| {
                    kps.into_iter()
                        .map(|(x, y)| (x + dx as f32, y + dy as f32))
                        .collect()
                }),
            })
            .collect();
        DetectionSet {
            detections,
            offset: (0, 0),
        }
    }
}
