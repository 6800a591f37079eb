/// BlazeFace feature detector using ONNX Runtime via `ort`.
///
/// Decodes face boxes plus the six BlazeFace keypoints, which lets a single
/// model answer detection requests for faces, eyes, and mouths. Eye and mouth
/// regions are derived from the keypoints of the strongest face in the frame.
use std::path::Path;

use crate::detection::domain::detection_set::{Detection, DetectionSet};
use crate::detection::domain::feature_class::FeatureClass;
use crate::detection::domain::region_detector::RegionDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Number of keypoints decoded per face.
const NUM_KEYPOINTS: usize = 6;

/// BlazeFace keypoint indices (image-left eye and image-right eye are
/// resolved later by x ordering, so the model's own left/right labels
/// are irrelevant here).
const KP_EYE_A: usize = 0;
const KP_EYE_B: usize = 1;
const KP_MOUTH: usize = 3;

/// Eye region side length as a fraction of the face width.
const EYE_SCALE: f32 = 0.25;

/// Mouth region width/height as fractions of the face box.
const MOUTH_WIDTH_SCALE: f32 = 0.4;
const MOUTH_HEIGHT_SCALE: f32 = 0.25;

/// Face/eye/mouth detector backed by an ONNX Runtime session.
pub struct OnnxFaceDetector {
    session: ort::session::Session,
    confidence: f32,
    anchors: Vec<[f32; 2]>,
}

impl OnnxFaceDetector {
    /// Load a BlazeFace ONNX model.
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        let anchors = generate_anchors();
        Ok(Self {
            session,
            confidence,
            anchors,
        })
    }

    /// Run inference and decode all faces above the confidence threshold.
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<RawDet>, Box<dyn std::error::Error>> {
        let fw = frame.width() as f32;
        let fh = frame.height() as f32;

        let input_tensor = preprocess(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // BlazeFace outputs two tensors:
        // - regressors: [1, 896, 16] (box deltas + 6 keypoint pairs)
        // - classificators: [1, 896, 1] (confidence scores)
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = Vec::new();
        let num_anchors = self.anchors.len().min(NUM_ANCHORS);

        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if score < self.confidence {
                continue;
            }

            let anchor = &self.anchors[i];
            let reg_offset = i * 16;
            if reg_offset + 16 > reg_data.len() {
                break;
            }

            // Box center + size are deltas relative to the anchor
            let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
            let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
            let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
            let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

            let x1 = ((cx - w / 2.0) * fw).max(0.0);
            let y1 = ((cy - h / 2.0) * fh).max(0.0);
            let x2 = ((cx + w / 2.0) * fw).min(fw);
            let y2 = ((cy + h / 2.0) * fh).min(fh);

            // Keypoints follow the box in the regressor, anchor-relative
            let mut keypoints = [(0.0f32, 0.0f32); NUM_KEYPOINTS];
            for (k, kp) in keypoints.iter_mut().enumerate() {
                let kx = anchor[0] + reg_data[reg_offset + 4 + k * 2] / INPUT_SIZE as f32;
                let ky = anchor[1] + reg_data[reg_offset + 5 + k * 2] / INPUT_SIZE as f32;
                *kp = (kx * fw, ky * fh);
            }

            raw_dets.push(RawDet {
                x1: x1 as f64,
                y1: y1 as f64,
                x2: x2 as f64,
                y2: y2 as f64,
                score: score as f64,
                keypoints,
            });
        }

        Ok(nms(&mut raw_dets, NMS_IOU_THRESH))
    }
}

impl RegionDetector for OnnxFaceDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        class: FeatureClass,
    ) -> Result<DetectionSet, Box<dyn std::error::Error>> {
        // This model only knows faces; body requests belong to the person
        // detector.
        if class == FeatureClass::Body {
            return Ok(DetectionSet::empty());
        }

        let faces = self.detect_faces(frame)?;

        let detections = match class {
            FeatureClass::Face => faces
                .iter()
                .map(|d| face_detection(d, frame.width() as i32, frame.height() as i32))
                .collect(),
            FeatureClass::Eye => match best_face(&faces) {
                Some(face) => eye_detections(face),
                None => Vec::new(),
            },
            FeatureClass::Mouth => match best_face(&faces) {
                Some(face) => mouth_detections(face),
                None => Vec::new(),
            },
            FeatureClass::Body => unreachable!(),
        };

        Ok(DetectionSet::new(detections))
    }
}

/// Build a face detection with clamped region and frame-space keypoints.
fn face_detection(det: &RawDet, fw: i32, fh: i32) -> Detection {
    // x1/y1 are already clamped to >= 0 during decoding
    let x = det.x1 as i32;
    let y = det.y1 as i32;
    let w = ((det.x2 - det.x1) as i32).min(fw - x);
    let h = ((det.y2 - det.y1) as i32).min(fh - y);

    let mut d = Detection::with_confidence(Region::new(x, y, w, h), det.score as f32);
    d.keypoints = Some(det.keypoints.to_vec());
    d
}

/// The highest-scoring face, if any.
fn best_face(faces: &[RawDet]) -> Option<&RawDet> {
    faces.iter().max_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Square regions centered on the two eye keypoints of one face.
fn eye_detections(face: &RawDet) -> Vec<Detection> {
    let face_w = (face.x2 - face.x1) as f32;
    let side = (face_w * EYE_SCALE).max(1.0);
    [KP_EYE_A, KP_EYE_B]
        .iter()
        .map(|&k| {
            let (kx, ky) = face.keypoints[k];
            let region = centered_region(kx, ky, side, side);
            Detection::with_confidence(region, face.score as f32)
        })
        .collect()
}

/// A region centered on the mouth keypoint, sized relative to the face box.
fn mouth_detections(face: &RawDet) -> Vec<Detection> {
    let face_w = (face.x2 - face.x1) as f32;
    let face_h = (face.y2 - face.y1) as f32;
    let (kx, ky) = face.keypoints[KP_MOUTH];
    let w = (face_w * MOUTH_WIDTH_SCALE).max(1.0);
    let h = (face_h * MOUTH_HEIGHT_SCALE).max(1.0);
    vec![Detection::with_confidence(
        centered_region(kx, ky, w, h),
        face.score as f32,
    )]
}

fn centered_region(cx: f32, cy: f32, w: f32, h: f32) -> Region {
    Region::new(
        (cx - w / 2.0).round() as i32,
        (cy - h / 2.0).round() as i32,
        w.round() as i32,
        h.round() as i32,
    )
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// Generate BlazeFace anchors for the short-range model.
///
/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
    keypoints: [(f32, f32); NUM_KEYPOINTS],
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_face(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> RawDet {
        let cx = ((x1 + x2) / 2.0) as f32;
        let cy = ((y1 + y2) / 2.0) as f32;
        RawDet {
            x1,
            y1,
            x2,
            y2,
            score,
            keypoints: [
                (cx - 20.0, cy - 10.0), // eye
                (cx + 20.0, cy - 10.0), // eye
                (cx, cy),               // nose
                (cx, cy + 25.0),        // mouth
                (cx - 40.0, cy),        // ear
                (cx + 40.0, cy),        // ear
            ],
        }
    }

    #[test]
    fn test_preprocess_shape() {
        let data = vec![128u8; 200 * 100 * 3];
        let frame = Frame::new(data, 200, 100, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
    }

    #[test]
    fn test_preprocess_normalized() {
        let data = vec![255u8; 50 * 50 * 3];
        let frame = Frame::new(data, 50, 50, 3, 0);
        let tensor = preprocess(&frame, 128);
        // All source pixels are 255, so resized pixels should be ~1.0
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_generate_anchors_count() {
        let anchors = generate_anchors();
        // 16×16 grid × 2 anchors + 8×8 grid × 6 anchors = 512 + 384 = 896
        assert_eq!(anchors.len(), NUM_ANCHORS);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        let anchors = generate_anchors();
        for a in &anchors {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_sigmoid_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            raw_face(0.0, 0.0, 100.0, 100.0, 0.9),
            raw_face(5.0, 5.0, 105.0, 105.0, 0.7),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_separate() {
        let mut dets = vec![
            raw_face(0.0, 0.0, 50.0, 50.0, 0.9),
            raw_face(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_face_detection_carries_keypoints() {
        let det = raw_face(10.0, 10.0, 110.0, 110.0, 0.8);
        let d = face_detection(&det, 640, 480);
        assert_eq!(d.region.x, 10);
        assert_eq!(d.region.width, 100);
        let kps = d.keypoints.unwrap();
        assert_eq!(kps.len(), NUM_KEYPOINTS);
    }

    #[test]
    fn test_best_face_picks_highest_score() {
        let faces = vec![
            raw_face(0.0, 0.0, 50.0, 50.0, 0.6),
            raw_face(100.0, 0.0, 150.0, 50.0, 0.95),
        ];
        let best = best_face(&faces).unwrap();
        assert!((best.score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_eye_detections_two_squares() {
        let face = raw_face(100.0, 100.0, 200.0, 200.0, 0.9);
        let eyes = eye_detections(&face);
        assert_eq!(eyes.len(), 2);
        // Face is 100 wide, so each eye is a 25x25 square
        for eye in &eyes {
            assert_eq!(eye.region.width, 25);
            assert_eq!(eye.region.height, 25);
        }
        // The two eyes sit on opposite sides of the face center
        assert!(eyes[0].region.x != eyes[1].region.x);
    }

    #[test]
    fn test_mouth_detection_sized_from_face() {
        let face = raw_face(100.0, 100.0, 200.0, 200.0, 0.9);
        let mouths = mouth_detections(&face);
        assert_eq!(mouths.len(), 1);
        assert_eq!(mouths[0].region.width, 40);
        assert_eq!(mouths[0].region.height, 25);
    }

    #[test]
    fn test_eye_detections_centered_on_keypoints() {
        let face = raw_face(100.0, 100.0, 200.0, 200.0, 0.9);
        let eyes = eye_detections(&face);
        let (kx, ky) = face.keypoints[KP_EYE_A];
        let r = eyes[0].region;
        let cx = r.x as f32 + r.width as f32 / 2.0;
        let cy = r.y as f32 + r.height as f32 / 2.0;
        assert!((cx - kx).abs() <= 1.0);
        assert!((cy - ky).abs() <= 1.0);
    }
}
