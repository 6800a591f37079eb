/// YOLOv8 person detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, and NMS post-processing.
/// Only the person class is decoded; every other class in the model's
/// output is ignored.
use std::path::Path;

use crate::detection::domain::detection_set::{Detection, DetectionSet};
use crate::detection::domain::feature_class::FeatureClass;
use crate::detection::domain::region_detector::RegionDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for person detection.
pub const DEFAULT_CONFIDENCE: f32 = 0.2;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// COCO class index for "person".
const PERSON_CLASS: usize = 0;

/// Person detector backed by an ONNX Runtime session.
pub struct OnnxPersonDetector {
    session: ort::session::Session,
    confidence: f32,
    input_size: u32,
}

impl OnnxPersonDetector {
    /// Load a YOLOv8 ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW). Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // shape is [N, C, H, W], square input assumed
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl RegionDetector for OnnxPersonDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        class: FeatureClass,
    ) -> Result<DetectionSet, Box<dyn std::error::Error>> {
        // This model only knows whole bodies.
        if class != FeatureClass::Body {
            return Ok(DetectionSet::empty());
        }

        let fw = frame.width() as f64;
        let fh = frame.height() as f64;

        // 1. Preprocess: letterbox + normalize to NCHW float32
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape();

        // YOLOv8 output is [1, 4 + num_classes, num_detections] (transposed)
        // or [1, num_detections, 4 + num_classes]. Handle both.
        let (num_dets, num_feats) = if shape.len() == 3 {
            if shape[1] < shape[2] {
                (shape[2], shape[1])
            } else {
                (shape[1], shape[2])
            }
        } else {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        };

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let transposed = shape.len() == 3 && shape[1] < shape[2];

        // 3. Parse person detections
        let mut raw_dets = Vec::new();
        for i in 0..num_dets {
            let at = |f: usize| {
                if transposed {
                    data[f * num_dets + i]
                } else {
                    data[i * num_feats + f]
                }
            };

            // row format: [cx, cy, w, h, class0_score, class1_score, ...]
            if num_feats < 5 {
                continue;
            }
            let score = at(4 + PERSON_CLASS) as f64;
            if score < self.confidence as f64 {
                continue;
            }

            let cx = at(0) as f64;
            let cy = at(1) as f64;
            let w = at(2) as f64;
            let h = at(3) as f64;

            // Convert from letterbox coords back to original frame coords
            let x1 = (((cx - w / 2.0) - pad_x as f64) / scale).max(0.0);
            let y1 = (((cy - h / 2.0) - pad_y as f64) / scale).max(0.0);
            let x2 = (((cx + w / 2.0) - pad_x as f64) / scale).min(fw);
            let y2 = (((cy + h / 2.0) - pad_y as f64) / scale).min(fh);

            raw_dets.push(RawDetection {
                x1,
                y1,
                x2,
                y2,
                confidence: score,
            });
        }

        // 4. NMS
        let filtered = nms(&mut raw_dets, NMS_IOU_THRESH);

        // 5. Build detections
        let detections = filtered
            .iter()
            .map(|d| {
                Detection::with_confidence(
                    Region::new(
                        d.x1 as i32,
                        d.y1 as i32,
                        (d.x2 - d.x1) as i32,
                        (d.y2 - d.y1) as i32,
                    ),
                    d.confidence as f32,
                )
            })
            .collect();

        Ok(DetectionSet::new(detections))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Pad with 114/255 gray, the YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize + copy into padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
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
            let iou = bbox_iou(
                &[dets[i].x1, dets[i].y1, dets[i].x2, dets[i].y2],
                &[dets[j].x1, dets[j].y1, dets[j].x2, dets[j].y2],
            );
            if iou > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
