use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::warn;

use crate::annotate::mjpeg::FramePublisher;
use crate::annotate::stream_annotator::StreamAnnotator;
use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::detection_set::DetectionSet;
use crate::detection::domain::feature_class::FeatureClass;
use crate::detection::domain::region_detector::RegionDetector;
use crate::extraction::record_extractor::RecordExtractor;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;
use crate::shared::region::{Region, DEFAULT_IOU_THRESHOLD};

/// Runtime controls for a watch session.
///
/// `detection_enabled` and `stop` are shared flags so an operator surface
/// can toggle capture and end the session while the loop runs.
pub struct WatchConfig {
    pub top_class: FeatureClass,
    pub min_confidence: f32,
    pub detection_enabled: Arc<AtomicBool>,
    pub stop: Arc<AtomicBool>,
    /// Stop after this many frames. `None` runs until the stream ends.
    pub max_frames: Option<usize>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            top_class: FeatureClass::Face,
            min_confidence: 0.5,
            detection_enabled: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(false)),
            max_frames: None,
        }
    }
}

/// What a finished watch session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub frames_read: usize,
    pub records_created: usize,
}

/// Use case: watch a stream, persist a record per detection, publish
/// annotated frames.
///
/// One frame flows through detect, extract, annotate, publish in order.
/// Detector and extractor failures degrade to a skipped detection or an
/// unannotated frame; a source read failure ends the session the same way
/// end-of-stream does. Only a failure to open the source is an error.
pub struct WatchStreamUseCase {
    source: Box<dyn FrameSource>,
    detector: Box<dyn RegionDetector>,
    extractor: RecordExtractor,
    annotator: StreamAnnotator,
    publisher: Option<FramePublisher>,
    logger: Box<dyn PipelineLogger>,
}

impl WatchStreamUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn RegionDetector>,
        extractor: RecordExtractor,
        annotator: StreamAnnotator,
        publisher: Option<FramePublisher>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            source,
            detector,
            extractor,
            annotator,
            publisher,
            logger,
        }
    }

    pub fn execute(
        &mut self,
        source_url: &str,
        config: &WatchConfig,
    ) -> Result<WatchReport, Box<dyn std::error::Error>> {
        let info = self.source.open(source_url)?;
        self.logger.info(&format!(
            "Watching {}x{} stream at {:.1} fps",
            info.width, info.height, info.fps
        ));

        let mut frames_read = 0usize;
        let mut records_created = 0usize;

        loop {
            // A read failure ends the session like end-of-stream does; the
            // report still covers everything read so far.
            let mut frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("Frame read failed, ending session: {e}");
                    break;
                }
            };
            if config.stop.load(Ordering::Relaxed) {
                break;
            }

            // Read once per frame so a mid-frame toggle can't mix annotated
            // and unprocessed work.
            let enabled = config.detection_enabled.load(Ordering::Relaxed);
            if enabled {
                records_created += self.process_frame(&mut frame, config);
            }

            if let Some(publisher) = &self.publisher {
                publisher.publish(frame);
            }

            frames_read += 1;
            self.logger.frame(frames_read);

            if config.max_frames.is_some_and(|max| frames_read >= max) {
                break;
            }
        }

        self.source.close();
        self.logger.summary(&format!(
            "Watch finished: {frames_read} frames, {records_created} records"
        ));
        Ok(WatchReport {
            frames_read,
            records_created,
        })
    }

    /// Detect, extract, annotate. Returns the number of records created.
    fn process_frame(&mut self, frame: &mut Frame, config: &WatchConfig) -> usize {
        let started = Instant::now();
        let set = match self.detector.detect(frame, config.top_class) {
            Ok(set) => set.into_frame_coords(),
            Err(e) => {
                warn!("{} detection failed on frame {}: {e}", config.top_class.name(), frame.index());
                DetectionSet::empty()
            }
        };
        self.logger
            .timing("detect", started.elapsed().as_secs_f64() * 1000.0);

        let mut created = 0usize;
        let mut geometry = Vec::new();
        let mut captured: Vec<Region> = Vec::new();
        for detection in &set.detections {
            if detection
                .confidence
                .is_some_and(|c| c < config.min_confidence)
            {
                continue;
            }
            // One record per subject: skip detections that mostly overlap
            // an already captured one.
            if captured
                .iter()
                .any(|r| detection.region.iou(r) > DEFAULT_IOU_THRESHOLD)
            {
                continue;
            }
            captured.push(detection.region);
            match self.extractor.extract(frame, detection, config.top_class) {
                Ok(Some(extraction)) => {
                    created += 1;
                    geometry.extend(extraction.geometry);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Extraction failed on frame {}: {e}", frame.index());
                }
            }
        }

        if created > 0 {
            self.logger.metric("records", created as u64);
        }
        self.annotator.annotate(frame, &geometry);
        created
    }
}
