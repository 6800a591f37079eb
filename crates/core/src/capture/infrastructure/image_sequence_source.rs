use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;

/// Serves a sorted directory of still images as a finite frame stream.
///
/// Offline stand-in for a capture device: useful for tests, demos, and
/// replaying saved footage frame dumps.
pub struct ImageSequenceSource {
    pending: VecDeque<PathBuf>,
    next_index: usize,
}

impl ImageSequenceSource {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            next_index: 0,
        }
    }
}

impl Default for ImageSequenceSource {
    fn default() -> Self {
        Self::new()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self, source: &str) -> Result<StreamInfo, Box<dyn std::error::Error>> {
        let dir = Path::new(source);
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(format!("no image files in {}", dir.display()).into());
        }

        // Probe the first image for stream dimensions.
        let first = image::open(&paths[0])?.to_rgb8();

        self.pending = paths.into();
        self.next_index = 0;

        Ok(StreamInfo {
            width: first.width(),
            height: first.height(),
            fps: 0.0,
            source: Some(source.to_string()),
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let img = image::open(&path)?.to_rgb8();
        let frame = Frame::from_rgb_image(&img, self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.pending.clear();
    }
}
