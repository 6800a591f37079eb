use ndarray::ArrayView3;

use crate::shared::region::Region;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Frames are ephemeral — owned by the current pipeline iteration and never
/// persisted whole. Format conversion happens at I/O boundaries only.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Builds a frame from a decoded RGB image.
    pub fn from_rgb_image(img: &image::RgbImage, index: usize) -> Self {
        Self::new(img.as_raw().clone(), img.width(), img.height(), 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies out the pixels under `region`, clamped to the frame bounds.
    ///
    /// Returns `None` when the clamped intersection is empty (zero-area
    /// region, or geometry entirely outside the frame).
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let clamped = region.clamped_to(self.width, self.height);
        if clamped.is_empty() {
            return None;
        }

        let x1 = clamped.x as usize;
        let y1 = clamped.y as usize;
        let w = clamped.width as usize;
        let h = clamped.height as usize;
        let channels = self.channels as usize;

        let src = self.as_ndarray();
        let mut data = Vec::with_capacity(w * h * channels);
        for row in y1..y1 + h {
            for col in x1..x1 + w {
                for c in 0..channels {
                    data.push(src[[row, col, c]]);
                }
            }
        }

        Some(Frame::new(data, w as u32, h as u32, self.channels, self.index))
    }

    /// Converts to an `image::RgbImage` for encode/resample operations.
    ///
    /// `None` for non-RGB frames or a buffer whose size does not match.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.channels != 3 {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
