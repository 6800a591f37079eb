/// Overlap ratio above which two detections are treated as one subject.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.3;

/// An axis-aligned rectangle in image coordinates.
///
/// A region is usable only when both dimensions are positive; detector
/// output at a frame boundary can legitimately clamp down to empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Shifts the region by `(dx, dy)` — used to compose nested detections
    /// (expressed in their crop's local coordinates) back into full-frame
    /// coordinates.
    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        Region::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersects the region with a `width × height` canvas.
    ///
    /// The result may be empty; callers decide whether that means "discard"
    /// (extraction) or "skip drawing" (annotation).
    pub fn clamped_to(&self, width: u32, height: u32) -> Region {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = (self.x + self.width).min(width as i32);
        let y2 = (self.y + self.height).min(height as i32);
        Region::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width as f64 * self.height as f64;
        let area_b = other.width as f64 * other.height as f64;
        inter / (area_a + area_b - inter)
    }
}
