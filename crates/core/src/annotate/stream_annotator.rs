use crate::detection::domain::feature_class::FeatureClass;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Outline color per feature class, RGB.
fn class_color(class: FeatureClass) -> [u8; 3] {
    match class {
        FeatureClass::Body => [66, 135, 245],
        FeatureClass::Face => [52, 199, 89],
        FeatureClass::Eye => [255, 204, 0],
        FeatureClass::Mouth => [255, 59, 48],
    }
}

/// Draws hollow rectangles over detected geometry.
///
/// Drawing is purely presentational: regions outside the frame are clipped
/// and drawing never fails.
#[derive(Default)]
pub struct StreamAnnotator {
    thickness: u32,
}

impl StreamAnnotator {
    pub fn new() -> Self {
        Self { thickness: 2 }
    }

    pub fn with_thickness(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
        }
    }

    /// Draw one outline per geometry entry, colored by class.
    pub fn annotate(&self, frame: &mut Frame, geometry: &[(FeatureClass, Region)]) {
        for &(class, region) in geometry {
            self.draw_rect(frame, &region, class_color(class));
        }
    }

    fn draw_rect(&self, frame: &mut Frame, region: &Region, color: [u8; 3]) {
        let clamped = region.clamped_to(frame.width(), frame.height());
        if clamped.is_empty() {
            return;
        }

        let t = self.thickness as i32;
        let (x0, y0) = (clamped.x, clamped.y);
        let (x1, y1) = (clamped.x + clamped.width, clamped.y + clamped.height);

        // Top and bottom bands
        for y in y0..(y0 + t).min(y1) {
            self.draw_hline(frame, x0, x1, y, color);
        }
        for y in (y1 - t).max(y0)..y1 {
            self.draw_hline(frame, x0, x1, y, color);
        }
        // Left and right bands
        for y in y0..y1 {
            for x in x0..(x0 + t).min(x1) {
                self.put_pixel(frame, x, y, color);
            }
            for x in (x1 - t).max(x0)..x1 {
                self.put_pixel(frame, x, y, color);
            }
        }
    }

    fn draw_hline(&self, frame: &mut Frame, x0: i32, x1: i32, y: i32, color: [u8; 3]) {
        for x in x0..x1 {
            self.put_pixel(frame, x, y, color);
        }
    }

    fn put_pixel(&self, frame: &mut Frame, x: i32, y: i32, color: [u8; 3]) {
        let w = frame.width() as i32;
        let h = frame.height() as i32;
        if x < 0 || y < 0 || x >= w || y >= h {
            return;
        }
        let channels = frame.channels() as usize;
        let idx = (y as usize * w as usize + x as usize) * channels;
        let data = frame.data_mut();
        for (c, &v) in color.iter().enumerate().take(channels) {
            data[idx + c] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black_frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![0u8; (w * h * 3) as usize], w, h, 3, 0)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * frame.width() + x) * 3) as usize;
        let d = frame.data();
        [d[idx], d[idx + 1], d[idx + 2]]
    }

    #[test]
    fn test_outline_is_drawn_on_border() {
        let annotator = StreamAnnotator::with_thickness(1);
        let mut frame = black_frame(20, 20);
        annotator.annotate(&mut frame, &[(FeatureClass::Face, Region::new(5, 5, 10, 10))]);

        let face = class_color(FeatureClass::Face);
        assert_eq!(pixel(&frame, 5, 5), face); // top-left corner
        assert_eq!(pixel(&frame, 14, 5), face); // top-right
        assert_eq!(pixel(&frame, 5, 14), face); // bottom-left
    }

    #[test]
    fn test_interior_is_untouched() {
        let annotator = StreamAnnotator::with_thickness(1);
        let mut frame = black_frame(20, 20);
        annotator.annotate(&mut frame, &[(FeatureClass::Face, Region::new(5, 5, 10, 10))]);

        assert_eq!(pixel(&frame, 10, 10), [0, 0, 0]);
    }

    #[test]
    fn test_region_partially_outside_is_clipped() {
        let annotator = StreamAnnotator::new();
        let mut frame = black_frame(20, 20);
        // Must not panic or write out of bounds
        annotator.annotate(&mut frame, &[(FeatureClass::Body, Region::new(-5, -5, 15, 15))]);
        assert_ne!(pixel(&frame, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_region_fully_outside_is_ignored() {
        let annotator = StreamAnnotator::new();
        let mut frame = black_frame(20, 20);
        annotator.annotate(&mut frame, &[(FeatureClass::Eye, Region::new(50, 50, 10, 10))]);
        assert!(frame.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_classes_use_distinct_colors() {
        assert_ne!(class_color(FeatureClass::Body), class_color(FeatureClass::Face));
        assert_ne!(class_color(FeatureClass::Eye), class_color(FeatureClass::Mouth));
    }
}
