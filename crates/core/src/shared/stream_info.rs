/// Properties of an opened frame stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Frames per second as reported by the source; 0.0 when unknown
    /// (image sequences, some capture devices).
    pub fps: f64,
    /// Human-readable source descriptor (device, URL, or path).
    pub source: Option<String>,
}
