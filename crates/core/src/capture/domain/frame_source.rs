use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;

/// Supplies a lazy, effectively infinite sequence of frames from a capture
/// device, stream URL, or file.
///
/// Pull-based rather than iterator-based: the live loop always wants the
/// next (most recent) frame and makes no buffering promises beyond that.
/// `Ok(None)` signals end-of-stream; the loop must stop cleanly rather
/// than retry. Restart requires reopening the source.
pub trait FrameSource: Send {
    /// Opens the source and returns its stream properties.
    fn open(&mut self, source: &str) -> Result<StreamInfo, Box<dyn std::error::Error>>;

    /// Reads the next frame. `Ok(None)` means the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases any resources held by the source.
    fn close(&mut self);
}
