use std::io::Cursor;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::codecs::jpeg::JpegEncoder;

use crate::shared::frame::Frame;

/// Default JPEG quality for streamed frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Multipart boundary name used in the stream.
pub const BOUNDARY: &str = "frame";

/// Encode one frame as an MJPEG multipart chunk.
///
/// The chunk layout is fixed by the multipart/x-mixed-replace convention:
/// boundary line, part headers, blank line, JPEG bytes, trailing CRLF.
pub fn mjpeg_chunk(frame: &Frame, quality: u8) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let img = frame
        .to_rgb_image()
        .ok_or("frame buffer does not match its dimensions")?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut jpeg), quality).encode_image(&img)?;

    let mut chunk =
        Vec::with_capacity(jpeg.len() + BOUNDARY.len() + 48);
    chunk.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    chunk.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    chunk.extend_from_slice(&jpeg);
    chunk.extend_from_slice(b"\r\n");
    Ok(chunk)
}

/// Content type line for an MJPEG response using [`BOUNDARY`].
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

/// Hands annotated frames to a consumer, keeping only the newest.
///
/// Capacity is one: when the consumer lags, the stale frame is dropped and
/// replaced, so the stream always shows the live picture instead of
/// building a backlog. A disconnected consumer is not an error; capture
/// continues without presentation.
pub struct FramePublisher {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl FramePublisher {
    pub fn channel() -> (FramePublisher, Receiver<Frame>) {
        let (tx, rx) = bounded(1);
        (
            FramePublisher {
                tx,
                rx: rx.clone(),
            },
            rx,
        )
    }

    /// Publish a frame, displacing an unconsumed one.
    pub fn publish(&self, frame: Frame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                // Pop the stale frame, then retry; if the consumer raced us
                // and the slot refilled, this frame is lost and the next one
                // takes its place.
                let _ = self.rx.try_recv();
                let _ = self.tx.try_send(frame);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
