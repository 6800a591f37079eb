use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;

/// Live capture via ffmpeg-next (libavformat + libavcodec).
///
/// Accepts anything libavformat can open — a V4L2 device path, an RTSP/HTTP
/// URL, or a video file — and converts each decoded frame to RGB24.
pub struct FfmpegFrameSource {
    input: Option<ffmpeg_next::format::context::Input>,
    decoder: Option<ffmpeg_next::decoder::Video>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

// Safety: the source is driven from a single thread at a time. The raw
// pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self {
            input: None,
            decoder: None,
            scaler: None,
            stream_index: 0,
            width: 0,
            height: 0,
            frame_index: 0,
            flushing: false,
            done: false,
        }
    }

    /// Drains one converted frame from the decoder, if it has one ready.
    fn receive_converted(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let decoder = self.decoder.as_mut().ok_or("FfmpegFrameSource: not opened")?;
        let scaler = self.scaler.as_mut().ok_or("FfmpegFrameSource: not opened")?;

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&decoded, &mut rgb)?;

        let pixels = strip_row_padding(&rgb, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, source: &str) -> Result<StreamInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(&source)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();

        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        self.stream_index = stream_index;
        self.width = width;
        self.height = height;
        self.frame_index = 0;
        self.flushing = false;
        self.done = false;
        self.decoder = Some(decoder);
        self.scaler = Some(scaler);
        self.input = Some(ictx);

        Ok(StreamInfo {
            width,
            height,
            fps,
            source: Some(source.to_string()),
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.done {
            return Ok(None);
        }
        if self.input.is_none() {
            return Err("FfmpegFrameSource: not opened".into());
        }

        if let Some(frame) = self.receive_converted()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let packet = {
                let ictx = self.input.as_mut().ok_or("FfmpegFrameSource: not opened")?;
                let mut found = None;
                for (stream, packet) in ictx.packets() {
                    if stream.index() == self.stream_index {
                        found = Some(packet);
                        break;
                    }
                }
                found
            };

            let Some(packet) = packet else {
                // Demuxer exhausted: flush the decoder for trailing frames.
                let decoder = self.decoder.as_mut().ok_or("FfmpegFrameSource: not opened")?;
                let _ = decoder.send_eof();
                self.flushing = true;
                let frame = self.receive_converted()?;
                if frame.is_none() {
                    self.done = true;
                }
                return Ok(frame);
            };

            // A packet the decoder rejects is skipped, not fatal.
            let decoder = self.decoder.as_mut().ok_or("FfmpegFrameSource: not opened")?;
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            if let Some(frame) = self.receive_converted()? {
                return Ok(Some(frame));
            }
        }
    }

    fn close(&mut self) {
        self.input = None;
        self.decoder = None;
        self.scaler = None;
        self.done = true;
    }
}

/// ffmpeg frames may pad each row (stride > width*3); copy out a tightly
/// packed buffer.
fn strip_row_padding(
    rgb: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_test_video(path: &Path, num_frames: usize, width: u32, height: u32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(&path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, 30));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(30, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 40) % 256) as u8;
            for row in 0..height as usize {
                for col in 0..width as usize {
                    let offset = row * stride + col * 3;
                    data[offset] = value;
                    data[offset + 1] = value;
                    data[offset + 2] = value;
                }
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));
            encoder.send_frame(&yuv_frame).unwrap();

            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, 30), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, 30), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }

    #[test]
    fn test_open_returns_stream_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        write_test_video(&path, 5, 160, 120);

        let mut source = FfmpegFrameSource::new();
        let info = source.open(path.to_str().unwrap()).unwrap();
        assert_eq!(info.width, 160);
        assert_eq!(info.height, 120);
        assert!(info.fps > 0.0);
    }

    #[test]
    fn test_open_nonexistent_is_error() {
        let mut source = FfmpegFrameSource::new();
        assert!(source.open("/nonexistent/test.mp4").is_err());
    }

    #[test]
    fn test_next_frame_without_open_is_error() {
        let mut source = FfmpegFrameSource::new();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_reads_all_frames_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        write_test_video(&path, 5, 160, 120);

        let mut source = FfmpegFrameSource::new();
        source.open(path.to_str().unwrap()).unwrap();

        let mut count = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.index(), count);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
            count += 1;
        }
        assert_eq!(count, 5);

        // Exhaustion is sticky.
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_close_then_next_frame_is_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        write_test_video(&path, 2, 160, 120);

        let mut source = FfmpegFrameSource::new();
        source.open(path.to_str().unwrap()).unwrap();
        source.close();
        assert!(source.next_frame().unwrap().is_none());
    }
}
