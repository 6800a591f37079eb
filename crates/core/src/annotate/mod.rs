pub mod mjpeg;
pub mod stream_annotator;
