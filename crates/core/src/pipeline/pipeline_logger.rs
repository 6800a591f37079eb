/// Progress reporting for long-running pipeline work.
///
/// The capture loop runs on unbounded streams, so progress is reported as
/// counters and periodic summaries rather than percentages.
pub trait PipelineLogger: Send {
    /// A frame finished processing.
    fn frame(&mut self, index: usize);

    /// A named stage took `ms` milliseconds on the current frame.
    fn timing(&mut self, stage: &str, ms: f64);

    /// A named counter changed (records created, detections seen).
    fn metric(&mut self, name: &str, value: u64);

    /// Free-form progress note.
    fn info(&mut self, message: &str);

    /// Final summary once the stream ends or is stopped.
    fn summary(&mut self, message: &str);
}

/// Discards all progress. Used by tests and embedding callers.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame(&mut self, _index: usize) {}
    fn timing(&mut self, _stage: &str, _ms: f64) {}
    fn metric(&mut self, _name: &str, _value: u64) {}
    fn info(&mut self, _message: &str) {}
    fn summary(&mut self, _message: &str) {}
}

/// Logs progress through the `log` facade.
///
/// Frame ticks are sampled to one line per `interval` frames; timings go to
/// debug so normal runs stay quiet.
pub struct LogPipelineLogger {
    interval: usize,
}

impl LogPipelineLogger {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn frame(&mut self, index: usize) {
        if index % self.interval == 0 {
            log::info!("Processed frame {index}");
        }
    }

    fn timing(&mut self, stage: &str, ms: f64) {
        log::debug!("{stage}: {ms:.1}ms");
    }

    fn metric(&mut self, name: &str, value: u64) {
        log::debug!("{name}: {value}");
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&mut self, message: &str) {
        log::info!("{message}");
    }
}
