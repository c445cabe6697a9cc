//! Progress-callback trait for analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! `(percent, message)` events as an analysis moves through its chunks.
//!
//! The pipeline never reports a percentage lower than one it already
//! reported: every event goes through a [`ProgressReporter`], which clamps to
//! `[0, 100]` and to the running maximum. A caller that stops caring can
//! simply ignore further events; in-flight work is not cancelled.
//!
//! # Example
//!
//! ```rust
//! use soc_lens::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::Arc;
//!
//! struct Stderr;
//!
//! impl AnalysisProgressCallback for Stderr {
//!     fn on_progress(&self, percent: u8, message: &str) {
//!         eprintln!("[{percent:>3}%] {message}");
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Stderr))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Receives analysis progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Overall progress. `percent` is in `[0, 100]` and never decreases
    /// within one analysis.
    fn on_progress(&self, percent: u8, message: &str) {
        let _ = (percent, message);
    }

    /// A chunk failed and was skipped (multi-chunk analyses only).
    ///
    /// # Arguments
    /// * `chunk` — 1-indexed chunk number
    /// * `total` — number of chunks
    /// * `error` — human-readable error description
    fn on_chunk_error(&self, chunk: usize, total: usize, error: &str) {
        let _ = (chunk, total, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

/// Per-analysis wrapper enforcing monotonic, bounded percentages.
pub(crate) struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: AtomicU8,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: AtomicU8::new(0),
        }
    }

    pub(crate) fn report(&self, percent: u8, message: &str) {
        let clamped = percent.min(100);
        let previous = self.last.fetch_max(clamped, Ordering::SeqCst);
        if let Some(cb) = &self.callback {
            cb.on_progress(clamped.max(previous), message);
        }
    }

    /// Report the position `done / total` mapped onto `[start, end]`.
    pub(crate) fn report_fraction(&self, start: u8, end: u8, done: usize, total: usize, message: &str) {
        let span = end.saturating_sub(start) as usize;
        let offset = if total == 0 { span } else { span * done.min(total) / total };
        self.report(start.saturating_add(offset as u8), message);
    }

    pub(crate) fn chunk_error(&self, chunk: usize, total: usize, error: &str) {
        if let Some(cb) = &self.callback {
            cb.on_chunk_error(chunk, total, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(u8, String)>>,
        errors: Mutex<Vec<(usize, usize)>>,
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_progress(&self, percent: u8, message: &str) {
            self.events.lock().unwrap().push((percent, message.to_string()));
        }

        fn on_chunk_error(&self, chunk: usize, total: usize, _error: &str) {
            self.errors.lock().unwrap().push((chunk, total));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_progress(50, "halfway");
        cb.on_chunk_error(1, 2, "boom");
    }

    #[test]
    fn reporter_is_monotonic_and_bounded() {
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::new(Some(recorder.clone() as ProgressCallback));
        reporter.report(10, "a");
        reporter.report(5, "b");
        reporter.report(250, "c");
        reporter.report(90, "d");

        let percents: Vec<u8> = recorder.events.lock().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(percents, vec![10, 10, 100, 100]);
    }

    #[test]
    fn fraction_maps_onto_range() {
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::new(Some(recorder.clone() as ProgressCallback));
        reporter.report_fraction(10, 90, 1, 4, "chunk 1/4");
        reporter.report_fraction(10, 90, 4, 4, "chunk 4/4");
        let percents: Vec<u8> = recorder.events.lock().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(percents, vec![30, 90]);
    }

    #[test]
    fn chunk_errors_are_forwarded() {
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::new(Some(recorder.clone() as ProgressCallback));
        reporter.chunk_error(2, 3, "timeout");
        assert_eq!(*recorder.errors.lock().unwrap(), vec![(2, 3)]);
    }

    #[test]
    fn reporter_without_callback_is_silent() {
        let reporter = ProgressReporter::new(None);
        reporter.report(40, "nobody listening");
    }
}
