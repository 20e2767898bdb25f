//! Progress reporting and cancellation support.
//!
//! A conversion job reports progress through a single [`ProgressCallback`]
//! and observes a single [`CancellationToken`]. Events carry the
//! [`Phase`] they belong to and a completion fraction that never decreases
//! within a phase and reaches exactly `1.0` before the job moves on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vidgif::{
//!     CancellationToken, ConversionOptions, ConversionSettings, ProgressCallback,
//!     ProgressEvent,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, event: &ProgressEvent) {
//!         println!("[{:?}] {:.0}%", event.phase, event.fraction * 100.0);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = ConversionOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(token.clone());
//!
//! let gif = vidgif::convert("input.mp4", &ConversionSettings::new(), &options)?;
//! # Ok::<(), vidgif::ConversionError>(())
//! ```

use std::sync::mpsc::Sender;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The stage of a conversion an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Seeking, capturing, and resizing source frames.
    Capturing,
    /// Waiting on quantiser workers and writing the GIF stream.
    Encoding,
}

/// A progress snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Which phase is reporting.
    pub phase: Phase,
    /// Completion of the phase in `[0, 1]`.
    pub fraction: f32,
    /// Items (frames) completed in this phase.
    pub current: u64,
    /// Items expected in this phase.
    pub total: u64,
    /// Wall-clock time since the phase started.
    pub elapsed: Duration,
}

/// Receives progress updates during a conversion.
///
/// Callbacks are infallible: they observe but cannot halt the job. Use
/// [`CancellationToken`] to stop it.
pub trait ProgressCallback: Send + Sync {
    /// Called whenever a phase advances.
    fn on_progress(&self, event: &ProgressEvent);
}

/// Discards all events. The default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Forwards events into a channel. A dropped receiver is ignored.
impl ProgressCallback for Sender<ProgressEvent> {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.send(event.clone());
    }
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state. The pipeline checks the token between steps and
/// while waiting on the decoder or the encoder workers; cancelling a job
/// that already finished has no effect.
///
/// ```
/// use vidgif::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one phase and emits monotonic events to the callback.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    phase: Phase,
    total: u64,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
    last_fraction: f32,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        phase: Phase,
        total: u64,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            phase,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
            last_fraction: 0.0,
        }
    }

    /// Record one completed item and report once the batch fills up.
    pub(crate) fn advance(&mut self) {
        self.advance_to(self.current + 1);
    }

    /// Move to `current` completed items (never backwards).
    pub(crate) fn advance_to(&mut self, current: u64) {
        let current = current.min(self.total).max(self.current);
        self.items_since_last_report += current - self.current;
        self.current = current;

        if self.items_since_last_report >= self.batch_size {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    /// Report exactly `1.0` for this phase.
    pub(crate) fn finish(&mut self) {
        self.current = self.total;
        self.report();
    }

    pub(crate) fn current(&self) -> u64 {
        self.current
    }

    fn report(&mut self) {
        let fraction = if self.total == 0 || self.current >= self.total {
            1.0
        } else {
            (self.current as f32 / self.total as f32).min(1.0)
        };
        // Float division can dip for large totals; keep events monotonic.
        let fraction = fraction.max(self.last_fraction);
        self.last_fraction = fraction;

        let event = ProgressEvent {
            phase: self.phase,
            fraction,
            current: self.current,
            total: self.total,
            elapsed: self.start_time.elapsed(),
        };
        self.callback.on_progress(&event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn tracker_reports_every_batch_and_finishes_at_one() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Phase::Capturing, 7, 3);
        for _ in 0..7 {
            tracker.advance();
        }
        tracker.finish();

        let events = recorder.0.lock().unwrap();
        let currents: Vec<u64> = events.iter().map(|e| e.current).collect();
        assert_eq!(currents, vec![3, 6, 7]);
        assert_eq!(events.last().unwrap().fraction, 1.0);
    }

    #[test]
    fn tracker_never_moves_backwards() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Phase::Encoding, 10, 1);
        tracker.advance_to(5);
        tracker.advance_to(2);
        tracker.advance_to(20);

        let events = recorder.0.lock().unwrap();
        let currents: Vec<u64> = events.iter().map(|e| e.current).collect();
        assert_eq!(currents, vec![5, 10]);
        assert!(events.windows(2).all(|w| w[1].fraction >= w[0].fraction));
    }

    #[test]
    fn sender_callback_tolerates_dropped_receiver() {
        let (sender, receiver) = std::sync::mpsc::channel();
        drop(receiver);
        let mut tracker = ProgressTracker::new(Arc::new(sender), Phase::Capturing, 1, 1);
        tracker.advance();
        tracker.finish();
    }
}
