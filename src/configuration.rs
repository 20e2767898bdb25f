//! Job configuration.
//!
//! [`ConversionOptions`] is a builder that threads the progress callback,
//! the cancellation token, and runtime tuning through a conversion without
//! polluting every function signature. It controls *how* a job runs;
//! [`ConversionSettings`](crate::ConversionSettings) controls *what* it
//! produces.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use vidgif::{CancellationToken, ConversionOptions, ProgressCallback, ProgressEvent};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, event: &ProgressEvent) {
//!         println!("{:?}: {}/{}", event.phase, event.current, event.total);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = ConversionOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_seek_timeout(Duration::from_secs(2))
//!     .with_workers(2);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// How long a single seek may take before the job fails with
/// [`SeekTimeout`](crate::ConversionError::SeekTimeout).
pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the default quantiser worker count.
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// Runtime options for a conversion job.
///
/// A default-constructed value reports progress nowhere, is never
/// cancelled, loops the GIF forever, and sizes the worker pool from the
/// available parallelism.
#[derive(Clone)]
pub struct ConversionOptions {
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    /// Report capture progress every N frames.
    pub(crate) batch_size: u64,
    /// Per-seek timeout.
    pub(crate) seek_timeout: Duration,
    /// Quantiser worker count. `None` picks a default at job start.
    pub(crate) workers: Option<usize>,
    /// GIF loop count. `None` loops forever.
    pub(crate) repeat: Option<u16>,
}

impl Debug for ConversionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConversionOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("seek_timeout", &self.seek_timeout)
            .field("workers", &self.workers)
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionOptions {
    /// Create options with the defaults.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            workers: None,
            repeat: None,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the job stops at the next step boundary
    /// and returns [`ConversionError::Cancelled`](crate::ConversionError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report capture progress every `size` frames (minimum 1). The final
    /// `1.0` event of each phase is always delivered.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set how long one seek may take.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = timeout;
        self
    }

    /// Fix the quantiser worker count for each job (minimum 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Set the GIF loop count. `None` loops forever.
    #[must_use]
    pub fn with_repeat(mut self, repeat: Option<u16>) -> Self {
        self.repeat = repeat;
        self
    }

    /// The worker count a job will use.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(1, MAX_DEFAULT_WORKERS)
        })
    }

    /// The configured seek timeout.
    pub fn seek_timeout(&self) -> Duration {
        self.seek_timeout
    }

    pub(crate) fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
