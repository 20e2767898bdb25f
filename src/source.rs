//! The decoder boundary.
//!
//! [`MediaSource`] is the handle the pipeline drives: it reports the source
//! duration and native dimensions, moves its read position to a timestamp,
//! and captures the frame at that position. The FFmpeg-backed
//! implementation is [`FfmpegSource`](crate::FfmpegSource); any other
//! decoder (or a synthetic test source) can be plugged in by implementing
//! this trait and calling [`convert_source`](crate::convert_source).
//!
//! A source is owned by exactly one job and released by dropping it.

use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;

use crate::progress::CancellationToken;

/// Source properties known once the handle is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    /// Total duration. Zero when the container does not report one.
    pub duration: Duration,
    /// Native frame width in pixels.
    pub width: u32,
    /// Native frame height in pixels.
    pub height: u32,
}

/// A frame captured at a scheduled timestamp, at native resolution.
///
/// Consumed immediately by the [`Rasterizer`](crate::Rasterizer).
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Index into the frame schedule.
    pub index: u64,
    /// Timestamp the frame was sampled for.
    pub timestamp: Duration,
    /// Pixels in RGBA8 at the source's native dimensions.
    pub pixels: RgbaImage,
}

impl RawFrame {
    /// Native width reported by this frame.
    pub fn source_width(&self) -> u32 {
        self.pixels.width()
    }

    /// Native height reported by this frame.
    pub fn source_height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Failures a source reports back to the sampler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The seek did not land before its deadline.
    #[error("seek timed out")]
    Timeout,
    /// The decoder failed or the stream ended unexpectedly.
    #[error("{0}")]
    Decode(String),
    /// The underlying resource went away.
    #[error("source disconnected: {0}")]
    Disconnected(String),
    /// The pixel conversion context could not be created.
    #[error("{0}")]
    ContextUnavailable(String),
    /// A watched cancellation token fired while the source was blocked.
    #[error("interrupted by cancellation")]
    Cancelled,
}

/// A decodable video opened for one conversion job.
///
/// Calls arrive strictly in order `seek`, `capture`, `seek`, `capture`, …
/// with non-decreasing timestamps; there is never more than one outstanding
/// seek.
pub trait MediaSource {
    /// Duration and native dimensions.
    fn info(&self) -> SourceInfo;

    /// Move the read position to `timestamp`, returning once the decoder has
    /// a frame for it.
    ///
    /// This is where the pipeline waits on the decoder. Implementations must
    /// give up with [`SourceError::Timeout`] once `timeout` has elapsed.
    fn seek(&mut self, timestamp: Duration, timeout: Duration) -> Result<(), SourceError>;

    /// Read the frame the last seek landed on, in RGBA8 at native size.
    fn capture(&mut self) -> Result<RgbaImage, SourceError>;

    /// Observe `token` while blocked inside `seek`, returning
    /// [`SourceError::Cancelled`] once it fires.
    ///
    /// Sources that never block for long can ignore this; the sampler
    /// checks the token around every seek anyway.
    fn watch_cancellation(&mut self, _token: CancellationToken) {}
}

impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    fn info(&self) -> SourceInfo {
        (**self).info()
    }

    fn seek(&mut self, timestamp: Duration, timeout: Duration) -> Result<(), SourceError> {
        (**self).seek(timestamp, timeout)
    }

    fn capture(&mut self) -> Result<RgbaImage, SourceError> {
        (**self).capture()
    }

    fn watch_cancellation(&mut self, token: CancellationToken) {
        (**self).watch_cancellation(token);
    }
}
