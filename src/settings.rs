//! What a conversion produces.
//!
//! [`ConversionSettings`] describes the output GIF: quality, frame rate, the
//! time window sampled from the source, and the output width. Settings are
//! immutable for the lifetime of a job and are only read by the pipeline.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use vidgif::ConversionSettings;
//!
//! let settings = ConversionSettings::new()
//!     .with_quality(90)
//!     .with_fps(20)
//!     .with_time_range(Duration::from_secs(2), Duration::from_secs(6))
//!     .with_width(320);
//!
//! assert!(settings.validate().is_ok());
//! assert_eq!(settings.encoder_quality(), 11);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::ConversionError;

/// Frame rates accepted by [`ConversionSettings::fps`].
pub const SUPPORTED_FRAME_RATES: [u32; 5] = [10, 15, 20, 25, 30];

/// Accepted caller-facing quality values (10 = worst, 100 = best).
pub const QUALITY_RANGE: RangeInclusive<u32> = 10..=100;

/// Accepted output widths in pixels.
pub const WIDTH_RANGE: RangeInclusive<u32> = 100..=800;

/// Longest window selected by [`ConversionSettings::for_duration`].
pub const DEFAULT_SELECTION: Duration = Duration::from_secs(10);

// Float slack when comparing the requested window against a container
// duration that was itself rounded to microseconds.
const DURATION_TOLERANCE: Duration = Duration::from_millis(1);

/// Output parameters for one conversion job.
///
/// The default is `quality 75, fps 15, 0s..5s, width 400`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSettings {
    /// Caller-facing quality, 10 (worst) to 100 (best).
    pub quality: u32,
    /// Output frame rate; one of [`SUPPORTED_FRAME_RATES`].
    pub fps: u32,
    /// Start of the sampled window.
    pub start_time: Duration,
    /// End of the sampled window (exclusive of any frame past it).
    pub end_time: Duration,
    /// Output width in pixels. Height follows the source aspect ratio.
    pub width: u32,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            quality: 75,
            fps: 15,
            start_time: Duration::ZERO,
            end_time: Duration::from_secs(5),
            width: 400,
        }
    }
}

impl Display for ConversionSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "quality {} @ {} fps, {}-{}, {}px wide",
            self.quality,
            self.fps,
            format_time(self.start_time),
            format_time(self.end_time),
            self.width,
        )
    }
}

impl ConversionSettings {
    /// Create settings with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a freshly loaded source: the window covers the first
    /// ten seconds, or the whole source if it is shorter. A zero (unknown)
    /// duration selects the full ten seconds.
    pub fn for_duration(duration: Duration) -> Self {
        let end_time = if duration.is_zero() {
            DEFAULT_SELECTION
        } else {
            duration.min(DEFAULT_SELECTION)
        };
        Self {
            end_time,
            ..Self::default()
        }
    }

    /// Set the quality (10–100).
    #[must_use]
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the output frame rate.
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the sampled time window.
    #[must_use]
    pub fn with_time_range(mut self, start: Duration, end: Duration) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Set the output width (100–800).
    #[must_use]
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    /// The encoder's internal quality control value.
    ///
    /// The encoder scale is inverted: `101 - quality`, so quality 100 maps
    /// to 1 (best) and quality 10 maps to 91.
    pub fn encoder_quality(&self) -> i32 {
        101 - self.quality as i32
    }

    /// Delay between output frames in milliseconds (`1000 / fps`).
    pub fn frame_delay_ms(&self) -> u32 {
        1000 / self.fps.max(1)
    }

    /// Length of the sampled window.
    pub fn window(&self) -> Duration {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Check every bound that does not depend on the source.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidRange`] naming the first violated
    /// bound.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if !QUALITY_RANGE.contains(&self.quality) {
            return Err(ConversionError::InvalidRange(format!(
                "quality {} is outside {}..={}",
                self.quality,
                QUALITY_RANGE.start(),
                QUALITY_RANGE.end(),
            )));
        }
        if !SUPPORTED_FRAME_RATES.contains(&self.fps) {
            return Err(ConversionError::InvalidRange(format!(
                "fps {} is not one of {SUPPORTED_FRAME_RATES:?}",
                self.fps,
            )));
        }
        if !WIDTH_RANGE.contains(&self.width) {
            return Err(ConversionError::InvalidRange(format!(
                "width {} is outside {}..={}",
                self.width,
                WIDTH_RANGE.start(),
                WIDTH_RANGE.end(),
            )));
        }
        if self.end_time <= self.start_time {
            return Err(ConversionError::InvalidRange(format!(
                "start ({:?}) must be less than end ({:?})",
                self.start_time, self.end_time,
            )));
        }
        Ok(())
    }

    /// Check the window against the duration of an opened source.
    ///
    /// A zero duration means the container did not report one; the upper
    /// bound is then left to the decoder.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidRange`] if the window ends past the
    /// source, or any error from [`validate`](ConversionSettings::validate).
    pub fn validate_for_source(&self, source_duration: Duration) -> Result<(), ConversionError> {
        self.validate()?;
        if source_duration.is_zero() {
            log::warn!("Source duration is unknown; skipping end-of-window check");
            return Ok(());
        }
        if self.end_time > source_duration + DURATION_TOLERANCE {
            return Err(ConversionError::InvalidRange(format!(
                "end ({:.3}s) exceeds source duration ({:.3}s)",
                self.end_time.as_secs_f64(),
                source_duration.as_secs_f64(),
            )));
        }
        Ok(())
    }
}

/// Format a timestamp as `m:ss`.
pub fn format_time(time: Duration) -> String {
    let total = time.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}
