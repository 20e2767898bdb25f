//! Frame clock: which source timestamps to sample.
//!
//! The schedule holds `floor((end - start) * fps)` timestamps spaced exactly
//! `1 / fps` apart starting at `start`. Floor (not round) guarantees the
//! schedule never runs past the requested window.

use std::time::Duration;

use crate::error::ConversionError;
use crate::settings::ConversionSettings;

// Absorbs binary rounding in `(end - start) * fps`, e.g. (0.3 - 0.1) * 10.
const FRAME_COUNT_EPSILON: f64 = 1e-9;

/// Longest schedule a job will build: twenty minutes at 30 fps.
///
/// Sources without a known duration skip the end-of-window check, so this
/// is the only bound on such a window.
pub const MAX_FRAMES: u64 = 36_000;

/// An ordered, strictly increasing list of sample timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSchedule {
    timestamps: Vec<Duration>,
    fps: u32,
}

impl FrameSchedule {
    /// Number of frames to capture.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Always `false` for a schedule built by [`compute_schedule`].
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp of frame `index`.
    pub fn get(&self, index: usize) -> Option<Duration> {
        self.timestamps.get(index).copied()
    }

    /// All timestamps in capture order.
    pub fn timestamps(&self) -> &[Duration] {
        &self.timestamps
    }

    /// Output frame rate the schedule was built for.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Nominal spacing between consecutive entries.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }
}

/// Number of frames a window yields at `fps`.
pub fn frame_count(start: Duration, end: Duration, fps: u32) -> u64 {
    if end <= start || fps == 0 {
        return 0;
    }
    let span = (end - start).as_secs_f64();
    (span * f64::from(fps) + FRAME_COUNT_EPSILON).floor() as u64
}

/// Compute the sample timestamps for `settings`.
///
/// Pure and deterministic. Only the window and frame rate are inspected;
/// the remaining bounds are checked by
/// [`ConversionSettings::validate`].
///
/// # Errors
///
/// Returns [`ConversionError::InvalidRange`] if `end_time <= start_time`,
/// if the window is shorter than one frame interval, or if it would yield
/// more than [`MAX_FRAMES`] frames.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use vidgif::{ConversionSettings, compute_schedule};
///
/// let settings = ConversionSettings::new()
///     .with_fps(10)
///     .with_time_range(Duration::from_secs(1), Duration::from_secs(2));
/// let schedule = compute_schedule(&settings)?;
/// assert_eq!(schedule.len(), 10);
/// assert_eq!(schedule.get(0), Some(Duration::from_secs(1)));
/// # Ok::<(), vidgif::ConversionError>(())
/// ```
pub fn compute_schedule(settings: &ConversionSettings) -> Result<FrameSchedule, ConversionError> {
    let start = settings.start_time;
    let end = settings.end_time;
    let fps = settings.fps;

    if end <= start {
        return Err(ConversionError::InvalidRange(format!(
            "start ({start:?}) must be less than end ({end:?})"
        )));
    }
    if fps == 0 {
        return Err(ConversionError::InvalidRange(
            "frame rate must be greater than zero".to_string(),
        ));
    }

    let count = frame_count(start, end, fps);
    if count == 0 {
        return Err(ConversionError::InvalidRange(format!(
            "window {:.3}s-{:.3}s is shorter than one frame at {fps} fps",
            start.as_secs_f64(),
            end.as_secs_f64(),
        )));
    }
    if count > MAX_FRAMES {
        return Err(ConversionError::InvalidRange(format!(
            "window {:.3}s-{:.3}s at {fps} fps yields {count} frames (limit {MAX_FRAMES})",
            start.as_secs_f64(),
            end.as_secs_f64(),
        )));
    }

    let start_seconds = start.as_secs_f64();
    let timestamps: Vec<Duration> = (0..count)
        .map(|index| {
            // Index 0 is `start` exactly; later entries are computed from the
            // index so rounding does not accumulate.
            if index == 0 {
                start
            } else {
                let seconds = start_seconds + index as f64 / f64::from(fps);
                Duration::from_secs_f64(seconds).min(end)
            }
        })
        .collect();

    log::debug!(
        "Scheduled {} frames at {fps} fps between {:.3}s and {:.3}s",
        timestamps.len(),
        start_seconds,
        end.as_secs_f64(),
    );

    Ok(FrameSchedule { timestamps, fps })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(start: f64, end: f64, fps: u32) -> ConversionSettings {
        ConversionSettings::new()
            .with_fps(fps)
            .with_time_range(Duration::from_secs_f64(start), Duration::from_secs_f64(end))
    }

    #[test]
    fn length_is_floor_of_window_times_fps() {
        for &fps in &crate::settings::SUPPORTED_FRAME_RATES {
            for &(start, end) in &[(0.0, 5.0), (1.25, 3.9), (0.0, 0.35), (7.5, 9.99)] {
                let schedule = compute_schedule(&settings(start, end, fps)).unwrap();
                let expected = ((end - start) * f64::from(fps)).floor() as usize;
                assert_eq!(schedule.len(), expected, "{start}..{end} @ {fps}");
            }
        }
    }

    #[test]
    fn spacing_is_one_tick() {
        let schedule = compute_schedule(&settings(0.5, 4.0, 30)).unwrap();
        let tick = 1.0 / 30.0;
        for pair in schedule.timestamps().windows(2) {
            let delta = (pair[1] - pair[0]).as_secs_f64();
            assert!((delta - tick).abs() < 1e-6, "delta {delta}");
        }
    }

    #[test]
    fn first_is_start_and_last_within_window() {
        let s = settings(2.0, 3.0, 25);
        let schedule = compute_schedule(&s).unwrap();
        assert_eq!(schedule.get(0), Some(s.start_time));
        assert!(*schedule.timestamps().last().unwrap() <= s.end_time);
        assert!(schedule.timestamps().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn equal_start_and_end_is_invalid() {
        let result = compute_schedule(&settings(5.0, 5.0, 15));
        assert!(matches!(result, Err(ConversionError::InvalidRange(_))));
    }

    #[test]
    fn inverted_window_is_invalid() {
        let result = compute_schedule(&settings(6.0, 5.0, 15));
        assert!(matches!(result, Err(ConversionError::InvalidRange(_))));
    }

    #[test]
    fn window_shorter_than_a_frame_is_invalid() {
        let result = compute_schedule(&settings(0.0, 0.05, 10));
        assert!(matches!(result, Err(ConversionError::InvalidRange(_))));
    }

    #[test]
    fn rounding_does_not_drop_a_frame() {
        assert_eq!(
            frame_count(Duration::from_secs_f64(0.1), Duration::from_secs_f64(0.3), 10),
            2
        );
    }

    #[test]
    fn oversized_window_is_rejected_before_allocating() {
        let result = compute_schedule(&settings(0.0, 1e12, 30));
        assert!(matches!(result, Err(ConversionError::InvalidRange(_))));

        let limit = MAX_FRAMES as f64 / 30.0;
        assert_eq!(
            compute_schedule(&settings(0.0, limit, 30)).unwrap().len() as u64,
            MAX_FRAMES
        );
        assert!(compute_schedule(&settings(0.0, limit + 0.1, 30)).is_err());
    }

    #[test]
    fn five_seconds_at_fifteen() {
        let schedule = compute_schedule(&ConversionSettings::new()).unwrap();
        assert_eq!(schedule.len(), 75);
        assert_eq!(schedule.fps(), 15);
    }
}
