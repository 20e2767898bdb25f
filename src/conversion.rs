//! FFmpeg frame and timestamp helpers shared by the decoder source.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use image::RgbaImage;

const RGBA_BYTES_PER_PIXEL: usize = 4;

/// FFmpeg's `AV_NOPTS_VALUE`.
const NO_PTS: i64 = i64::MIN;

/// Copy an RGBA FFmpeg frame into an [`RgbaImage`], dropping row padding.
///
/// Returns `None` if the frame holds less data than its dimensions claim.
pub(crate) fn frame_to_rgba(frame: &VideoFrame) -> Option<RgbaImage> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let row_bytes = width as usize * RGBA_BYTES_PER_PIXEL;
    let data = frame.data(0);

    if stride < row_bytes || data.len() < stride * (height as usize).saturating_sub(1) + row_bytes
    {
        return None;
    }

    let buffer = if stride == row_bytes {
        data[..row_bytes * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            buffer.extend_from_slice(&row[..row_bytes]);
        }
        buffer
    };
    RgbaImage::from_raw(width, height, buffer)
}

fn rescale(value: i64, time_base: Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    value as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// A stream's `start_time` in seconds, or `0.0` when it is unset.
pub(crate) fn stream_origin(start_time: i64, time_base: Rational) -> f64 {
    if start_time == NO_PTS {
        return 0.0;
    }
    rescale(start_time, time_base)
}

/// Rescale a PTS value to seconds on the clip's own timeline, where
/// `origin` (from [`stream_origin`]) is zero.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational, origin: f64) -> f64 {
    rescale(pts, time_base) - origin
}

/// Container seek target in `AV_TIME_BASE` units (microseconds) for a
/// clip-relative `target`.
///
/// `Input::seek` with no stream index expects this base rather than the
/// stream's own time base, and absolute rather than clip-relative time.
pub(crate) fn seek_timestamp(target: Duration, origin: f64) -> i64 {
    let micros = (target.as_secs_f64() + origin) * 1_000_000.0;
    micros.round().clamp(i64::MIN as f64, i64::MAX as f64) as i64
}

/// Half the interval between source frames, or a 1/60 s fallback when the
/// stream does not report a usable rate.
pub(crate) fn half_frame_interval(rate: Rational) -> f64 {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return 0.5 / 60.0;
    }
    0.5 * f64::from(rate.denominator()) / f64::from(rate.numerator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_rescale() {
        assert_eq!(pts_to_seconds(90_000, Rational::new(1, 90_000), 0.0), 1.0);
        assert_eq!(pts_to_seconds(15, Rational::new(1, 30), 0.0), 0.5);
        assert_eq!(pts_to_seconds(15, Rational::new(1, 0), 0.0), 0.0);
    }

    #[test]
    fn origin_is_unset_start_time() {
        assert_eq!(stream_origin(NO_PTS, Rational::new(1, 90_000)), 0.0);
        assert_eq!(stream_origin(126_000, Rational::new(1, 90_000)), 1.4);
    }

    #[test]
    fn offset_stream_maps_to_clip_time() {
        // MPEG-TS style stream whose first packet is stamped 1.4s.
        let time_base = Rational::new(1, 90_000);
        let origin = stream_origin(126_000, time_base);
        assert_eq!(pts_to_seconds(126_000, time_base, origin), 0.0);
        let half = pts_to_seconds(171_000, time_base, origin);
        assert!((half - 0.5).abs() < 1e-9, "{half}");
    }

    #[test]
    fn seek_target_in_microseconds() {
        assert_eq!(seek_timestamp(Duration::from_millis(1500), 0.0), 1_500_000);
        assert_eq!(seek_timestamp(Duration::from_millis(1500), 1.4), 2_900_000);
        assert_eq!(seek_timestamp(Duration::ZERO, -0.25), -250_000);
    }

    #[test]
    fn half_interval_from_rate() {
        assert!((half_frame_interval(Rational::new(25, 1)) - 0.02).abs() < 1e-12);
        assert!((half_frame_interval(Rational::new(0, 0)) - 0.5 / 60.0).abs() < 1e-12);
    }
}
