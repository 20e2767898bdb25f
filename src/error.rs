//! Error types for the `vidgif` crate.
//!
//! This module defines [`ConversionError`], the single error type returned by
//! every fallible operation in the crate. A conversion job ends with exactly
//! one [`ConversionResult`](crate::ConversionResult) or exactly one
//! `ConversionError`; none of the variants are retried internally.
//!
//! Errors raised after capture has started carry the last successfully
//! captured frame ([`CapturePosition`]) so callers can explain how far the
//! job got before it failed.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::{io::Error as IoError, time::Duration};

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::source::SourceError;

/// Index and timestamp of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePosition {
    /// Zero-based index into the frame schedule.
    pub frame_index: u64,
    /// Source timestamp the frame was sampled at.
    pub timestamp: Duration,
}

impl Display for CapturePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "frame {} at {:.3}s",
            self.frame_index,
            self.timestamp.as_secs_f64()
        )
    }
}

/// Coarse classification of a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Settings or time window out of bounds.
    InvalidRange,
    /// The decoder could not open the resource.
    SourceOpen,
    /// A seek did not land within the configured timeout.
    SeekTimeout,
    /// The source failed mid-sequence.
    Decode,
    /// The source changed native dimensions mid-stream.
    DimensionMismatch,
    /// Quantisation or GIF writing failed.
    Encode,
    /// The job was cancelled through its token.
    Cancelled,
    /// The API was used out of order.
    InvalidState,
    /// A pixel conversion context could not be created.
    ContextUnavailable,
    /// Reading or writing a file failed.
    Io,
}

/// The unified error type for all `vidgif` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    /// Settings are out of bounds, or the time window is empty or exceeds
    /// the source duration.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The media resource could not be opened by the decoder.
    #[error("Failed to open media source {resource}: {reason}")]
    SourceOpen {
        /// Path, URL, or description of the resource.
        resource: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The decoder did not land on a target timestamp in time.
    #[error(
        "Seek to {:.3}s (frame {frame_index}) did not complete within {timeout:?}{}",
        .timestamp.as_secs_f64(),
        describe_last(.last_captured)
    )]
    SeekTimeout {
        /// Schedule index of the frame being sought.
        frame_index: u64,
        /// Target timestamp.
        timestamp: Duration,
        /// The timeout that elapsed.
        timeout: Duration,
        /// The last frame captured before the timeout, if any.
        last_captured: Option<CapturePosition>,
    },

    /// The source errored or disconnected mid-sequence.
    #[error("Failed to decode source: {reason}{}", describe_last(.last_captured))]
    DecodeError {
        /// What went wrong.
        reason: String,
        /// The last frame captured before the failure, if any.
        last_captured: Option<CapturePosition>,
    },

    /// A frame reported native dimensions different from the first frame.
    #[error(
        "Frame {frame_index} is {}x{} but the job started at {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    DimensionMismatch {
        /// Schedule index of the offending frame.
        frame_index: u64,
        /// Dimensions fixed by the first frame.
        expected: (u32, u32),
        /// Dimensions the offending frame reported.
        actual: (u32, u32),
    },

    /// Quantisation or GIF writing failed. No partial output is kept.
    #[error("GIF encoding error: {0}")]
    EncodeError(String),

    /// The job was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Conversion cancelled after {frames_completed} frames")]
    Cancelled {
        /// Frames fully processed by the stage that observed cancellation.
        frames_completed: u64,
    },

    /// An operation was invoked in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The pixel conversion context for the source could not be created.
    #[error("Rendering context unavailable: {0}")]
    ContextUnavailable(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

fn describe_last(position: &Option<CapturePosition>) -> String {
    match position {
        Some(position) => format!(" (last captured {position})"),
        None => " (no frames captured)".to_string(),
    }
}

impl ConversionError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::InvalidRange(_) => ErrorKind::InvalidRange,
            ConversionError::SourceOpen { .. } => ErrorKind::SourceOpen,
            ConversionError::SeekTimeout { .. } => ErrorKind::SeekTimeout,
            ConversionError::DecodeError { .. } => ErrorKind::Decode,
            ConversionError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            ConversionError::EncodeError(_) => ErrorKind::Encode,
            ConversionError::Cancelled { .. } => ErrorKind::Cancelled,
            ConversionError::InvalidState(_) => ErrorKind::InvalidState,
            ConversionError::ContextUnavailable(_) => ErrorKind::ContextUnavailable,
            ConversionError::IoError(_) => ErrorKind::Io,
        }
    }

    /// The last frame successfully captured before this error, when known.
    pub fn last_position(&self) -> Option<CapturePosition> {
        match self {
            ConversionError::DecodeError { last_captured, .. }
            | ConversionError::SeekTimeout { last_captured, .. } => *last_captured,
            _ => None,
        }
    }

    pub(crate) fn decode(reason: impl Into<String>, last_captured: Option<CapturePosition>) -> Self {
        ConversionError::DecodeError {
            reason: reason.into(),
            last_captured,
        }
    }
}

impl From<ImageError> for ConversionError {
    fn from(error: ImageError) -> Self {
        ConversionError::EncodeError(format!("image processing failed: {error}"))
    }
}

impl From<SourceError> for ConversionError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::ContextUnavailable(reason) => ConversionError::ContextUnavailable(reason),
            SourceError::Cancelled => ConversionError::Cancelled {
                frames_completed: 0,
            },
            other => ConversionError::decode(other.to_string(), None),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<FfmpegError> for ConversionError {
    fn from(error: FfmpegError) -> Self {
        ConversionError::decode(format!("FFmpeg error: {error}"), None)
    }
}
