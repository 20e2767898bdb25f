//! Lazy, pull-based frame sampler.
//!
//! [`FrameSampler`] walks a [`FrameSchedule`] and, for each entry, seeks the
//! source and captures one frame. Seeks are issued strictly one at a time:
//! the source has a single capture surface that must reflect one decoded
//! position. The sampler is finite and fused; after the last entry or after
//! any error it yields `None`, and it cannot be restarted.

use std::time::Duration;

use crate::clock::FrameSchedule;
use crate::error::{CapturePosition, ConversionError};
use crate::progress::CancellationToken;
use crate::source::{MediaSource, RawFrame, SourceError};

/// Iterator of [`RawFrame`]s, one per schedule entry, in schedule order.
pub struct FrameSampler<'a, S: MediaSource + ?Sized> {
    source: &'a mut S,
    schedule: &'a FrameSchedule,
    next_index: usize,
    seek_timeout: Duration,
    cancellation: Option<CancellationToken>,
    last_captured: Option<CapturePosition>,
    done: bool,
}

impl<'a, S: MediaSource + ?Sized> FrameSampler<'a, S> {
    /// Sample `schedule` from `source`.
    pub fn new(source: &'a mut S, schedule: &'a FrameSchedule, seek_timeout: Duration) -> Self {
        Self {
            source,
            schedule,
            next_index: 0,
            seek_timeout,
            cancellation: None,
            last_captured: None,
            done: false,
        }
    }

    /// Stop with [`ConversionError::Cancelled`] once `token` is cancelled.
    ///
    /// The token is also handed to the source so a blocked seek can give up.
    #[must_use]
    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        if let Some(token) = &token {
            self.source.watch_cancellation(token.clone());
        }
        self.cancellation = token;
        self
    }

    /// The last frame handed out, if any.
    pub fn last_captured(&self) -> Option<CapturePosition> {
        self.last_captured
    }

    /// Frames remaining in the schedule.
    pub fn remaining(&self) -> usize {
        if self.done {
            0
        } else {
            self.schedule.len() - self.next_index
        }
    }

    fn check_cancelled(&self) -> Result<(), ConversionError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Err(ConversionError::Cancelled {
                frames_completed: self.next_index as u64,
            });
        }
        Ok(())
    }

    fn sample(&mut self, index: usize, timestamp: Duration) -> Result<RawFrame, ConversionError> {
        self.check_cancelled()?;

        self.source
            .seek(timestamp, self.seek_timeout)
            .map_err(|error| self.map_source_error(error, index, timestamp))?;

        // A cancel that arrived while the decoder was busy wins over the
        // frame it just produced.
        self.check_cancelled()?;

        let pixels = self
            .source
            .capture()
            .map_err(|error| self.map_source_error(error, index, timestamp))?;

        Ok(RawFrame {
            index: index as u64,
            timestamp,
            pixels,
        })
    }

    fn map_source_error(
        &self,
        error: SourceError,
        index: usize,
        timestamp: Duration,
    ) -> ConversionError {
        match error {
            SourceError::Timeout => ConversionError::SeekTimeout {
                frame_index: index as u64,
                timestamp,
                timeout: self.seek_timeout,
                last_captured: self.last_captured,
            },
            SourceError::ContextUnavailable(reason) => ConversionError::ContextUnavailable(reason),
            SourceError::Cancelled => ConversionError::Cancelled {
                frames_completed: index as u64,
            },
            SourceError::Decode(reason) | SourceError::Disconnected(reason) => {
                ConversionError::decode(
                    format!("frame {index} at {:.3}s: {reason}", timestamp.as_secs_f64()),
                    self.last_captured,
                )
            }
        }
    }
}

impl<S: MediaSource + ?Sized> Iterator for FrameSampler<'_, S> {
    type Item = Result<RawFrame, ConversionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let index = self.next_index;
        let Some(timestamp) = self.schedule.get(index) else {
            self.done = true;
            return None;
        };

        match self.sample(index, timestamp) {
            Ok(frame) => {
                self.next_index += 1;
                self.last_captured = Some(CapturePosition {
                    frame_index: frame.index,
                    timestamp,
                });
                log::trace!("Captured frame {index} at {:.3}s", timestamp.as_secs_f64());
                Some(Ok(frame))
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl<S: MediaSource + ?Sized> std::iter::FusedIterator for FrameSampler<'_, S> {}
