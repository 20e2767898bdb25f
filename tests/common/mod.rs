//! Deterministic in-process media sources shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use vidgif::{
    CancellationToken, MediaSource, ProgressCallback, ProgressEvent, SourceError, SourceInfo,
};

type SeekHook = Box<dyn FnMut(usize) + Send>;

/// A moving gradient whose pixels depend only on the timestamp.
pub struct SyntheticSource {
    info: SourceInfo,
    position: Option<Duration>,
    seeks: usize,
    drops: Arc<AtomicUsize>,
    fail_at: Option<(usize, fn() -> SourceError)>,
    resize_at: Option<usize>,
    seek_delay: Duration,
    on_seek: Option<SeekHook>,
    watched: Option<CancellationToken>,
    watching: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(duration: Duration, width: u32, height: u32) -> Self {
        Self {
            info: SourceInfo {
                duration,
                width,
                height,
            },
            position: None,
            seeks: 0,
            drops: Arc::new(AtomicUsize::new(0)),
            fail_at: None,
            resize_at: None,
            seek_delay: Duration::ZERO,
            on_seek: None,
            watched: None,
            watching: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Ten seconds of 640x360.
    pub fn ten_seconds() -> Self {
        Self::new(Duration::from_secs(10), 640, 360)
    }

    /// Incremented once when this source is dropped.
    pub fn drop_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.drops)
    }

    /// Fail the seek with zero-based index `seek` using `error`.
    pub fn failing_at(mut self, seek: usize, error: fn() -> SourceError) -> Self {
        self.fail_at = Some((seek, error));
        self
    }

    /// Frames captured from seek `seek` onwards are one pixel wider.
    pub fn resizing_at(mut self, seek: usize) -> Self {
        self.resize_at = Some(seek);
        self
    }

    /// Every seek takes `delay`, and reports a timeout when that exceeds
    /// the caller's limit.
    pub fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = delay;
        self
    }

    /// Incremented each time the pipeline hands this source a token.
    pub fn watch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.watching)
    }

    /// Run `hook` with the seek index before every seek.
    pub fn on_seek(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.on_seek = Some(Box::new(hook));
        self
    }
}

impl MediaSource for SyntheticSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn seek(&mut self, timestamp: Duration, timeout: Duration) -> Result<(), SourceError> {
        let index = self.seeks;
        self.seeks += 1;
        if let Some(hook) = self.on_seek.as_mut() {
            hook(index);
        }
        if let Some((at, error)) = self.fail_at {
            if at == index {
                return Err(error());
            }
        }
        if !self.seek_delay.is_zero() {
            thread::sleep(self.seek_delay.min(timeout));
            if self.watched.as_ref().is_some_and(|token| token.is_cancelled()) {
                return Err(SourceError::Cancelled);
            }
            if self.seek_delay > timeout {
                return Err(SourceError::Timeout);
            }
        }
        self.position = Some(timestamp.min(self.info.duration));
        Ok(())
    }

    fn capture(&mut self) -> Result<RgbaImage, SourceError> {
        let Some(position) = self.position else {
            return Err(SourceError::Decode("capture before seek".to_string()));
        };
        let grow = match self.resize_at {
            Some(at) if self.seeks > at => 1,
            _ => 0,
        };
        let phase = (position.as_millis() / 10) as u32;
        Ok(RgbaImage::from_fn(
            self.info.width + grow,
            self.info.height,
            |x, y| {
                Rgba([
                    ((x + phase) % 256) as u8,
                    ((y * 2 + phase / 3) % 256) as u8,
                    ((x ^ y) % 256) as u8,
                    255,
                ])
            },
        ))
    }

    fn watch_cancellation(&mut self, token: CancellationToken) {
        self.watching.fetch_add(1, Ordering::SeqCst);
        self.watched = Some(token);
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects every progress event.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
