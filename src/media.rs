//! FFmpeg-backed [`MediaSource`].
//!
//! [`FfmpegSource`] opens a [`MediaResource`] (a file path, a URL FFmpeg can
//! read, or an in-memory byte buffer) and decodes the best video stream.
//! Seeking jumps the container to the nearest preceding keyframe when the
//! target is behind the decoder or far ahead of it, then decodes forward to
//! the first frame whose timestamp reaches the target. Captured frames are
//! converted to RGBA at the stream's native size.
//!
//! Timestamps are measured from the stream's first frame, so clips whose
//! container clock starts late (MPEG-TS, MP4 edit lists) sample the same
//! frames as clips starting at zero.
//!
//! The demuxer is opened with an interrupt callback. While a seek is in
//! progress, FFmpeg's blocking reads give up once the seek deadline passes
//! or a watched [`CancellationToken`] fires.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbaImage;
use tempfile::NamedTempFile;

use crate::conversion::{
    frame_to_rgba, half_frame_interval, pts_to_seconds, seek_timestamp, stream_origin,
};
use crate::error::ConversionError;
use crate::progress::CancellationToken;
use crate::source::{MediaSource, SourceError, SourceInfo};

/// Targets further ahead than this trigger a container seek instead of
/// decoding every intermediate frame.
const FORWARD_DECODE_LIMIT: f64 = 2.0;

/// Something FFmpeg can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaResource {
    /// A local file.
    Path(PathBuf),
    /// A URL understood by FFmpeg's protocol layer (`http://`, `file://`, …).
    Url(String),
    /// An encoded file held in memory. Spilled to a temporary file that is
    /// removed when the source is dropped.
    Bytes(Vec<u8>),
}

impl MediaResource {
    fn describe(&self) -> String {
        self.to_string()
    }
}

impl Display for MediaResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaResource::Path(path) => write!(f, "{}", path.display()),
            MediaResource::Url(url) => f.write_str(url),
            MediaResource::Bytes(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

impl From<&str> for MediaResource {
    fn from(value: &str) -> Self {
        if value.contains("://") {
            MediaResource::Url(value.to_string())
        } else {
            MediaResource::Path(PathBuf::from(value))
        }
    }
}

impl From<String> for MediaResource {
    fn from(value: String) -> Self {
        MediaResource::from(value.as_str())
    }
}

impl From<&Path> for MediaResource {
    fn from(value: &Path) -> Self {
        MediaResource::Path(value.to_path_buf())
    }
}

impl From<PathBuf> for MediaResource {
    fn from(value: PathBuf) -> Self {
        MediaResource::Path(value)
    }
}

impl From<Vec<u8>> for MediaResource {
    fn from(value: Vec<u8>) -> Self {
        MediaResource::Bytes(value)
    }
}

/// Why the interrupt callback stopped a blocking FFmpeg call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interruption {
    Deadline,
    Cancelled,
}

impl From<Interruption> for SourceError {
    fn from(reason: Interruption) -> Self {
        match reason {
            Interruption::Deadline => SourceError::Timeout,
            Interruption::Cancelled => SourceError::Cancelled,
        }
    }
}

/// State shared with FFmpeg's interrupt callback.
///
/// Armed with a deadline for the duration of one seek; the callback only
/// interrupts while armed or once the watched token has fired.
#[derive(Default)]
struct InterruptGuard {
    deadline: Mutex<Option<Instant>>,
    cancellation: Mutex<Option<CancellationToken>>,
    tripped: Mutex<Option<Interruption>>,
}

impl InterruptGuard {
    fn check(&self) -> Option<Interruption> {
        let cancelled = self
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled);
        if cancelled {
            return Some(Interruption::Cancelled);
        }
        let deadline = *self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        match deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::Deadline),
            _ => None,
        }
    }

    /// Called by FFmpeg from inside blocking I/O.
    fn should_interrupt(&self) -> bool {
        let Some(reason) = self.check() else {
            return false;
        };
        *self.tripped.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason);
        true
    }

    fn arm(&self, deadline: Option<Instant>) {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) = deadline;
        *self.tripped.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn disarm(&self) {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn watch(&self, token: CancellationToken) {
        *self
            .cancellation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn take_tripped(&self) -> Option<Interruption> {
        self.tripped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// A decoder handle over the best video stream of a resource.
///
/// Owned by one conversion job; dropping it closes the demuxer and removes
/// any temporary file backing an in-memory resource.
pub struct FfmpegSource {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    scaler_input: (u32, u32),
    stream_index: usize,
    time_base: Rational,
    // Stream start time in seconds; subtracted from every PTS.
    origin: f64,
    tolerance: f64,
    interrupt: Arc<InterruptGuard>,
    info: SourceInfo,
    decoded: VideoFrame,
    pending: VideoFrame,
    rgba: VideoFrame,
    position: Option<f64>,
    eof_sent: bool,
    description: String,
    // Dropped after `input` so the demuxer closes before the file goes.
    _spill: Option<NamedTempFile>,
}

impl FfmpegSource {
    /// Open `resource` and prepare its best video stream for decoding.
    ///
    /// # Errors
    ///
    /// - [`ConversionError::SourceOpen`] if FFmpeg cannot open the resource,
    ///   it has no video stream, or the stream reports no dimensions.
    /// - [`ConversionError::ContextUnavailable`] if no RGBA conversion
    ///   context can be built for the stream's pixel format.
    /// - [`ConversionError::IoError`] if an in-memory resource cannot be
    ///   spilled to disk.
    pub fn open(resource: impl Into<MediaResource>) -> Result<Self, ConversionError> {
        let resource = resource.into();
        let description = resource.describe();
        let open_error = |reason: String| ConversionError::SourceOpen {
            resource: description.clone(),
            reason,
        };

        log::debug!("Opening media source: {description}");

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let interrupt = Arc::new(InterruptGuard::default());
        let callback_guard = Arc::clone(&interrupt);
        let callback = move || callback_guard.should_interrupt();

        let mut spill = None;
        let input = match &resource {
            MediaResource::Path(path) => ffmpeg_next::format::input_with_interrupt(path, callback),
            MediaResource::Url(url) => ffmpeg_next::format::input_with_interrupt(url, callback),
            MediaResource::Bytes(bytes) => {
                let mut file = NamedTempFile::new()?;
                file.write_all(bytes)?;
                file.flush()?;
                let opened = ffmpeg_next::format::input_with_interrupt(file.path(), callback);
                spill = Some(file);
                opened
            }
        }
        .map_err(|error| open_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| open_error("no video stream".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let origin = stream_origin(stream.start_time(), time_base);
        let tolerance = half_frame_interval(stream.avg_frame_rate());

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| open_error(format!("cannot create video decoder: {error}")))?;

        let (width, height) = (decoder.width(), decoder.height());
        if width == 0 || height == 0 {
            return Err(open_error("video stream reports no dimensions".to_string()));
        }

        let duration = match input.duration() {
            micros if micros > 0 => Duration::from_micros(micros as u64),
            _ => Duration::ZERO,
        };

        let scaler = rgba_scaler(decoder.format(), width, height)?;

        log::info!(
            "Opened {description}: {width}x{height}, {:.3}s, codec {:?}",
            duration.as_secs_f64(),
            decoder.id(),
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            scaler_input: (width, height),
            stream_index,
            time_base,
            origin,
            tolerance,
            interrupt,
            info: SourceInfo {
                duration,
                width,
                height,
            },
            decoded: VideoFrame::empty(),
            pending: VideoFrame::empty(),
            rgba: VideoFrame::empty(),
            position: None,
            eof_sent: false,
            description,
            _spill: spill,
        })
    }

    /// Timestamp of the frame the decoder is positioned on, in seconds.
    pub fn position(&self) -> Option<f64> {
        self.position
    }

    fn needs_container_seek(&self, target: f64) -> bool {
        match self.position {
            None => target > self.tolerance,
            Some(current) => {
                target < current - self.tolerance || target - current > FORWARD_DECODE_LIMIT
            }
        }
    }

    fn container_seek(&mut self, target: Duration) -> Result<(), SourceError> {
        let timestamp = seek_timestamp(target, self.origin);
        log::trace!(
            "{}: container seek to {:.3}s",
            self.description,
            target.as_secs_f64()
        );
        if let Err(error) = self.input.seek(timestamp, ..timestamp) {
            return Err(self.interrupted_or(|| {
                SourceError::Decode(format!("container seek failed: {error}"))
            }));
        }
        self.decoder.flush();
        self.position = None;
        self.eof_sent = false;
        Ok(())
    }

    fn feed_packet(&mut self) -> Result<(), SourceError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                if packet.stream() == self.stream_index {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|error| SourceError::Decode(error.to_string()))?;
                }
                Ok(())
            }
            Err(FfmpegError::Eof) => {
                self.decoder
                    .send_eof()
                    .map_err(|error| SourceError::Decode(error.to_string()))?;
                self.eof_sent = true;
                Ok(())
            }
            Err(error) => Err(self.interrupted_or(|| SourceError::Disconnected(error.to_string()))),
        }
    }

    /// The interruption behind a failed FFmpeg call, or `fallback` if the
    /// callback did not fire.
    fn interrupted_or(&self, fallback: impl FnOnce() -> SourceError) -> SourceError {
        match self.interrupt.take_tripped() {
            Some(reason) => reason.into(),
            None => fallback(),
        }
    }

    fn seek_until(&mut self, target: Duration) -> Result<(), SourceError> {
        let target_seconds = target.as_secs_f64();

        if self.needs_container_seek(target_seconds) {
            self.container_seek(target)?;
        }

        loop {
            if let Some(current) = self.position {
                if current >= target_seconds - self.tolerance {
                    return Ok(());
                }
            }
            if let Some(reason) = self.interrupt.check() {
                return Err(reason.into());
            }

            match self.decoder.receive_frame(&mut self.pending) {
                Ok(()) => {
                    let pts = self
                        .pending
                        .timestamp()
                        .or_else(|| self.pending.pts())
                        .unwrap_or(0);
                    std::mem::swap(&mut self.decoded, &mut self.pending);
                    self.position = Some(pts_to_seconds(pts, self.time_base, self.origin));
                }
                Err(_) if self.eof_sent => {
                    // Drained: a target past the last frame lands on it.
                    return match self.position {
                        Some(last) => {
                            log::debug!(
                                "{}: {target_seconds:.3}s is past the last frame ({last:.3}s)",
                                self.description
                            );
                            Ok(())
                        }
                        None => Err(SourceError::Decode(format!(
                            "stream ended before {target_seconds:.3}s"
                        ))),
                    };
                }
                Err(_) => self.feed_packet()?,
            }
        }
    }
}

fn rgba_scaler(format: Pixel, width: u32, height: u32) -> Result<ScalingContext, SourceError> {
    ScalingContext::get(
        format,
        width,
        height,
        Pixel::RGBA,
        width,
        height,
        ScalingFlags::BILINEAR,
    )
    .map_err(|error| {
        SourceError::ContextUnavailable(format!(
            "no RGBA conversion for {format:?} {width}x{height}: {error}"
        ))
    })
}

impl MediaSource for FfmpegSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn seek(&mut self, timestamp: Duration, timeout: Duration) -> Result<(), SourceError> {
        // `None` only for timeouts too large to represent; no deadline then.
        self.interrupt.arm(Instant::now().checked_add(timeout));
        let result = self.seek_until(timestamp);
        self.interrupt.disarm();
        result
    }

    fn capture(&mut self) -> Result<RgbaImage, SourceError> {
        if self.position.is_none() {
            return Err(SourceError::Decode(
                "no decoded frame to capture".to_string(),
            ));
        }

        let native = (self.decoded.width(), self.decoded.height());
        if native != self.scaler_input {
            log::debug!(
                "{}: frame size changed from {}x{} to {}x{}",
                self.description,
                self.scaler_input.0,
                self.scaler_input.1,
                native.0,
                native.1,
            );
            self.scaler = rgba_scaler(self.decoded.format(), native.0, native.1)?;
            self.scaler_input = native;
        }

        self.scaler
            .run(&self.decoded, &mut self.rgba)
            .map_err(|error| SourceError::Decode(format!("pixel conversion failed: {error}")))?;
        frame_to_rgba(&self.rgba).ok_or_else(|| {
            SourceError::Decode("converted frame is smaller than its dimensions".to_string())
        })
    }

    fn watch_cancellation(&mut self, token: CancellationToken) {
        self.interrupt.watch(token);
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        log::debug!("Closing media source: {}", self.description);
    }
}
