//! Animated GIF encoding with a per-job quantiser pool.
//!
//! [`EncodingJob`] owns the GIF writer and a bounded pool of worker threads.
//! Each frame handed to [`add_frame`](EncodingJob::add_frame) is quantised
//! to a 256-colour palette (NeuQuant) on a worker; the job collects the
//! results, puts them back in submission order, and writes them to the
//! stream. [`finalize`](EncodingJob::finalize) waits for the remaining
//! workers, writes the trailer, and returns the finished
//! [`ConversionResult`].
//!
//! The pool lives exactly as long as the job. Dropping a job (finished,
//! failed, or abandoned) stops queued work and blocks until every worker
//! thread has exited.
//!
//! # Example
//!
//! ```
//! use image::{Rgba, RgbaImage};
//! use vidgif::{ConversionOptions, EncodingJob, ResizedFrame};
//!
//! let mut job = EncodingJob::open(32, 16, 26, &ConversionOptions::new())?;
//! for index in 0..3 {
//!     let shade = (index * 80) as u8;
//!     job.add_frame(ResizedFrame {
//!         index,
//!         pixels: RgbaImage::from_pixel(32, 16, Rgba([shade, 0, 255 - shade, 255])),
//!         delay_ms: 100,
//!     })?;
//! }
//! let gif = job.finalize_silently()?;
//! assert_eq!(gif.frame_count, 3);
//! assert_eq!(gif.mime_type, "image/gif");
//! # Ok::<(), vidgif::ConversionError>(())
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use color_quant::NeuQuant;
use gif::{Encoder, Frame, Repeat};
use image::RgbaImage;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::configuration::ConversionOptions;
use crate::error::ConversionError;
use crate::progress::{CancellationToken, NoOpProgress, Phase, ProgressTracker};
use crate::rasterizer::ResizedFrame;

/// MIME type of every stream this crate produces.
pub const GIF_MIME_TYPE: &str = "image/gif";

/// Colours per frame palette.
const PALETTE_SIZE: usize = 256;

/// How often a blocked `finalize` re-checks the cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long dropping a pool waits for its threads before giving up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker threads alive across every job in the process.
static LIVE_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Number of quantiser worker threads currently alive in this process.
///
/// Drops back to zero once every [`EncodingJob`] has been finalized or
/// dropped.
pub fn live_workers() -> usize {
    LIVE_WORKERS.load(Ordering::Acquire)
}

/// A finished GIF held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    /// The complete GIF stream, header to trailer.
    pub bytes: Vec<u8>,
    /// Always [`GIF_MIME_TYPE`].
    pub mime_type: &'static str,
    /// Logical screen width.
    pub width: u32,
    /// Logical screen height.
    pub height: u32,
    /// Number of frames in the stream.
    pub frame_count: u64,
    /// Requested display time per frame in milliseconds.
    pub frame_delay_ms: u32,
}

impl ConversionResult {
    /// Size of the stream in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` if the stream is empty (never the case for a finished job).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the stream to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::IoError`] if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConversionError> {
        log::debug!(
            "Writing {} byte GIF to {}",
            self.bytes.len(),
            path.as_ref().display()
        );
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Consume the result, keeping only the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// One frame after colour reduction.
#[derive(Debug)]
pub(crate) struct QuantizedFrame {
    palette: Vec<u8>,
    indices: Vec<u8>,
}

type Quantizer = fn(&RgbaImage, i32) -> QuantizedFrame;

/// Reduce `pixels` to a 256-colour palette and per-pixel indices.
///
/// `sample_factor` is the NeuQuant sampling interval: 1 inspects every
/// pixel (best), larger values inspect fewer.
pub(crate) fn quantize_frame(pixels: &RgbaImage, sample_factor: i32) -> QuantizedFrame {
    let raw = pixels.as_raw();
    let quantizer = NeuQuant::new(sample_factor.max(1), PALETTE_SIZE, raw);
    let indices = raw
        .chunks_exact(4)
        .map(|pixel| quantizer.index_of(pixel) as u8)
        .collect();
    QuantizedFrame {
        palette: quantizer.color_map_rgb(),
        indices,
    }
}

type WorkerMessage = (u64, Result<QuantizedFrame, String>);

#[derive(Default)]
struct ExitCounter {
    exited: Mutex<usize>,
    changed: Condvar,
}

/// A rayon pool whose drop waits for all of its threads to exit.
pub(crate) struct WorkerPool {
    pool: Option<ThreadPool>,
    threads: usize,
    exits: Arc<ExitCounter>,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize) -> Result<Self, ConversionError> {
        let threads = threads.max(1);
        let exits = Arc::new(ExitCounter::default());
        let exit_counter = Arc::clone(&exits);

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("vidgif-quantize-{index}"))
            .start_handler(|_| {
                LIVE_WORKERS.fetch_add(1, Ordering::AcqRel);
            })
            .exit_handler(move |_| {
                LIVE_WORKERS.fetch_sub(1, Ordering::AcqRel);
                let mut exited = exit_counter
                    .exited
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                *exited += 1;
                exit_counter.changed.notify_all();
            })
            .build()
            .map_err(|error| {
                ConversionError::EncodeError(format!("failed to start worker pool: {error}"))
            })?;

        Ok(Self {
            pool: Some(pool),
            threads,
            exits,
        })
    }

    pub(crate) fn threads(&self) -> usize {
        self.threads
    }

    fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(pool) = &self.pool {
            pool.spawn(task);
        }
    }

    #[cfg(test)]
    fn exited(&self) -> usize {
        *self
            .exits
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        drop(pool);

        let exited = self
            .exits
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (exited, timeout) = self
            .exits
            .changed
            .wait_timeout_while(exited, SHUTDOWN_TIMEOUT, |exited| *exited < self.threads)
            .unwrap_or_else(PoisonError::into_inner);
        if timeout.timed_out() {
            log::warn!(
                "Quantiser pool shutdown timed out with {} of {} workers still running",
                self.threads - *exited,
                self.threads,
            );
        } else {
            log::trace!("Quantiser pool of {} workers shut down", self.threads);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Open,
    Finalized,
    Failed,
}

/// Accumulates frames in capture order and produces one GIF.
///
/// See the [module documentation](self) for the threading model.
pub struct EncodingJob {
    width: u32,
    height: u32,
    sample_factor: i32,
    frame_delay_ms: Option<u32>,
    encoder: Option<Encoder<Vec<u8>>>,
    // Declared before `pool` so queued tasks see a closed channel on drop.
    sender: Option<Sender<WorkerMessage>>,
    receiver: Receiver<WorkerMessage>,
    pool: WorkerPool,
    abort: Arc<AtomicBool>,
    reorder: BTreeMap<u64, QuantizedFrame>,
    submitted: u64,
    written: u64,
    cancellation: Option<CancellationToken>,
    quantizer: Quantizer,
    status: JobStatus,
}

impl EncodingJob {
    /// Start a GIF of `width` x `height` with the given encoder quality
    /// (1 = best; see
    /// [`ConversionSettings::encoder_quality`](crate::ConversionSettings::encoder_quality)).
    ///
    /// The worker count, loop count, and cancellation token come from
    /// `options`.
    ///
    /// # Errors
    ///
    /// - [`ConversionError::InvalidRange`] for dimensions a GIF cannot hold
    ///   or a non-positive quality.
    /// - [`ConversionError::EncodeError`] if the pool or the stream header
    ///   cannot be created.
    pub fn open(
        width: u32,
        height: u32,
        encoder_quality: i32,
        options: &ConversionOptions,
    ) -> Result<Self, ConversionError> {
        let (Ok(gif_width), Ok(gif_height)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(ConversionError::InvalidRange(format!(
                "{width}x{height} exceeds the GIF size limit"
            )));
        };
        if width == 0 || height == 0 {
            return Err(ConversionError::InvalidRange(format!(
                "{width}x{height} is not a valid GIF size"
            )));
        }
        if encoder_quality < 1 {
            return Err(ConversionError::InvalidRange(format!(
                "encoder quality {encoder_quality} must be at least 1"
            )));
        }

        let mut encoder = Encoder::new(Vec::new(), gif_width, gif_height, &[]).map_err(|e| {
            ConversionError::EncodeError(format!("Failed to create GIF encoder: {e}"))
        })?;
        let repeat = match options.repeat {
            None => Repeat::Infinite,
            Some(n) => Repeat::Finite(n),
        };
        encoder
            .set_repeat(repeat)
            .map_err(|e| ConversionError::EncodeError(format!("Failed to set GIF repeat: {e}")))?;

        let pool = WorkerPool::new(options.worker_count())?;
        let (sender, receiver) = mpsc::channel();

        log::debug!(
            "Opened GIF encoder {width}x{height}, quality {encoder_quality}, {} workers, repeat {:?}",
            pool.threads(),
            options.repeat,
        );

        Ok(Self {
            width,
            height,
            sample_factor: encoder_quality,
            frame_delay_ms: None,
            encoder: Some(encoder),
            sender: Some(sender),
            receiver,
            pool,
            abort: Arc::new(AtomicBool::new(false)),
            reorder: BTreeMap::new(),
            submitted: 0,
            written: 0,
            cancellation: options.cancellation().cloned(),
            quantizer: quantize_frame,
            status: JobStatus::Open,
        })
    }

    /// Frames accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Frames already written to the stream, in order.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Size of this job's worker pool.
    pub fn workers(&self) -> usize {
        self.pool.threads()
    }

    /// Queue `frame` for quantisation.
    ///
    /// Frames are written in the order they are added, whatever order the
    /// workers finish in.
    ///
    /// # Errors
    ///
    /// - [`ConversionError::InvalidState`] after [`finalize`](Self::finalize)
    ///   has been called or the job has failed.
    /// - [`ConversionError::DimensionMismatch`] if the frame is not the
    ///   job's size.
    /// - [`ConversionError::EncodeError`] if an earlier frame failed.
    pub fn add_frame(&mut self, frame: ResizedFrame) -> Result<(), ConversionError> {
        match self.status {
            JobStatus::Open => {}
            JobStatus::Finalized => {
                return Err(ConversionError::InvalidState(
                    "add_frame called after finalize".to_string(),
                ));
            }
            JobStatus::Failed => {
                return Err(ConversionError::InvalidState(
                    "add_frame called on a failed encoding job".to_string(),
                ));
            }
        }
        if frame.pixels.dimensions() != (self.width, self.height) {
            return Err(ConversionError::DimensionMismatch {
                frame_index: frame.index,
                expected: (self.width, self.height),
                actual: frame.pixels.dimensions(),
            });
        }

        self.frame_delay_ms.get_or_insert(frame.delay_ms);
        let sequence = self.submitted;
        self.submitted += 1;
        self.dispatch(sequence, frame.pixels);

        // Write whatever is already in order without waiting.
        while let Ok(message) = self.receiver.try_recv() {
            self.accept(message)?;
        }
        Ok(())
    }

    fn dispatch(&self, sequence: u64, pixels: RgbaImage) {
        let Some(sender) = self.sender.clone() else {
            return;
        };
        let abort = Arc::clone(&self.abort);
        let sample_factor = self.sample_factor;
        let quantizer = self.quantizer;

        self.pool.spawn(move || {
            if abort.load(Ordering::Acquire) {
                return;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| quantizer(&pixels, sample_factor)))
                .map_err(|payload| {
                    let detail = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    format!("worker panicked on frame {sequence}: {detail}")
                });
            let _ = sender.send((sequence, outcome));
        });
    }

    fn accept(&mut self, (sequence, outcome): WorkerMessage) -> Result<(), ConversionError> {
        match outcome {
            Ok(frame) => {
                self.reorder.insert(sequence, frame);
                self.write_ready()
            }
            Err(reason) => Err(self.fail(ConversionError::EncodeError(reason))),
        }
    }

    fn write_ready(&mut self) -> Result<(), ConversionError> {
        let delay = delay_centiseconds(self.frame_delay_ms.unwrap_or_default());
        while let Some(quantized) = self.reorder.remove(&self.written) {
            let Some(encoder) = self.encoder.as_mut() else {
                return Err(self.fail(ConversionError::InvalidState(
                    "GIF stream already closed".to_string(),
                )));
            };
            let frame = Frame {
                width: self.width as u16,
                height: self.height as u16,
                delay,
                palette: Some(quantized.palette),
                buffer: Cow::Owned(quantized.indices),
                ..Frame::default()
            };
            if let Err(e) = encoder.write_frame(&frame) {
                return Err(self.fail(ConversionError::EncodeError(format!(
                    "Failed to write GIF frame {}: {e}",
                    self.written
                ))));
            }
            self.written += 1;
        }
        Ok(())
    }

    fn fail(&mut self, error: ConversionError) -> ConversionError {
        self.status = JobStatus::Failed;
        self.abort.store(true, Ordering::Release);
        self.encoder = None;
        self.reorder.clear();
        error
    }

    fn check_cancelled(&mut self) -> Result<(), ConversionError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            let frames_completed = self.written;
            return Err(self.fail(ConversionError::Cancelled { frames_completed }));
        }
        Ok(())
    }

    /// Wait for all workers, write the trailer, and return the GIF.
    ///
    /// Emits [`Phase::Encoding`] progress as frames are written, ending
    /// with exactly `1.0`.
    ///
    /// # Errors
    ///
    /// - [`ConversionError::InvalidState`] if called twice, after a
    ///   failure, or with no frames.
    /// - [`ConversionError::Cancelled`] if the job's token fires while
    ///   waiting.
    /// - [`ConversionError::EncodeError`] if a worker or the writer fails.
    ///   No partial stream is returned.
    pub(crate) fn finalize_with(
        &mut self,
        tracker: &mut ProgressTracker,
    ) -> Result<ConversionResult, ConversionError> {
        match self.status {
            JobStatus::Open => {}
            JobStatus::Finalized => {
                return Err(ConversionError::InvalidState(
                    "finalize called twice".to_string(),
                ));
            }
            JobStatus::Failed => {
                return Err(ConversionError::InvalidState(
                    "finalize called on a failed encoding job".to_string(),
                ));
            }
        }
        self.check_cancelled()?;
        if self.submitted == 0 {
            return Err(self.fail(ConversionError::InvalidState(
                "finalize called before any frame was added".to_string(),
            )));
        }
        self.status = JobStatus::Finalized;
        // Workers hold the remaining senders; the channel disconnects once
        // they are all done.
        self.sender = None;

        tracker.advance_to(self.written);
        while self.written < self.submitted {
            self.check_cancelled()?;
            match self.receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(message) => {
                    self.accept(message)?;
                    tracker.advance_to(self.written);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    let written = self.written;
                    return Err(self.fail(ConversionError::EncodeError(format!(
                        "workers stopped after {written} of {} frames",
                        self.submitted
                    ))));
                }
            }
        }

        let Some(encoder) = self.encoder.take() else {
            return Err(self.fail(ConversionError::InvalidState(
                "GIF stream already closed".to_string(),
            )));
        };
        let bytes = encoder.into_inner().map_err(|e| {
            self.fail(ConversionError::EncodeError(format!(
                "Failed to write GIF trailer: {e}"
            )))
        })?;
        tracker.finish();

        log::debug!(
            "Encoded {} frames into {} bytes",
            self.written,
            bytes.len()
        );

        Ok(ConversionResult {
            bytes,
            mime_type: GIF_MIME_TYPE,
            width: self.width,
            height: self.height,
            frame_count: self.written,
            frame_delay_ms: self.frame_delay_ms.unwrap_or_default(),
        })
    }

    /// [`finalize_with`](Self::finalize_with) reporting progress to
    /// `options`' callback.
    ///
    /// # Errors
    ///
    /// See [`finalize_with`](Self::finalize_with).
    pub fn finalize(
        &mut self,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ConversionError> {
        let mut tracker = ProgressTracker::new(
            Arc::clone(&options.progress),
            Phase::Encoding,
            self.submitted,
            1,
        );
        self.finalize_with(&mut tracker)
    }

    /// Finalize without reporting progress.
    ///
    /// # Errors
    ///
    /// See [`finalize_with`](Self::finalize_with).
    pub fn finalize_silently(&mut self) -> Result<ConversionResult, ConversionError> {
        let mut tracker =
            ProgressTracker::new(Arc::new(NoOpProgress), Phase::Encoding, self.submitted, 1);
        self.finalize_with(&mut tracker)
    }
}

impl Drop for EncodingJob {
    fn drop(&mut self) {
        // Queued tasks skip their work; `pool`'s own drop then joins.
        self.abort.store(true, Ordering::Release);
        self.sender = None;
    }
}

/// GIF delays are stored in hundredths of a second.
fn delay_centiseconds(delay_ms: u32) -> u16 {
    ((delay_ms + 5) / 10).min(u32::from(u16::MAX)) as u16
}
