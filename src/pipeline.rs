//! The conversion job: source in, GIF out.
//!
//! [`ConversionJob`] sequences the pipeline as an explicit state machine:
//!
//! ```text
//! Idle -> Opening -> Capturing -> Encoding -> Finished
//!            \            \           \
//!             +------------+-----------+--> Failed
//! ```
//!
//! Cancellation is checked between every pair of steps and moves the job
//! straight to [`JobState::Failed`] with [`ConversionError::Cancelled`]. On
//! every exit path the source and the encoder's worker pool are released
//! before the result or error is returned.
//!
//! Most callers want [`convert`] (FFmpeg) or [`convert_source`] (any
//! [`MediaSource`]).

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Instant;

use crate::clock::compute_schedule;
use crate::configuration::ConversionOptions;
use crate::encoder::{ConversionResult, EncodingJob};
use crate::error::ConversionError;
#[cfg(feature = "ffmpeg")]
use crate::media::{FfmpegSource, MediaResource};
use crate::progress::{Phase, ProgressTracker};
use crate::rasterizer::Rasterizer;
use crate::sampler::FrameSampler;
use crate::settings::ConversionSettings;
use crate::source::MediaSource;

/// Where a [`ConversionJob`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created, not yet run.
    Idle,
    /// Opening the media source.
    Opening,
    /// Sampling, resizing, and submitting frames.
    Capturing,
    /// Waiting for the encoder to drain and writing the trailer.
    Encoding,
    /// Produced a [`ConversionResult`].
    Finished,
    /// Ended with an error (including cancellation).
    Failed,
}

impl JobState {
    /// `true` for [`Finished`](JobState::Finished) and
    /// [`Failed`](JobState::Failed).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Opening => "opening",
            JobState::Capturing => "capturing",
            JobState::Encoding => "encoding",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One conversion from a source to a GIF. Runs once.
///
/// # Example
///
/// ```no_run
/// use vidgif::{ConversionJob, ConversionOptions, ConversionSettings, FfmpegSource, JobState};
///
/// let mut job = ConversionJob::new(ConversionSettings::new(), ConversionOptions::new());
/// let result = job.run(|| FfmpegSource::open("input.mp4"));
/// assert!(job.state().is_terminal());
/// if let Ok(gif) = result {
///     assert_eq!(job.state(), JobState::Finished);
///     gif.save("converted.gif")?;
/// }
/// # Ok::<(), vidgif::ConversionError>(())
/// ```
#[derive(Debug)]
pub struct ConversionJob {
    settings: ConversionSettings,
    options: ConversionOptions,
    state: JobState,
}

impl ConversionJob {
    /// Prepare a job. Nothing is opened until [`run`](Self::run).
    pub fn new(settings: ConversionSettings, options: ConversionOptions) -> Self {
        Self {
            settings,
            options,
            state: JobState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// The settings this job was created with.
    pub fn settings(&self) -> &ConversionSettings {
        &self.settings
    }

    /// Run the job, opening the source with `open`.
    ///
    /// The opener is called once, after the settings have passed their
    /// source-independent checks.
    ///
    /// # Errors
    ///
    /// [`ConversionError::InvalidState`] if the job has already run;
    /// otherwise any error from opening, capturing, or encoding. The job is
    /// left in [`JobState::Failed`].
    pub fn run<S, F>(&mut self, open: F) -> Result<ConversionResult, ConversionError>
    where
        S: MediaSource,
        F: FnOnce() -> Result<S, ConversionError>,
    {
        if self.state != JobState::Idle {
            return Err(ConversionError::InvalidState(format!(
                "conversion job already ran (state: {})",
                self.state
            )));
        }

        let started = Instant::now();
        match self.execute(open) {
            Ok(result) => {
                self.transition(JobState::Finished);
                log::info!(
                    "Converted {} frames to a {}x{} GIF ({} bytes) in {:.2?}",
                    result.frame_count,
                    result.width,
                    result.height,
                    result.bytes.len(),
                    started.elapsed(),
                );
                Ok(result)
            }
            Err(error) => {
                self.transition(JobState::Failed);
                log::warn!("Conversion failed after {:.2?}: {error}", started.elapsed());
                Err(error)
            }
        }
    }

    fn transition(&mut self, next: JobState) {
        log::debug!("Conversion job {} -> {}", self.state, next);
        self.state = next;
    }

    fn check_cancelled(&self, frames_completed: u64) -> Result<(), ConversionError> {
        if self.options.is_cancelled() {
            return Err(ConversionError::Cancelled { frames_completed });
        }
        Ok(())
    }

    fn execute<S, F>(&mut self, open: F) -> Result<ConversionResult, ConversionError>
    where
        S: MediaSource,
        F: FnOnce() -> Result<S, ConversionError>,
    {
        self.settings.validate()?;
        log::debug!("Starting conversion: {}", self.settings);

        self.transition(JobState::Opening);
        self.check_cancelled(0)?;
        let mut source = open()?;

        let info = source.info();
        self.settings.validate_for_source(info.duration)?;
        let schedule = compute_schedule(&self.settings)?;
        self.check_cancelled(0)?;

        self.transition(JobState::Capturing);
        let mut encoding: Option<EncodingJob> = None;
        {
            let mut capture_progress = ProgressTracker::new(
                Arc::clone(&self.options.progress),
                Phase::Capturing,
                schedule.len() as u64,
                self.options.batch_size,
            );
            let mut rasterizer = Rasterizer::new(self.settings.width, self.settings.frame_delay_ms());
            let sampler = FrameSampler::new(&mut source, &schedule, self.options.seek_timeout)
                .with_cancellation(self.options.cancellation().cloned());

            for raw in sampler {
                let raw = raw?;
                self.check_cancelled(capture_progress.current())?;
                let resized = rasterizer.resize(raw)?;

                // Output dimensions are only known once the first frame is in.
                if encoding.is_none() {
                    let (width, height) = resized.pixels.dimensions();
                    encoding = Some(EncodingJob::open(
                        width,
                        height,
                        self.settings.encoder_quality(),
                        &self.options,
                    )?);
                }
                self.check_cancelled(capture_progress.current())?;
                if let Some(job) = encoding.as_mut() {
                    job.add_frame(resized)?;
                }
                capture_progress.advance();
            }
            capture_progress.finish();
        }
        drop(source);

        let Some(mut job) = encoding else {
            return Err(ConversionError::InvalidState(
                "capture finished without any frames".to_string(),
            ));
        };

        self.transition(JobState::Encoding);
        self.check_cancelled(job.submitted())?;
        let mut encode_progress = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            Phase::Encoding,
            job.submitted(),
            1,
        );
        job.finalize_with(&mut encode_progress)
    }
}

/// Convert `resource` with FFmpeg.
///
/// # Errors
///
/// See [`ConversionJob::run`] and [`FfmpegSource::open`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use vidgif::{ConversionOptions, ConversionSettings};
///
/// let settings = ConversionSettings::new()
///     .with_time_range(Duration::from_secs(1), Duration::from_secs(4))
///     .with_width(320);
/// let gif = vidgif::convert("input.mp4", &settings, &ConversionOptions::new())?;
/// gif.save("converted.gif")?;
/// # Ok::<(), vidgif::ConversionError>(())
/// ```
#[cfg(feature = "ffmpeg")]
pub fn convert(
    resource: impl Into<MediaResource>,
    settings: &ConversionSettings,
    options: &ConversionOptions,
) -> Result<ConversionResult, ConversionError> {
    let resource = resource.into();
    ConversionJob::new(settings.clone(), options.clone()).run(|| FfmpegSource::open(resource))
}

/// Convert from an already opened [`MediaSource`].
///
/// The source is consumed and dropped before this function returns.
///
/// # Errors
///
/// See [`ConversionJob::run`].
pub fn convert_source<S: MediaSource>(
    source: S,
    settings: &ConversionSettings,
    options: &ConversionOptions,
) -> Result<ConversionResult, ConversionError> {
    ConversionJob::new(settings.clone(), options.clone()).run(move || Ok(source))
}
