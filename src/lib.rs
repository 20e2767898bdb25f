//! # vidgif
//!
//! Convert a window of a video clip into an animated GIF.
//!
//! A conversion samples `floor((end - start) * fps)` frames at fixed
//! `1 / fps` spacing from the source, resizes them to the requested width
//! (height follows the source aspect ratio), quantises each frame to a
//! 256-colour palette on a per-job worker pool, and writes them in order
//! into a single GIF held in memory. Decoding is done by FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next); any other decoder
//! can be plugged in through the [`MediaSource`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vidgif::{ConversionOptions, ConversionSettings};
//!
//! // 0s..5s at 15 fps, 400 px wide, quality 75.
//! let gif = vidgif::convert("input.mp4", &ConversionSettings::new(), &ConversionOptions::new())?;
//! gif.save("converted.gif")?;
//! # Ok::<(), vidgif::ConversionError>(())
//! ```
//!
//! ### Custom Settings, Progress, and Cancellation
//!
//! ```no_run
//! use std::sync::mpsc;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use vidgif::{CancellationToken, ConversionOptions, ConversionSettings};
//!
//! let settings = ConversionSettings::new()
//!     .with_quality(90)
//!     .with_fps(20)
//!     .with_time_range(Duration::from_secs(3), Duration::from_secs(7))
//!     .with_width(320);
//!
//! let (sender, events) = mpsc::channel();
//! let token = CancellationToken::new();
//! let options = ConversionOptions::new()
//!     .with_progress(Arc::new(sender))
//!     .with_cancellation(token.clone());
//!
//! let gif = vidgif::convert("input.mp4", &settings, &options)?;
//! for event in events.try_iter() {
//!     println!("{:?} {:.0}%", event.phase, event.fraction * 100.0);
//! }
//! # Ok::<(), vidgif::ConversionError>(())
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Type |
//! |-------|------|
//! | Frame clock | [`compute_schedule`] → [`FrameSchedule`] |
//! | Media sampler | [`FrameSampler`] over a [`MediaSource`] |
//! | Rasterizer | [`Rasterizer`] → [`ResizedFrame`] |
//! | Encoder | [`EncodingJob`] → [`ConversionResult`] |
//! | Orchestrator | [`ConversionJob`] / [`convert`] / [`convert_source`] |
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` (default) | [`FfmpegSource`], [`convert`], and the `vidgif` CLI |
//! | `async` | `ConversionFuture` and `ProgressStream` via Tokio |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! The `ffmpeg` feature needs the FFmpeg development libraries installed on
//! the system.

pub mod clock;
pub mod configuration;
#[cfg(feature = "ffmpeg")]
mod conversion;
pub mod encoder;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(feature = "ffmpeg")]
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod rasterizer;
pub mod sampler;
pub mod settings;
pub mod source;
#[cfg(feature = "async")]
pub mod stream;

pub use clock::{FrameSchedule, MAX_FRAMES, compute_schedule, frame_count};
pub use configuration::{ConversionOptions, DEFAULT_SEEK_TIMEOUT};
pub use encoder::{ConversionResult, EncodingJob, GIF_MIME_TYPE, live_workers};
pub use error::{CapturePosition, ConversionError, ErrorKind};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
#[cfg(feature = "ffmpeg")]
pub use media::{FfmpegSource, MediaResource};
#[cfg(feature = "ffmpeg")]
pub use pipeline::convert;
pub use pipeline::{ConversionJob, JobState, convert_source};
pub use progress::{CancellationToken, Phase, ProgressCallback, ProgressEvent};
pub use rasterizer::{Rasterizer, ResizedFrame, output_dimensions};
pub use sampler::FrameSampler;
pub use settings::{ConversionSettings, format_time};
pub use source::{MediaSource, RawFrame, SourceError, SourceInfo};
#[cfg(all(feature = "async", feature = "ffmpeg"))]
pub use stream::convert_async;
#[cfg(feature = "async")]
pub use stream::{ConversionFuture, ProgressStream, convert_source_async};
