//! Async conversion on top of the blocking pipeline.
//!
//! [`ConversionFuture`] runs a [`ConversionJob`](crate::ConversionJob) on
//! `tokio::task::spawn_blocking` so decoding and quantisation never occupy
//! the async runtime's worker threads. Progress events are forwarded into a
//! [`ProgressStream`]; the stream may be ignored or dropped without
//! affecting the job.
//!
//! Dropping an unfinished future cancels the job: the blocking task sees the
//! token at its next step boundary, releases the source and the worker
//! pool, and exits.
//!
//! Both entry points must be called from within a Tokio runtime.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use vidgif::{ConversionError, ConversionOptions, ConversionSettings};
//!
//! # async fn example() -> Result<(), ConversionError> {
//! let mut future = vidgif::convert_async(
//!     "input.mp4",
//!     ConversionSettings::new(),
//!     ConversionOptions::new(),
//! );
//! let mut progress = future.progress().expect("first call");
//! tokio::spawn(async move {
//!     while let Some(event) = progress.next().await {
//!         println!("{:?} {:.0}%", event.phase, event.fraction * 100.0);
//!     }
//! });
//! let gif = future.await?;
//! gif.save("converted.gif")?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::configuration::ConversionOptions;
use crate::encoder::ConversionResult;
use crate::error::ConversionError;
#[cfg(feature = "ffmpeg")]
use crate::media::{FfmpegSource, MediaResource};
use crate::pipeline::ConversionJob;
use crate::progress::{CancellationToken, ProgressCallback, ProgressEvent};
use crate::settings::ConversionSettings;
use crate::source::MediaSource;

/// Progress events of one async conversion, in emission order.
///
/// Ends when the job finishes or fails.
pub struct ProgressStream {
    receiver: UnboundedReceiver<ProgressEvent>,
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Sends each event to the stream, then to the caller's own callback.
struct ForwardProgress {
    sender: UnboundedSender<ProgressEvent>,
    inner: Arc<dyn ProgressCallback>,
}

impl ProgressCallback for ForwardProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.sender.send(event.clone());
        self.inner.on_progress(event);
    }
}

/// A conversion running on a blocking thread.
///
/// Resolves to the job's single result or error.
pub struct ConversionFuture {
    handle: JoinHandle<Result<ConversionResult, ConversionError>>,
    progress: Option<ProgressStream>,
    cancellation: CancellationToken,
}

impl ConversionFuture {
    /// Take the progress stream. Returns `None` after the first call.
    pub fn progress(&mut self) -> Option<ProgressStream> {
        self.progress.take()
    }

    /// Ask the job to stop at its next step boundary. No effect once the
    /// job has finished.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

impl Future for ConversionFuture {
    type Output = Result<ConversionResult, ConversionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|error| {
                Err(ConversionError::EncodeError(format!(
                    "conversion task did not complete: {error}"
                )))
            })
        })
    }
}

impl Drop for ConversionFuture {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            log::debug!("Conversion future dropped before completion; cancelling");
            self.cancellation.cancel();
        }
    }
}

fn spawn_job<S, F>(
    settings: ConversionSettings,
    options: ConversionOptions,
    open: F,
) -> ConversionFuture
where
    S: MediaSource,
    F: FnOnce() -> Result<S, ConversionError> + Send + 'static,
{
    let cancellation = options.cancellation().cloned().unwrap_or_default();
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let forward = ForwardProgress {
        sender,
        inner: Arc::clone(&options.progress),
    };
    let options = options
        .with_progress(Arc::new(forward))
        .with_cancellation(cancellation.clone());

    let handle =
        tokio::task::spawn_blocking(move || ConversionJob::new(settings, options).run(open));

    ConversionFuture {
        handle,
        progress: Some(ProgressStream { receiver }),
        cancellation,
    }
}

/// Convert `resource` with FFmpeg on a blocking thread.
///
/// The resource is opened on that thread, not the caller's.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
#[cfg(feature = "ffmpeg")]
pub fn convert_async(
    resource: impl Into<MediaResource>,
    settings: ConversionSettings,
    options: ConversionOptions,
) -> ConversionFuture {
    let resource = resource.into();
    spawn_job(settings, options, move || FfmpegSource::open(resource))
}

/// Convert from `source` on a blocking thread.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn convert_source_async<S>(
    source: S,
    settings: ConversionSettings,
    options: ConversionOptions,
) -> ConversionFuture
where
    S: MediaSource + Send + 'static,
{
    spawn_job(settings, options, move || Ok(source))
}
