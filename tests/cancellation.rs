//! Cancellation and resource-release tests.
//!
//! Every test here asserts on the process-wide worker gauge, so they take a
//! shared lock instead of running concurrently.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use common::SyntheticSource;
use vidgif::{
    CancellationToken, ConversionError, ConversionJob, ConversionOptions, ConversionSettings,
    EncodingJob, JobState, Phase, ProgressCallback, ProgressEvent, ResizedFrame, SourceError,
    live_workers,
};

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn settings() -> ConversionSettings {
    ConversionSettings::new()
        .with_fps(10)
        .with_width(100)
        .with_time_range(Duration::ZERO, Duration::from_secs(2))
}

/// Cancels `token` on the first event of `phase` whose fraction reaches
/// `at`.
struct CancelAt {
    token: CancellationToken,
    phase: Phase,
    at: f32,
}

impl ProgressCallback for CancelAt {
    fn on_progress(&self, event: &ProgressEvent) {
        if event.phase == self.phase && event.fraction >= self.at {
            self.token.cancel();
        }
    }
}

// ── Mid-capture ────────────────────────────────────────────────────

#[test]
fn cancel_mid_capture_releases_everything() {
    let _guard = serial();
    let token = CancellationToken::new();
    let hook_token = token.clone();
    let source = SyntheticSource::ten_seconds().on_seek(move |index| {
        if index == 7 {
            hook_token.cancel();
        }
    });
    let drops = source.drop_counter();

    let options = ConversionOptions::new()
        .with_cancellation(token)
        .with_workers(3);
    let mut job = ConversionJob::new(settings(), options);
    let result = job.run(move || Ok(source));

    match result {
        Err(ConversionError::Cancelled { frames_completed }) => {
            assert_eq!(frames_completed, 7);
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(drops.load(Ordering::SeqCst), 1, "source must be dropped");
    assert_eq!(live_workers(), 0, "worker pool must be shut down");
}

#[test]
fn cancel_from_progress_callback() {
    let _guard = serial();
    let token = CancellationToken::new();
    let options = ConversionOptions::new()
        .with_cancellation(token.clone())
        .with_progress(Arc::new(CancelAt {
            token,
            phase: Phase::Capturing,
            at: 0.5,
        }));
    let source = SyntheticSource::ten_seconds();
    let drops = source.drop_counter();

    let result = ConversionJob::new(settings(), options).run(move || Ok(source));
    match result {
        Err(ConversionError::Cancelled { frames_completed }) => {
            assert!(frames_completed >= 10 && frames_completed < 20);
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(live_workers(), 0);
}

#[test]
fn cancel_between_capture_and_encoding() {
    let _guard = serial();
    let token = CancellationToken::new();
    let options = ConversionOptions::new()
        .with_cancellation(token.clone())
        .with_progress(Arc::new(CancelAt {
            token,
            phase: Phase::Capturing,
            at: 1.0,
        }));

    let mut job = ConversionJob::new(settings(), options);
    let result = job.run(|| Ok(SyntheticSource::ten_seconds()));
    assert!(matches!(
        result,
        Err(ConversionError::Cancelled {
            frames_completed: 20
        })
    ));
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(live_workers(), 0);
}

#[test]
fn cancelled_before_start_never_opens() {
    let _guard = serial();
    let token = CancellationToken::new();
    token.cancel();
    let options = ConversionOptions::new().with_cancellation(token);

    let result = ConversionJob::new(settings(), options).run(|| -> Result<SyntheticSource, ConversionError> {
        panic!("source must not be opened after cancellation")
    });
    assert!(matches!(
        result,
        Err(ConversionError::Cancelled {
            frames_completed: 0
        })
    ));
}

#[test]
fn cancel_after_finish_is_a_no_op() {
    let _guard = serial();
    let token = CancellationToken::new();
    let options = ConversionOptions::new().with_cancellation(token.clone());
    let mut job = ConversionJob::new(settings(), options);
    let result = job.run(|| Ok(SyntheticSource::ten_seconds()));
    token.cancel();

    assert_eq!(result.unwrap().frame_count, 20);
    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(live_workers(), 0);
}

#[test]
fn slow_seek_sees_cancellation_from_inside_the_source() {
    let _guard = serial();
    let token = CancellationToken::new();
    let hook_token = token.clone();
    let source = SyntheticSource::ten_seconds()
        .with_seek_delay(Duration::from_millis(5))
        .on_seek(move |index| {
            if index == 2 {
                hook_token.cancel();
            }
        });
    let watching = source.watch_counter();
    let drops = source.drop_counter();

    let options = ConversionOptions::new().with_cancellation(token);
    let result = ConversionJob::new(settings(), options).run(move || Ok(source));

    assert!(matches!(
        result,
        Err(ConversionError::Cancelled {
            frames_completed: 2
        })
    ));
    assert_eq!(watching.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(live_workers(), 0);
}

#[test]
fn uncancellable_job_hands_no_token_to_the_source() {
    let _guard = serial();
    let source = SyntheticSource::ten_seconds();
    let watching = source.watch_counter();
    ConversionJob::new(settings(), ConversionOptions::new())
        .run(move || Ok(source))
        .unwrap();
    assert_eq!(watching.load(Ordering::SeqCst), 0);
}

// ── Failure paths release resources ────────────────────────────────

#[test]
fn decode_failure_releases_source_and_workers() {
    let _guard = serial();
    let source = SyntheticSource::ten_seconds()
        .failing_at(12, || SourceError::Disconnected("stream closed".to_string()));
    let drops = source.drop_counter();

    let result = ConversionJob::new(settings(), ConversionOptions::new().with_workers(2))
        .run(move || Ok(source));
    assert!(matches!(result, Err(ConversionError::DecodeError { .. })));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(live_workers(), 0);
}

#[test]
fn abandoned_encoding_job_joins_its_workers() {
    let _guard = serial();
    let options = ConversionOptions::new().with_workers(4);
    let mut job = EncodingJob::open(64, 48, 30, &options).unwrap();
    assert_eq!(job.workers(), 4);
    for index in 0..6 {
        job.add_frame(ResizedFrame {
            index,
            pixels: image::RgbaImage::from_pixel(64, 48, image::Rgba([index as u8, 9, 9, 255])),
            delay_ms: 100,
        })
        .unwrap();
    }
    drop(job);
    assert_eq!(live_workers(), 0);
}
