//! Progress reporting tests.

mod common;

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use common::{RecordingProgress, SyntheticSource};
use vidgif::{ConversionOptions, ConversionSettings, Phase, ProgressEvent, convert_source};

fn settings() -> ConversionSettings {
    ConversionSettings::new()
        .with_fps(20)
        .with_width(100)
        .with_time_range(Duration::ZERO, Duration::from_millis(800))
}

fn phase_events(events: &[ProgressEvent], phase: Phase) -> Vec<ProgressEvent> {
    events.iter().filter(|e| e.phase == phase).cloned().collect()
}

// ── Phases ─────────────────────────────────────────────────────────

#[test]
fn capturing_completes_before_encoding_starts() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = ConversionOptions::new().with_progress(recorder.clone());
    convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();

    let events = recorder.snapshot();
    let first_encoding = events
        .iter()
        .position(|e| e.phase == Phase::Encoding)
        .expect("encoding events");
    assert!(
        events[first_encoding..]
            .iter()
            .all(|e| e.phase == Phase::Encoding),
        "phases must not interleave"
    );
    let last_capture = &events[first_encoding - 1];
    assert_eq!(last_capture.phase, Phase::Capturing);
    assert_eq!(last_capture.fraction, 1.0);

    let last = events.last().unwrap();
    assert_eq!(last.phase, Phase::Encoding);
    assert_eq!(last.fraction, 1.0);
}

#[test]
fn each_phase_is_monotonic() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = ConversionOptions::new().with_progress(recorder.clone());
    convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();

    let events = recorder.snapshot();
    for phase in [Phase::Capturing, Phase::Encoding] {
        let events = phase_events(&events, phase);
        assert!(!events.is_empty(), "{phase:?} reported nothing");
        for pair in events.windows(2) {
            assert!(pair[1].fraction >= pair[0].fraction, "{phase:?} went backwards");
            assert!(pair[1].current >= pair[0].current);
        }
        assert!(events.iter().all(|e| (0.0..=1.0).contains(&e.fraction)));
        assert!(events.iter().all(|e| e.total == 16));
    }
}

#[test]
fn capture_reports_every_frame_by_default() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = ConversionOptions::new().with_progress(recorder.clone());
    convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();

    let capturing = phase_events(&recorder.snapshot(), Phase::Capturing);
    let currents: Vec<u64> = capturing.iter().map(|e| e.current).collect();
    // One per frame, then the closing 1.0 event.
    let mut expected: Vec<u64> = (1..=16).collect();
    expected.push(16);
    assert_eq!(currents, expected);
}

#[test]
fn batch_size_thins_capture_events() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = ConversionOptions::new()
        .with_progress(recorder.clone())
        .with_batch_size(5);
    convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();

    let capturing = phase_events(&recorder.snapshot(), Phase::Capturing);
    let currents: Vec<u64> = capturing.iter().map(|e| e.current).collect();
    assert_eq!(currents, vec![5, 10, 15, 16]);
    assert_eq!(capturing.last().unwrap().fraction, 1.0);
}

// ── Channel delivery ───────────────────────────────────────────────

#[test]
fn channel_callback_delivers_events() {
    let (sender, receiver) = mpsc::channel();
    let options = ConversionOptions::new().with_progress(Arc::new(sender));
    convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();
    drop(options);

    let events: Vec<ProgressEvent> = receiver.try_iter().collect();
    assert!(!events.is_empty());
    assert_eq!(events.last().map(|e| e.fraction), Some(1.0));
}

#[test]
fn ignored_channel_does_not_affect_the_job() {
    let (sender, receiver) = mpsc::channel();
    drop(receiver);
    let options = ConversionOptions::new().with_progress(Arc::new(sender));
    let result = convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();
    assert_eq!(result.frame_count, 16);
}

#[test]
fn elapsed_is_measured() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = ConversionOptions::new().with_progress(recorder.clone());
    convert_source(SyntheticSource::ten_seconds(), &settings(), &options).unwrap();

    let events = recorder.snapshot();
    let capturing = phase_events(&events, Phase::Capturing);
    assert!(capturing.last().unwrap().elapsed >= capturing[0].elapsed);
}
