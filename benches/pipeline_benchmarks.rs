//! Benchmarks for scheduling, resizing, quantisation, and full conversions.
//!
//! Run with: cargo bench
//!
//! The FFmpeg benchmark needs `tests/fixtures/sample_video.mp4` and is
//! skipped without it.

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use image::{Rgba, RgbaImage};
use vidgif::{
    ConversionOptions, ConversionSettings, EncodingJob, MediaSource, Rasterizer, RawFrame,
    ResizedFrame, SourceError, SourceInfo, compute_schedule, convert_source,
};

/// Gradient frames computed from the timestamp.
struct GradientSource {
    info: SourceInfo,
    position: Duration,
}

impl GradientSource {
    fn new(width: u32, height: u32) -> Self {
        Self {
            info: SourceInfo {
                duration: Duration::from_secs(30),
                width,
                height,
            },
            position: Duration::ZERO,
        }
    }
}

impl MediaSource for GradientSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn seek(&mut self, timestamp: Duration, _timeout: Duration) -> Result<(), SourceError> {
        self.position = timestamp;
        Ok(())
    }

    fn capture(&mut self) -> Result<RgbaImage, SourceError> {
        let shift = self.position.as_millis() as u32;
        Ok(RgbaImage::from_fn(self.info.width, self.info.height, |x, y| {
            Rgba([
                ((x + shift) % 256) as u8,
                ((y + shift / 2) % 256) as u8,
                ((x ^ y) % 256) as u8,
                255,
            ])
        }))
    }
}

fn gradient(width: u32, height: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            ((x * 3 + seed) % 256) as u8,
            ((y * 5 + seed) % 256) as u8,
            ((x + y) % 256) as u8,
            255,
        ])
    })
}

fn benchmark_schedule(criterion: &mut Criterion) {
    let settings = ConversionSettings::new()
        .with_fps(30)
        .with_time_range(Duration::from_secs(3), Duration::from_secs(603));
    criterion.bench_function("schedule 18000 frames", |bencher| {
        bencher.iter(|| compute_schedule(black_box(&settings)).unwrap());
    });
}

fn benchmark_resize(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("resize to 400 px");
    for (width, height) in [(640_u32, 360_u32), (1280, 720), (1920, 1080)] {
        let pixels = gradient(width, height, 7);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &pixels,
            |bencher, pixels| {
                bencher.iter(|| {
                    let mut rasterizer = Rasterizer::new(400, 66);
                    rasterizer
                        .resize(RawFrame {
                            index: 0,
                            timestamp: Duration::ZERO,
                            pixels: pixels.clone(),
                        })
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn benchmark_encoding(criterion: &mut Criterion) {
    let frames: Vec<RgbaImage> = (0..12).map(|seed| gradient(400, 225, seed * 11)).collect();
    let mut group = criterion.benchmark_group("encode 12 frames at 400x225");
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.sample_size(10);

    for workers in [1_usize, 2, 4] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |bencher, &workers| {
                let options = ConversionOptions::new().with_workers(workers);
                bencher.iter(|| {
                    let mut job = EncodingJob::open(400, 225, 26, &options).unwrap();
                    for (index, pixels) in frames.iter().enumerate() {
                        job.add_frame(ResizedFrame {
                            index: index as u64,
                            pixels: pixels.clone(),
                            delay_ms: 66,
                        })
                        .unwrap();
                    }
                    job.finalize_silently().unwrap()
                });
            },
        );
    }
    group.finish();
}

fn benchmark_quality(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("convert 1s of 640x360");
    group.sample_size(10);

    for quality in [10_u32, 75, 100] {
        let settings = ConversionSettings::new()
            .with_quality(quality)
            .with_fps(10)
            .with_time_range(Duration::ZERO, Duration::from_secs(1));
        group.bench_with_input(
            BenchmarkId::new("quality", quality),
            &settings,
            |bencher, settings| {
                bencher.iter(|| {
                    convert_source(
                        GradientSource::new(640, 360),
                        settings,
                        &ConversionOptions::new(),
                    )
                    .unwrap()
                });
            },
        );
    }
    group.finish();
}

#[cfg(feature = "ffmpeg")]
fn benchmark_ffmpeg(criterion: &mut Criterion) {
    const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

    vidgif::set_ffmpeg_log_level(vidgif::FfmpegLogLevel::Error);
    if !std::path::Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let settings = ConversionSettings::new()
        .with_fps(10)
        .with_time_range(Duration::ZERO, Duration::from_secs(2));
    let mut group = criterion.benchmark_group("ffmpeg");
    group.sample_size(10);
    group.bench_function("convert 2s of fixture", |bencher| {
        bencher.iter(|| vidgif::convert(SAMPLE_VIDEO, &settings, &ConversionOptions::new()).unwrap());
    });
    group.finish();
}

#[cfg(not(feature = "ffmpeg"))]
fn benchmark_ffmpeg(_criterion: &mut Criterion) {}

criterion_group!(
    benches,
    benchmark_schedule,
    benchmark_resize,
    benchmark_encoding,
    benchmark_quality,
    benchmark_ffmpeg,
);
criterion_main!(benches);
