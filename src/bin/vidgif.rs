use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use vidgif::settings::DEFAULT_SELECTION;
use vidgif::{
    ConversionJob, ConversionOptions, ConversionSettings, FfmpegLogLevel, FfmpegSource,
    MediaSource, Phase, ProgressCallback, ProgressEvent, format_time, output_dimensions,
};

const CLI_AFTER_HELP: &str = "Examples:\n  vidgif convert input.mp4 --start 0:03 --end 0:08 --width 320\n  vidgif convert input.mp4 --out clip.gif --quality 90 --fps 20 --progress\n  vidgif probe input.mp4 --json\n  vidgif completions zsh > _vidgif";

/// Output name when the input has no usable file stem.
const FALLBACK_OUTPUT: &str = "converted.gif";

#[derive(Debug, Parser)]
#[command(
    name = "vidgif",
    version,
    about = "Convert a window of a video clip into an animated GIF",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar per phase.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting an existing output file.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a video window to a GIF.
    #[command(
        about = "Convert a video window to an animated GIF",
        after_help = "Examples:\n  vidgif convert input.mp4\n  vidgif convert input.mp4 --out clip.gif --start 12.5 --end 0:17 --fps 10 --width 240"
    )]
    Convert {
        /// Input media path or URL.
        input: String,
        /// Output GIF path. Defaults to the input's name with a `.gif`
        /// extension, in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Quality from 10 (smallest) to 100 (best).
        #[arg(long, default_value_t = 75)]
        quality: u32,
        /// Output frame rate: 10, 15, 20, 25, or 30.
        #[arg(long, default_value_t = 15)]
        fps: u32,
        /// Window start (seconds, MM:SS, or HH:MM:SS).
        #[arg(long)]
        start: Option<String>,
        /// Window end. Defaults to ten seconds after the start, or the end of
        /// a shorter clip.
        #[arg(long)]
        end: Option<String>,
        /// Output width in pixels (100-800).
        #[arg(long, default_value_t = 400)]
        width: u32,
        /// Loop count. Loops forever when omitted.
        #[arg(long)]
        repeat: Option<u16>,
        /// Quantiser worker threads.
        #[arg(long)]
        workers: Option<usize>,
        /// Give up on a single seek after this long (seconds).
        #[arg(long)]
        seek_timeout: Option<String>,
    },

    /// Print what a conversion of this input would start from.
    #[command(
        about = "Print source duration and dimensions",
        visible_alias = "info",
        after_help = "Examples:\n  vidgif probe input.mp4\n  vidgif probe input.mp4 --json"
    )]
    Probe {
        /// Input media path or URL.
        input: String,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(format!("invalid time: {trimmed}").into());
        }
        return Ok(Duration::from_secs_f64(seconds));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds.parse::<f64>()?),
        [hours, minutes, seconds] => (
            hours.parse::<u64>()?,
            minutes.parse::<u64>()?,
            seconds.parse::<f64>()?,
        ),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };
    if !seconds.is_finite() || !(0.0..60.0).contains(&seconds) {
        return Err(format!("invalid seconds in {trimmed}").into());
    }

    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds))
}

/// `<stem>.gif` for the last path or URL segment of `input`.
fn default_output_path(input: &str) -> PathBuf {
    let without_query = input.split(['?', '#']).next().unwrap_or(input);
    let segment = without_query
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    match Path::new(segment).file_stem().and_then(|stem| stem.to_str()) {
        Some(stem) if !stem.is_empty() => PathBuf::from(format!("{stem}.gif")),
        _ => PathBuf::from(FALLBACK_OUTPUT),
    }
}

/// Resolve the window from optional `--start`/`--end`.
///
/// A missing end is ten seconds after the start, clamped to a known
/// `duration`.
fn resolve_window(
    start: Option<Duration>,
    end: Option<Duration>,
    duration: Duration,
) -> (Duration, Duration) {
    let start = start.unwrap_or(Duration::ZERO);
    let end = end.unwrap_or_else(|| {
        let end = start.saturating_add(DEFAULT_SELECTION);
        if duration.is_zero() {
            end
        } else {
            end.min(duration)
        }
    });
    (start, end)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level.parse()?;
        vidgif::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

/// One indicatif bar per phase, replaced when the phase changes.
#[derive(Default)]
struct TerminalProgress {
    bar: Mutex<Option<(Phase, ProgressBar)>>,
}

impl TerminalProgress {
    fn new_bar(phase: Phase, total: u64) -> ProgressBar {
        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {prefix:>9} {bar:40.cyan/blue} {pos}/{len}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        let prefix = match phase {
            Phase::Capturing => "capturing",
            Phase::Encoding => "encoding",
        };
        bar.set_prefix(prefix);
        bar
    }

    fn finish(&self) {
        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, bar)) = slot.take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        let same_phase = matches!(&*slot, Some((phase, _)) if *phase == event.phase);
        if !same_phase {
            if let Some((_, previous)) = slot.take() {
                previous.finish();
            }
            *slot = Some((event.phase, Self::new_bar(event.phase, event.total)));
        }
        if let Some((_, bar)) = &*slot {
            bar.set_position(event.current);
            if event.fraction >= 1.0 {
                bar.finish();
            }
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Convert {
            input,
            out,
            quality,
            fps,
            start,
            end,
            width,
            repeat,
            workers,
            seek_timeout,
        } => {
            let out = out.unwrap_or_else(|| default_output_path(&input));
            ensure_writable_path(&out, cli.global.overwrite)?;

            let start_time = start.as_deref().map(parse_timecode).transpose()?;
            let end_time = end.as_deref().map(parse_timecode).transpose()?;

            let source = FfmpegSource::open(input.as_str())?;
            let info = source.info();

            let (start_time, end_time) = resolve_window(start_time, end_time, info.duration);
            let settings = ConversionSettings::for_duration(info.duration)
                .with_quality(quality)
                .with_fps(fps)
                .with_width(width)
                .with_time_range(start_time, end_time);

            let mut options = ConversionOptions::new().with_repeat(repeat);
            if let Some(workers) = workers {
                options = options.with_workers(workers);
            }
            if let Some(timeout) = &seek_timeout {
                options = options.with_seek_timeout(parse_timecode(timeout)?);
            }
            let terminal = Arc::new(TerminalProgress::default());
            if cli.global.progress {
                options = options.with_progress(terminal.clone());
            }

            if cli.global.verbose {
                eprintln!(
                    "{} {} ({}x{}, {})",
                    "source:".cyan().bold(),
                    input,
                    info.width,
                    info.height,
                    format_time(info.duration),
                );
                eprintln!("{} {settings}", "settings:".cyan().bold());
                eprintln!(
                    "{} {} worker(s)",
                    "encoder:".cyan().bold(),
                    options.worker_count()
                );
            }

            let mut job = ConversionJob::new(settings, options);
            let outcome = job.run(move || Ok(source));
            terminal.finish();
            let gif = outcome?;
            gif.save(&out)?;

            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Wrote {} frame(s), {}x{}, {} bytes to {}",
                    gif.frame_count,
                    gif.width,
                    gif.height,
                    gif.len(),
                    out.display()
                )
                .green()
            );
        }
        Commands::Probe { input, json } => {
            let source = FfmpegSource::open(input.as_str())?;
            let info = source.info();
            let defaults = ConversionSettings::for_duration(info.duration);
            let output = output_dimensions(defaults.width, info.width, info.height).ok();

            if json {
                let default_output = output.map(|(width, height)| {
                    json!({
                        "width": width,
                        "height": height,
                    })
                });
                let payload = json!({
                    "input": input,
                    "duration_seconds": info.duration.as_secs_f64(),
                    "width": info.width,
                    "height": info.height,
                    "default_window": {
                        "start_seconds": defaults.start_time.as_secs_f64(),
                        "end_seconds": defaults.end_time.as_secs_f64(),
                    },
                    "default_output": default_output,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "Duration: {} ({:.3}s)",
                    format_time(info.duration),
                    info.duration.as_secs_f64()
                );
                println!("Video: {}x{}", info.width, info.height);
                println!(
                    "Default window: {} - {}",
                    format_time(defaults.start_time),
                    format_time(defaults.end_time)
                );
                if let Some((width, height)) = output {
                    println!("Default output: {width}x{height}");
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "vidgif", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
