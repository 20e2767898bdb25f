//! Control over FFmpeg's own console output.
//!
//! FFmpeg writes warnings to stderr on its own, independently of the `log`
//! facade used by this crate. The CLI quiets it by default; library users
//! can do the same with [`set_ffmpeg_log_level`].
//!
//! ```no_run
//! use vidgif::FfmpegLogLevel;
//!
//! vidgif::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::util::log::{self as av_log, Level};

/// FFmpeg verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FfmpegLogLevel {
    /// No output.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Decoder debugging output.
    Debug,
}

impl FfmpegLogLevel {
    const NAMES: [(&'static str, FfmpegLogLevel); 6] = [
        ("quiet", FfmpegLogLevel::Quiet),
        ("fatal", FfmpegLogLevel::Fatal),
        ("error", FfmpegLogLevel::Error),
        ("warning", FfmpegLogLevel::Warning),
        ("info", FfmpegLogLevel::Info),
        ("debug", FfmpegLogLevel::Debug),
    ];

    /// The FFmpeg level that shows about as much as the given `log` filter.
    pub fn matching(filter: log::LevelFilter) -> Self {
        match filter {
            log::LevelFilter::Off => FfmpegLogLevel::Quiet,
            log::LevelFilter::Error => FfmpegLogLevel::Error,
            log::LevelFilter::Warn => FfmpegLogLevel::Warning,
            log::LevelFilter::Info => FfmpegLogLevel::Info,
            log::LevelFilter::Debug | log::LevelFilter::Trace => FfmpegLogLevel::Debug,
        }
    }

    fn to_av(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    fn from_av(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic | Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info | Level::Verbose => FfmpegLogLevel::Info,
            Level::Debug | Level::Trace => FfmpegLogLevel::Debug,
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = Self::NAMES
            .iter()
            .find(|(_, level)| level == self)
            .map_or("warning", |(name, _)| name);
        f.write_str(name)
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, level)| *level)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::NAMES.iter().map(|(name, _)| *name).collect();
                format!("unknown FFmpeg log level '{value}' (expected one of {})", names.join(", "))
            })
    }
}

/// Set how much FFmpeg prints to stderr.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    av_log::set_level(level.to_av());
}

/// Current FFmpeg verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    av_log::get_level().ok().map(FfmpegLogLevel::from_av)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_display() {
        for (name, level) in FfmpegLogLevel::NAMES {
            assert_eq!(level.to_string(), name);
            assert_eq!(name.parse::<FfmpegLogLevel>(), Ok(level));
        }
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn follows_log_filter() {
        assert_eq!(
            FfmpegLogLevel::matching(log::LevelFilter::Off),
            FfmpegLogLevel::Quiet
        );
        assert_eq!(
            FfmpegLogLevel::matching(log::LevelFilter::Trace),
            FfmpegLogLevel::Debug
        );
    }
}
