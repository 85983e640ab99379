//! Per-output settings of the tracing subscriber.

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;

/// Which events an output records.
///
/// The level is read from `env_var` using the [`EnvFilter`] directive syntax,
/// e.g. `CONSOLE_LOG_LEVEL=function_azresourcegraph=debug`, and falls back
/// to `default_level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelSettings {
    pub env_var: &'static str,
    pub default_level: LevelFilter,
}

impl LevelSettings {
    pub fn new(env_var: &'static str, default_level: impl Into<LevelFilter>) -> Self {
        Self {
            env_var,
            default_level: default_level.into(),
        }
    }

    pub(crate) fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_env_var(self.env_var)
            .with_default_directive(self.default_level.into())
            .from_env_lossy()
    }
}

/// Format of the console output.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum Format {
    /// Human readable lines, colored unless `NO_COLOR` is set.
    #[default]
    Plain,

    /// One JSON object per event.
    Json,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConsoleOutput {
    #[default]
    Disabled,
    Enabled { level: LevelSettings, format: Format },
}

impl ConsoleOutput {
    pub fn enabled(level: LevelSettings) -> Self {
        Self::Enabled {
            level,
            format: Format::default(),
        }
    }

    /// Sets the format, has no effect on a disabled output.
    pub fn with_format(self, format: Format) -> Self {
        match self {
            Self::Enabled { level, .. } => Self::Enabled { level, format },
            Self::Disabled => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Rolling JSON log files, named `<service name>.<rotation date>.<suffix>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FileOutput {
    #[default]
    Disabled,
    Enabled {
        level: LevelSettings,
        directory: PathBuf,
        rotation_period: RotationPeriod,
    },
}

impl FileOutput {
    pub fn enabled(level: LevelSettings, directory: impl Into<PathBuf>) -> Self {
        Self::Enabled {
            level,
            directory: directory.into(),
            rotation_period: RotationPeriod::default(),
        }
    }

    /// Sets the rotation period, has no effect on a disabled output.
    pub fn with_rotation_period(self, rotation_period: RotationPeriod) -> Self {
        match self {
            Self::Enabled {
                level, directory, ..
            } => Self::Enabled {
                level,
                directory,
                rotation_period,
            },
            Self::Disabled => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Supported periods after which log files are rolled over.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}
