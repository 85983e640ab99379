//! Initialisation of the global tracing subscriber, with console output and
//! optional rolling file output.
//!
//! To get started, see [`Tracing`].

use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender},
};
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt};

pub use crate::tracing::settings::{
    ConsoleOutput, FileOutput, Format, LevelSettings, RotationPeriod,
};

pub mod settings;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {directory:?}"))]
    InitRollingFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// Configures and installs the global tracing subscriber.
///
/// The value returned by [`Tracing::init`] must be held until the process
/// exits. Dropping it stops the background writer of the file output, log
/// lines still buffered at that point are lost.
///
/// ```
/// use function_telemetry::tracing::{Error, TelemetryOptions, Tracing};
///
/// fn main() -> Result<(), Error> {
///     let _tracing_guard = Tracing::from_options("test", TelemetryOptions::default()).init()?;
///
///     tracing::info!("log a message");
///     Ok(())
/// }
/// ```
///
/// ## Environment variables
///
/// - `CONSOLE_LOG_LEVEL`: level filter of the console output.
/// - `FILE_LOG_LEVEL`: level filter of the file output.
///
/// Everything else is configured through [`TelemetryOptions`].
#[derive(Debug)]
pub struct Tracing {
    service_name: &'static str,
    console: ConsoleOutput,
    file: FileOutput,

    file_writer_guard: Option<WorkerGuard>,
}

impl Tracing {
    pub const CONSOLE_LOG_LEVEL: &str = "CONSOLE_LOG_LEVEL";
    pub const FILE_LOG_LEVEL: &str = "FILE_LOG_LEVEL";
    pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

    /// A subscriber without any output. `service_name` prefixes log files.
    pub fn new(service_name: &'static str) -> Self {
        Self {
            service_name,
            console: ConsoleOutput::Disabled,
            file: FileOutput::Disabled,
            file_writer_guard: None,
        }
    }

    /// Console output at INFO, plus file output at INFO if a directory is
    /// given.
    pub fn from_options(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            console_log_format,
            file_log_directory,
            file_log_rotation_period,
        } = options;

        let console = if console_log_disabled {
            ConsoleOutput::Disabled
        } else {
            ConsoleOutput::enabled(LevelSettings::new(
                Self::CONSOLE_LOG_LEVEL,
                LevelFilter::INFO,
            ))
            .with_format(console_log_format)
        };

        let file = match file_log_directory {
            Some(directory) => FileOutput::enabled(
                LevelSettings::new(Self::FILE_LOG_LEVEL, LevelFilter::INFO),
                directory,
            )
            .with_rotation_period(file_log_rotation_period.unwrap_or_default()),
            None => FileOutput::Disabled,
        };

        Self::new(service_name)
            .with_console_output(console)
            .with_file_output(file)
    }

    pub fn with_console_output(self, console: ConsoleOutput) -> Self {
        Self { console, ..self }
    }

    pub fn with_file_output(self, file: FileOutput) -> Self {
        Self { file, ..self }
    }

    /// Installs the subscriber as the global default.
    ///
    /// Nothing is installed if all outputs are disabled.
    pub fn init(mut self) -> Result<Self, Error> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Sync + Send>> = Vec::new();

        if let ConsoleOutput::Enabled { level, format } = &self.console {
            let layer = match format {
                Format::Plain => tracing_subscriber::fmt::layer()
                    .with_filter(level.env_filter())
                    .boxed(),
                Format::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_filter(level.env_filter())
                    .boxed(),
            };
            layers.push(layer);
        }

        if let FileOutput::Enabled {
            level,
            directory,
            rotation_period,
        } = &self.file
        {
            let file_appender = RollingFileAppender::builder()
                .rotation((*rotation_period).into())
                .filename_prefix(self.service_name)
                .filename_suffix(Self::FILE_LOG_SUFFIX)
                .build(directory)
                .context(InitRollingFileAppenderSnafu { directory })?;

            let (file_writer, file_writer_guard) = tracing_appender::non_blocking(file_appender);
            self.file_writer_guard = Some(file_writer_guard);

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_writer)
                    .with_filter(level.env_filter())
                    .boxed(),
            );
        }

        if !layers.is_empty() {
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        // Returning self keeps the file writer guard alive
        Ok(self)
    }
}

/// Telemetry options, usable as flattened CLI arguments with the `clap`
/// feature.
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_disabled: bool,

    /// Output FORMAT of the console logs.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "FORMAT", value_enum, default_value_t = Format::Plain)
    )]
    pub console_log_format: Format,

    /// Enable logging to files located in the specified DIRECTORY.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "DIRECTORY", group = "file_log")
    )]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "PERIOD", value_enum, requires = "file_log")
    )]
    pub file_log_rotation_period: Option<RotationPeriod>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn new_has_no_outputs() {
        let tracing = Tracing::new("test");

        assert_eq!(tracing.service_name, "test");
        assert!(!tracing.console.is_enabled());
        assert!(!tracing.file.is_enabled());
    }

    #[test]
    fn from_options_defaults() {
        let tracing = Tracing::from_options("test", TelemetryOptions::default());

        assert_eq!(
            tracing.console,
            ConsoleOutput::Enabled {
                level: LevelSettings::new(Tracing::CONSOLE_LOG_LEVEL, LevelFilter::INFO),
                format: Format::Plain,
            }
        );
        assert_eq!(tracing.file, FileOutput::Disabled);
    }

    #[rstest]
    #[case::console_disabled(
        TelemetryOptions { console_log_disabled: true, ..Default::default() },
        false,
        false
    )]
    #[case::json_console(
        TelemetryOptions { console_log_format: Format::Json, ..Default::default() },
        true,
        false
    )]
    #[case::file_enabled(
        TelemetryOptions {
            file_log_directory: Some(PathBuf::from("/tmp/logs")),
            file_log_rotation_period: Some(RotationPeriod::Daily),
            ..Default::default()
        },
        true,
        true
    )]
    fn from_options(
        #[case] options: TelemetryOptions,
        #[case] console_enabled: bool,
        #[case] file_enabled: bool,
    ) {
        let tracing = Tracing::from_options("test", options);

        assert_eq!(tracing.console.is_enabled(), console_enabled);
        assert_eq!(tracing.file.is_enabled(), file_enabled);
    }

    #[test]
    fn file_output_uses_rotation_period() {
        let tracing = Tracing::from_options("test", TelemetryOptions {
            file_log_directory: Some(PathBuf::from("/tmp/logs")),
            file_log_rotation_period: Some(RotationPeriod::Hourly),
            ..Default::default()
        });

        assert_eq!(
            tracing.file,
            FileOutput::Enabled {
                level: LevelSettings::new(Tracing::FILE_LOG_LEVEL, LevelFilter::INFO),
                directory: PathBuf::from("/tmp/logs"),
                rotation_period: RotationPeriod::Hourly,
            }
        );
    }
}
