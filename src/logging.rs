//! Logger configuration for the client and the CLI.
//!
//! Log records are emitted through the `log` facade (and `tracing`, which
//! forwards to it); `env_logger` writes them out. [`LoggingConfig`] describes
//! how that logger is set up.

use anyhow::{Context, Result};
use env_logger::{Builder, Target, WriteStyle};
use log::LevelFilter;
use std::fmt;
use std::io::Write;
use std::ops::{Deref, DerefMut};

/// Options understood by the underlying logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerOptions {
    pub level: LevelFilter,
    /// `false` silences the logger regardless of `level`
    pub enabled: bool,
    /// Prefix for every line, e.g. `[senler]`
    pub name: Option<String>,
    /// env_logger directives such as `senler_api=debug,reqwest=warn`
    pub filters: Option<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            enabled: true,
            name: None,
            filters: None,
        }
    }
}

impl LoggerOptions {
    pub fn with_level(level: LevelFilter) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Effective level after `enabled` is applied.
    pub fn effective_level(&self) -> LevelFilter {
        if self.enabled {
            self.level
        } else {
            LevelFilter::Off
        }
    }
}

/// Logger options plus an optional output destination (stderr when absent).
#[derive(Default)]
pub struct LoggingConfig {
    pub options: LoggerOptions,
    pub destination: Option<Box<dyn Write + Send>>,
}

impl LoggingConfig {
    pub fn new(options: LoggerOptions) -> Self {
        Self {
            options,
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Write + Send + 'static) -> Self {
        self.destination = Some(Box::new(destination));
        self
    }

    /// Translates the configuration into an env_logger builder.
    pub fn builder(self) -> Builder {
        let LoggingConfig {
            options,
            destination,
        } = self;

        let mut builder = Builder::new();
        builder.filter_level(options.effective_level());

        if options.enabled {
            if let Some(filters) = &options.filters {
                builder.parse_filters(filters);
            }
        }

        if let Some(name) = options.name {
            builder.format(move |buf, record| {
                writeln!(
                    buf,
                    "[{}] {} {}: {}",
                    name,
                    record.level(),
                    record.target(),
                    record.args()
                )
            });
        }

        match destination {
            Some(destination) => {
                builder
                    .target(Target::Pipe(destination))
                    .write_style(WriteStyle::Never);
            }
            None => {
                builder.target(Target::Stderr);
            }
        }

        builder
    }

    /// Installs the logger for the whole process. Fails if a logger is
    /// already installed.
    pub fn init(self) -> Result<()> {
        self.builder()
            .try_init()
            .context("Failed to install logger")
    }
}

impl From<LoggerOptions> for LoggingConfig {
    fn from(options: LoggerOptions) -> Self {
        Self::new(options)
    }
}

impl Deref for LoggingConfig {
    type Target = LoggerOptions;

    fn deref(&self) -> &Self::Target {
        &self.options
    }
}

impl DerefMut for LoggingConfig {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.options
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("options", &self.options)
            .field(
                "destination",
                &self.destination.as_ref().map(|_| "<writer>"),
            )
            .finish()
    }
}
