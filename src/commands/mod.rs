use anyhow::Result;
use log::LevelFilter;

use crate::client::{ApiClientConfig, SenlerApiClientV2};
use crate::http::RetryConfig;
use crate::logging::{LoggerOptions, LoggingConfig};
use crate::runtime::Runtime;

mod call;
pub mod config;

pub use call::{CallOptions, build_params, parse_param, run_call};
pub use config::{ConfigOverrides, resolve_api_config, show_config};

/// Calls an API method and prints the response to stdout.
#[tracing::instrument(skip(runtime, overrides, options))]
pub async fn call<R: Runtime>(
    runtime: R,
    overrides: ConfigOverrides,
    options: CallOptions,
    attempts: Option<usize>,
) -> Result<()> {
    let api = resolve_api_config(&runtime, &overrides)?;

    let mut config = ApiClientConfig::new(api);
    if let Some(attempts) = attempts {
        config = config.with_retry(RetryConfig {
            max_attempts: attempts,
            ..Default::default()
        });
    }

    let client = SenlerApiClientV2::new(config)?;
    run_call(&client, &options, &mut std::io::stdout()).await
}

/// Print the resolved configuration.
pub fn config<R: Runtime>(runtime: R, overrides: ConfigOverrides) -> Result<()> {
    show_config(&runtime, &overrides, &mut std::io::stdout())
}

/// Logger setup for the CLI: `-v` flags raise the level from `warn`, and
/// `RUST_LOG` directives are honoured on top of it.
pub fn logging_config<R: Runtime + ?Sized>(runtime: &R, verbosity: u8) -> LoggingConfig {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    LoggingConfig::new(LoggerOptions {
        level,
        filters: runtime.env_var("RUST_LOG").ok(),
        ..Default::default()
    })
}
