use anyhow::Result;
use clap::{ArgAction, Parser};
use senler_api::commands::{self, CallOptions, ConfigOverrides};
use senler_api::runtime::RealRuntime;
use std::path::PathBuf;

/// senler - Senler API v2 command-line client
///
/// Calls Senler API methods and prints the JSON response.
///
/// The access token is taken from --token, the SENLER_ACCESS_TOKEN environment
/// variable, or the "accessToken" field of the --config file, in that order.
///
/// Examples:
///   senler call subscribers/get -p count=10
///   senler --vk-group-id 123 call subscriptions/get
#[derive(Parser, Debug)]
#[command(author, version = env!("SENLER_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (also via SENLER_CONFIG)
    #[arg(
        long = "config",
        short = 'c',
        env = "SENLER_CONFIG",
        value_name = "PATH",
        global = true
    )]
    config_file: Option<PathBuf>,

    /// API access token
    #[arg(long, value_name = "TOKEN", global = true)]
    token: Option<String>,

    /// API base URL (defaults to https://api.senler.ru)
    #[arg(long = "base-url", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// API version path segment (defaults to v2)
    #[arg(long = "api-version", value_name = "VERSION", global = true)]
    api_version: Option<String>,

    /// VK community id added to every call
    #[arg(long = "vk-group-id", value_name = "ID", global = true)]
    vk_group_id: Option<u64>,

    /// Senler group id added to every call
    #[arg(long = "group-id", value_name = "ID", global = true)]
    group_id: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config_file.clone(),
            token: self.token.clone(),
            base_url: self.base_url.clone(),
            api_version: self.api_version.clone(),
            vk_group_id: self.vk_group_id,
            group_id: self.group_id,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Call an API method, e.g. "subscribers/get"
    Call(CallArgs),

    /// Print the resolved configuration (token masked)
    Config,
}

#[derive(clap::Args, Debug)]
struct CallArgs {
    /// API method name
    #[arg(value_name = "METHOD")]
    method: String,

    /// Request parameter; repeatable. Values that parse as JSON are sent as JSON.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Request parameters as a JSON object
    #[arg(long, value_name = "JSON")]
    data: Option<String>,

    /// Total attempts for transient failures
    #[arg(long, value_name = "N")]
    attempts: Option<usize>,

    /// Print the response on a single line
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RealRuntime;

    commands::logging_config(&runtime, cli.verbose)
        .builder()
        .init();

    let overrides = cli.overrides();

    match cli.command {
        Commands::Call(args) => {
            let options = CallOptions {
                method: args.method,
                params: args.params,
                data: args.data,
                compact: args.compact,
            };
            commands::call(runtime, overrides, options, args.attempts).await?
        }
        Commands::Config => commands::config(runtime, overrides)?,
    }
    Ok(())
}
