use anyhow::Result;
use log::debug;
use std::io::Write;
use std::path::PathBuf;

use crate::errors::ApiError;
use crate::http::ApiConfig;
use crate::http::config::mask_token;
use crate::runtime::Runtime;

/// Connection settings given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub vk_group_id: Option<u64>,
    pub group_id: Option<u64>,
}

/// Resolves the API config: config file, then `SENLER_*` environment
/// variables, then command line flags, each overriding the previous.
#[tracing::instrument(skip(runtime, overrides))]
pub fn resolve_api_config<R: Runtime + ?Sized>(
    runtime: &R,
    overrides: &ConfigOverrides,
) -> Result<ApiConfig> {
    let mut config = match &overrides.config_file {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            ApiConfig::load(runtime, path)?
        }
        None => ApiConfig::new(String::new()),
    };

    config.apply_env(runtime)?;

    if let Some(token) = &overrides.token {
        config.access_token = token.clone();
    }
    if let Some(base_url) = &overrides.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(version) = &overrides.api_version {
        config.api_version = Some(version.clone());
    }
    if let Some(id) = overrides.vk_group_id {
        config.vk_group_id = Some(id);
    }
    if let Some(id) = overrides.group_id {
        config.group_id = Some(id);
    }

    if config.access_token.trim().is_empty() {
        return Err(ApiError::InvalidConfig(
            "no access token: pass --token, set SENLER_ACCESS_TOKEN or use --config".into(),
        )
        .into());
    }

    config.validate()?;
    Ok(config)
}

/// Prints the resolved configuration as JSON with the token masked.
pub fn show_config<R: Runtime + ?Sized>(
    runtime: &R,
    overrides: &ConfigOverrides,
    out: &mut dyn Write,
) -> Result<()> {
    let mut config = resolve_api_config(runtime, overrides)?;
    config.access_token = mask_token(&config.access_token);
    if config.base_url.is_none() {
        config.base_url = Some(config.base_url().to_string());
    }
    if config.api_version.is_none() {
        config.api_version = Some(config.api_version().to_string());
    }

    writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
    Ok(())
}
