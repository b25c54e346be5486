use anyhow::{Context, Result, anyhow};
use log::debug;
use serde_json::Value;
use std::io::Write;

use crate::client::SenlerApi;
use crate::types::{RawResponse, RequestParams};

/// What to call and how to print the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    pub method: String,
    /// `key=value` pairs
    pub params: Vec<String>,
    /// JSON object merged under the `key=value` pairs
    pub data: Option<String>,
    pub compact: bool,
}

/// Parses `key=value`. The value is taken as JSON when it parses as JSON
/// (numbers, booleans, arrays), otherwise as a plain string.
pub fn parse_param(s: &str) -> Result<(String, Value)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid parameter '{}'. Expected KEY=VALUE.", s))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Invalid parameter '{}': key is empty.", s));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn build_params(pairs: &[String], data: Option<&str>) -> Result<RequestParams> {
    let mut params = match data {
        Some(data) => match serde_json::from_str(data).context("Failed to parse --data as JSON")? {
            Value::Object(map) => map,
            _ => return Err(anyhow!("--data must be a JSON object")),
        },
        None => RequestParams::new(),
    };

    for pair in pairs {
        let (key, value) = parse_param(pair)?;
        params.insert(key, value);
    }

    Ok(params)
}

#[tracing::instrument(skip(api, options, out))]
pub async fn run_call<A: SenlerApi + ?Sized>(
    api: &A,
    options: &CallOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let params = build_params(&options.params, options.data.as_deref())?;
    debug!("Calling {} with {} parameter(s)", options.method, params.len());

    let response = api.call_raw(&options.method, params, None).await?;
    print_response(out, &response, options.compact)
}

fn print_response(out: &mut dyn Write, response: &RawResponse, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(response)?
    } else {
        serde_json::to_string_pretty(response)?
    };
    writeln!(out, "{}", rendered)?;
    Ok(())
}
