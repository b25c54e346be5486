//! Runtime abstraction for system operations.
//!
//! The client and the CLI read configuration from the environment and from
//! JSON files. Going through this trait keeps those reads mockable.
//!
//! - `env` - Environment variables
//! - `fs` - File reads

mod env;
mod fs;

use anyhow::Result;
use std::env as std_env;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// Runtime backed by the real process environment and file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }
}
