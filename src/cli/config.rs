//! TOML configuration file support.
//!
//! Instead of passing many CLI flags, users can specify settings in a config file:
//!
//! ```toml
//! # fanwrite.toml
//! [writer]
//! files = ["/var/log/app/a.log", "/var/log/app/b.log"]
//! mode = "a"
//! message = "rotated"
//! maxPool = 64
//! retries = 3
//! backoff = 100
//!
//! [run]
//! workers = 8
//! timeout_ms = 5000
//! ```
//!
//! Command-line flags override values from the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use fanwrite::engine::WriterConfig;

/// Root configuration structure for fanwrite.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Engine settings, in the same shape as the JSON configuration.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Invocation settings.
    #[serde(default)]
    pub run: RunConfig,
}

/// Settings of one write invocation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Worker threads (0 = number of CPUs).
    pub workers: Option<usize>,

    /// Timeout for the whole write, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}
