//! Engine configuration: a typed structure loadable from JSON or TOML, and an
//! explicitly typed key/value map for dynamic callers.
//!
//! ```json
//! {
//!   "files": ["/path/to/file1", "/path/to/file2"],
//!   "mode": "a",
//!   "message": "Hello, World!",
//!   "maxPool": 10,
//!   "retries": 3,
//!   "backoff": 100
//! }
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::batch::available_cpus;
use crate::mode::{ModeError, WriteMode};

use super::target::Target;

/// Retry count used when none is configured.
pub const DEFAULT_RETRIES: u64 = 2;

/// Initial backoff in milliseconds used when none is configured.
pub const DEFAULT_BACKOFF_MS: u64 = 100;

/// Pool capacity used when none is configured: four handles per CPU.
pub fn default_max_pool() -> u64 {
    (available_cpus() as u64).saturating_mul(4)
}

/// Keys accepted by [`WriteEngine::from_map`](super::WriteEngine::from_map).
pub const CONFIG_KEYS: [&str; 6] = ["files", "mode", "message", "retries", "backoff", "maxPool"];

/// Errors raised while building an engine from configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A map key outside [`CONFIG_KEYS`]
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// A required map key is absent
    #[error("missing key: {0}")]
    MissingKey(&'static str),

    /// A map value has the wrong type for its key
    #[error("{key} is not a {expected} (got {found})")]
    TypeMismatch {
        /// Offending key
        key: &'static str,
        /// Type the key requires
        expected: &'static str,
        /// Type that was supplied
        found: &'static str,
    },

    /// A required field of [`WriterConfig`] is unset
    #[error("{0} is not set")]
    MissingField(&'static str),

    /// Invalid mode token
    #[error("Invalid mode: {0}")]
    Mode(#[from] ModeError),

    /// Malformed JSON configuration
    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed TOML configuration
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

/// Typed engine configuration.
///
/// `files`, `mode` and `message` are required by
/// [`WriteEngine::from_config`](super::WriteEngine::from_config); the numeric
/// fields fall back to [`DEFAULT_RETRIES`], [`DEFAULT_BACKOFF_MS`] and
/// [`default_max_pool`] when omitted from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct WriterConfig {
    /// Paths of the target files
    pub files: Option<Vec<PathBuf>>,

    /// Write disposition (`"a"` or `"w"`)
    pub mode: Option<WriteMode>,

    /// Message written to every target
    pub message: Option<String>,

    /// Maximum number of pooled handles
    pub max_pool: u64,

    /// Attempts per target (`0` = single attempt, no retry)
    pub retries: u64,

    /// Initial backoff between attempts, in milliseconds
    pub backoff: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            files: None,
            mode: None,
            message: None,
            max_pool: default_max_pool(),
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF_MS,
        }
    }
}

impl WriterConfig {
    /// Parse a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }
}

/// Value of one key in a [`ConfigMap`]
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// Target slots (`files`)
    Targets(Vec<Option<Target>>),
    /// Write mode (`mode`)
    Mode(WriteMode),
    /// Message text (`message`)
    Message(String),
    /// Unsigned integer (`retries`, `backoff`, `maxPool`)
    UInt(u64),
}

impl ConfigValue {
    /// Validate a mode token into a [`ConfigValue::Mode`].
    pub fn mode(token: &str) -> Result<Self, ConfigError> {
        Ok(ConfigValue::Mode(token.parse()?))
    }

    fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Targets(_) => "target list",
            ConfigValue::Mode(_) => "mode",
            ConfigValue::Message(_) => "string",
            ConfigValue::UInt(_) => "unsigned integer",
        }
    }
}

/// Dynamic configuration keyed by the names in [`CONFIG_KEYS`].
pub type ConfigMap = HashMap<String, ConfigValue>;

/// Fields extracted from a validated [`ConfigMap`]
#[derive(Debug)]
pub(crate) struct MapConfig {
    pub targets: Vec<Option<Target>>,
    pub mode: WriteMode,
    pub message: String,
    pub retries: u64,
    pub backoff: u64,
    pub max_pool: u64,
}

impl MapConfig {
    /// Check that `map` holds exactly the expected keys with the expected types.
    pub fn parse(mut map: ConfigMap) -> Result<Self, ConfigError> {
        if let Some(key) = map.keys().find(|k| !CONFIG_KEYS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownKey(key.clone()));
        }

        let targets = match take(&mut map, "files")? {
            ConfigValue::Targets(targets) => targets,
            other => return Err(mismatch("files", "target list", &other)),
        };
        let mode = match take(&mut map, "mode")? {
            ConfigValue::Mode(mode) => mode,
            other => return Err(mismatch("mode", "mode", &other)),
        };
        let message = match take(&mut map, "message")? {
            ConfigValue::Message(message) => message,
            other => return Err(mismatch("message", "string", &other)),
        };

        Ok(Self {
            targets,
            mode,
            message,
            retries: take_uint(&mut map, "retries")?,
            backoff: take_uint(&mut map, "backoff")?,
            max_pool: take_uint(&mut map, "maxPool")?,
        })
    }
}

fn take(map: &mut ConfigMap, key: &'static str) -> Result<ConfigValue, ConfigError> {
    map.remove(key).ok_or(ConfigError::MissingKey(key))
}

fn take_uint(map: &mut ConfigMap, key: &'static str) -> Result<u64, ConfigError> {
    match take(map, key)? {
        ConfigValue::UInt(value) => Ok(value),
        other => Err(mismatch(key, "unsigned integer", &other)),
    }
}

fn mismatch(key: &'static str, expected: &'static str, found: &ConfigValue) -> ConfigError {
    ConfigError::TypeMismatch {
        key,
        expected,
        found: found.type_name(),
    }
}
