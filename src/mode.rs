//! Write disposition for every target of a run.
//!
//! A [`WriteMode`] is the validated form of the `"a"` / `"w"` token accepted by
//! the configuration layer. Parsing trims surrounding whitespace and ignores
//! case; anything else is rejected.

use std::fmt;
use std::fs::OpenOptions;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tokens accepted by [`WriteMode::from_str`], in canonical form.
const AVAILABLE_MODES: &[&str] = &["a", "w"];

/// Errors produced while validating a mode token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    /// The token is not one of the supported modes
    #[error("mode is not available, please use 'a' or 'w', got: {0}")]
    Unsupported(String),
}

/// How a target is opened when the engine has to (re)open it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WriteMode {
    /// Append to the end of the file (`"a"`)
    #[default]
    Append,
    /// Truncate the file before writing (`"w"`)
    Truncate,
}

impl WriteMode {
    /// Returns the canonical tokens of every supported mode.
    pub fn available_modes() -> &'static [&'static str] {
        AVAILABLE_MODES
    }

    /// Canonical one-letter token of this mode.
    pub fn as_token(&self) -> &'static str {
        match self {
            WriteMode::Append => "a",
            WriteMode::Truncate => "w",
        }
    }

    /// OS open disposition: read/write, create if absent, then append or truncate.
    pub fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        match self {
            WriteMode::Append => options.append(true),
            WriteMode::Truncate => options.truncate(true),
        };
        options
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for WriteMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean = s.trim().to_lowercase();
        match clean.as_str() {
            "a" => Ok(WriteMode::Append),
            "w" => Ok(WriteMode::Truncate),
            _ => {
                log::warn!(
                    "Mode is not available, please use 'a' or 'w', got: {}",
                    clean
                );
                Err(ModeError::Unsupported(clean))
            }
        }
    }
}

impl TryFrom<String> for WriteMode {
    type Error = ModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WriteMode> for String {
    fn from(mode: WriteMode) -> Self {
        mode.as_token().to_string()
    }
}
