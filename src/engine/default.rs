use std::sync::OnceLock;

use crate::mode::WriteMode;

use super::config::{default_max_pool, DEFAULT_BACKOFF_MS, DEFAULT_RETRIES};
use super::engine_impl::WriteEngine;

/// Message carried by the default engine until it is changed.
pub const DEFAULT_MESSAGE: &str = "Add text to write";

static DEFAULT_ENGINE: OnceLock<WriteEngine> = OnceLock::new();

/// Process-wide engine, created on first use.
///
/// It starts with an empty target set, append mode, [`DEFAULT_MESSAGE`], a
/// pool of four handles per CPU, two attempts per target and a 100 ms
/// backoff. Populate it with [`WriteEngine::set_targets`] before writing.
///
/// The engine is shared by every caller in the process: a write started while
/// another one is running fails with
/// [`WriteError::Busy`](super::WriteError::Busy), and configuration changes
/// are visible to everyone. Prefer a dedicated [`WriteEngine`] when that is
/// not wanted.
pub fn default_engine() -> &'static WriteEngine {
    DEFAULT_ENGINE.get_or_init(|| {
        WriteEngine::new(
            Some(Vec::new()),
            Some(WriteMode::Append),
            Some(DEFAULT_MESSAGE.to_string()),
            default_max_pool(),
            DEFAULT_RETRIES,
            DEFAULT_BACKOFF_MS,
        )
    })
}
