//! # Write Engine Module
//!
//! Fans one message out to many files concurrently.
//!
//! ## Design Principles
//!
//! 1. **Fixed worker pool**: a write runs `min(max_workers, targets)` named
//!    threads pulling from one bounded queue. Targets beyond 1000 are enqueued
//!    batch by batch so the queue never holds more than one batch.
//!
//! 2. **Failures are data**: acquisition errors, null target slots and
//!    exhausted retries are counted and recorded in [`Results`](crate::results::Results).
//!    Only precondition violations (unconfigured engine, empty target set,
//!    cancellation, overlapping write) fail the call itself.
//!
//! 3. **Snapshot per write**: each write copies its configuration under the
//!    engine lock, so setters never race the workers of a running write.
//!
//! 4. **Cooperative cancellation**: the [`CancelSignal`](crate::cancel::CancelSignal)
//!    is checked before dispatch and before every attempt.

mod config;
mod default;
mod engine_impl;
mod error;
mod pending;
mod target;

#[cfg(test)]
mod tests;

pub use config::{
    default_max_pool, ConfigError, ConfigMap, ConfigValue, WriterConfig, CONFIG_KEYS,
    DEFAULT_BACKOFF_MS, DEFAULT_RETRIES,
};
pub use default::{default_engine, DEFAULT_MESSAGE};
pub use engine_impl::{EngineState, WriteEngine};
pub use error::WriteError;
pub use pending::{start_with_cancel, PendingWrite};
pub use target::{targets_from_paths, Target};
