//! # fanwrite - Concurrent Fan-Out File Writer
//!
//! `fanwrite` writes one message to a large set of files concurrently while
//! keeping the number of open file descriptors bounded.
//!
//! ## Key Features
//!
//! - **Fixed Worker Pool**: a write runs at most `max_workers` threads pulling
//!   targets from one bounded queue, never one thread per file.
//!
//! - **Bounded Handle Pool**: open handles are cached per path with
//!   least-recently-used eviction and a liveness probe on every lookup.
//!
//! - **Retry with Backoff**: each target is retried with exponential backoff
//!   capped at one second per step.
//!
//! - **Partial Success as Data**: per-target failures are counted and
//!   recorded in [`Results`](results::Results); only precondition violations
//!   fail the write itself.
//!
//! - **Cooperative Cancellation**: writes can be cancelled or bounded by a
//!   timeout, checked before dispatch and before every attempt.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fanwrite::prelude::*;
//!
//! let engine = WriteEngine::new(
//!     Some(targets_from_paths(["/var/log/a.log", "/var/log/b.log"])),
//!     Some(WriteMode::Append),
//!     Some("Hello, World!\n".to_string()),
//!     64,  // pooled handles
//!     3,   // attempts per target
//!     100, // initial backoff (ms)
//! );
//!
//! let results = engine.write(0)?;
//! println!("{}", results);
//! # Ok::<(), fanwrite::engine::WriteError>(())
//! ```
//!
//! ## Configuration
//!
//! Engines can also be built from JSON or TOML:
//!
//! ```rust,no_run
//! use fanwrite::engine::{WriteEngine, WriterConfig};
//!
//! let config = WriterConfig::from_json(r#"{
//!     "files": ["out/a.txt", "out/b.txt"],
//!     "mode": "w",
//!     "message": "hello",
//!     "maxPool": 10,
//!     "retries": 3,
//!     "backoff": 100
//! }"#)?;
//! let engine = WriteEngine::from_config(config)?;
//! # Ok::<(), fanwrite::engine::ConfigError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`engine`]: the write engine, its configuration and the default instance
//! - [`pool`]: bounded LRU pool of shared file handles
//! - [`retry`]: bounded retry with capped exponential backoff
//! - [`batch`]: fixed-stride batching of large target lists
//! - [`results`]: thread-safe aggregation and rendering of outcomes
//! - [`cancel`]: cooperative cancellation signal with optional deadline
//! - [`mode`]: validated write mode token

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod cancel;
pub mod engine;
pub mod mode;
pub mod pool;
pub mod results;
pub mod retry;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::cancel::{CancelReason, CancelSignal};
    pub use crate::engine::{
        default_engine, start_with_cancel, targets_from_paths, ConfigError, ConfigMap,
        ConfigValue, EngineState, PendingWrite, Target, WriteEngine, WriteError, WriterConfig,
    };
    pub use crate::mode::{ModeError, WriteMode};
    pub use crate::pool::{ConnectionPool, FileHandle, PoolError};
    pub use crate::results::{FailureRecord, Results};
    pub use crate::retry::{RetryError, RetryPolicy};
}
