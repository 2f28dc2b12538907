use std::io;
use std::path::PathBuf;

use crate::cancel::CancelReason;
use crate::pool::{HandleError, PoolError};

/// Errors returned by [`WriteEngine`](super::WriteEngine) operations
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A required field (targets, mode or message) is not set
    #[error("{0} is not set")]
    NotConfigured(&'static str),

    /// The target set is empty
    #[error("files is empty")]
    EmptyTargets,

    /// The cancellation signal fired before or during the write
    #[error("write cancelled: {0}")]
    Cancelled(CancelReason),

    /// Another write is already running on this engine
    #[error("a write is already in progress on this engine")]
    Busy,

    /// A target slot held no target
    #[error("received null target")]
    NullTarget,

    /// Pool operation failed
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// I/O error while opening a target outside of a write
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Target path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Opening, writing or flushing through a handle failed
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// The handle supplied for a target is already closed
    #[error("file {} is already closed", .0.display())]
    HandleClosed(PathBuf),

    /// A worker or dispatcher thread could not be spawned
    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] io::Error),

    /// A worker or dispatcher thread panicked
    #[error("writer thread panicked")]
    ThreadPanicked,
}
