use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors returned by [`ConnectionPool`](super::ConnectionPool) operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No entry is pooled under the path
    #[error("file {} not found in pool", .0.display())]
    NotFound(PathBuf),

    /// The pooled handle failed its liveness probe
    #[error("file {} in pool is no longer usable: {source}", .path.display())]
    Unusable {
        /// Pooled path
        path: PathBuf,
        /// Probe failure
        source: io::Error,
    },

    /// A handle could not be opened for admission
    #[error("error opening file {}: {source}", .path.display())]
    Open {
        /// Path being opened
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Closing a handle failed
    #[error("error closing file {}: {source}", .path.display())]
    Close {
        /// Path of the handle
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Several handles failed to close during a drain
    #[error("multiple errors closing files: {}", DisplayList(.0))]
    CloseAll(Vec<PoolError>),
}

/// Outcome of [`Connection::close`](super::Connection::close) other than success
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    /// The handle had already been closed; callers treat this as success
    #[error("file already closed")]
    AlreadyClosed,

    /// The OS reported a failure while closing
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while writing through a [`FileHandle`](super::FileHandle)
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The handle could not be (re)opened
    #[error("error opening file {}: {source}", .path.display())]
    Open {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// The buffered write failed
    #[error("error writing to file {}: {source}", .path.display())]
    Write {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Flushing the buffered writer failed
    #[error("error flushing buffer for file {}: {source}", .path.display())]
    Flush {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

struct DisplayList<'a>(&'a [PoolError]);

impl fmt::Display for DisplayList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        f.write_str("]")
    }
}
