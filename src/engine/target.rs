use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::mode::WriteMode;
use crate::pool::FileHandle;

/// A file the engine writes to.
///
/// A target is identified by its path. It may carry a handle the caller
/// already opened; otherwise the engine opens one on first use with the
/// engine's mode.
#[derive(Debug, Clone)]
pub struct Target {
    path: PathBuf,
    handle: Option<Arc<FileHandle>>,
}

impl Target {
    /// Target opened lazily by the engine.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    /// Open `path` now with `mode`.
    pub fn open<P: Into<PathBuf>>(path: P, mode: WriteMode) -> io::Result<Self> {
        let handle = FileHandle::open(path, mode)?;
        Ok(Self::from_handle(Arc::new(handle)))
    }

    /// Target backed by a file the caller opened.
    pub fn from_file<P: Into<PathBuf>>(path: P, file: File) -> Self {
        Self::from_handle(Arc::new(FileHandle::from_file(path, file)))
    }

    /// Target backed by an existing shared handle.
    pub fn from_handle(handle: Arc<FileHandle>) -> Self {
        Self {
            path: handle.path().to_path_buf(),
            handle: Some(handle),
        }
    }

    /// Path of the target.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle supplied with the target, if any.
    pub fn handle(&self) -> Option<&Arc<FileHandle>> {
        self.handle.as_ref()
    }
}

impl From<PathBuf> for Target {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for Target {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Wrap every path as a present, lazily opened target slot.
pub fn targets_from_paths<I, P>(paths: I) -> Vec<Option<Target>>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths.into_iter().map(|p| Some(Target::new(p))).collect()
}
