use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::mode::WriteMode;

use super::error::{CloseError, HandleError};
use super::Connection;

/// Outcome of a successful [`FileHandle::write_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The existing OS handle was used
    Reused,
    /// The handle was closed or unusable and had to be reopened first
    Reopened,
}

/// A file handle that can be shared between the pool and the workers.
///
/// The OS handle lives behind a mutex so that closing (eviction) and writing
/// never overlap: a close waits for an in-flight write to finish, and a write
/// that finds the handle closed reopens it in place.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileHandle {
    /// Open `path` with the disposition of `mode`.
    pub fn open<P: Into<PathBuf>>(path: P, mode: WriteMode) -> io::Result<Self> {
        let path = path.into();
        let file = mode.open_options().open(&path)?;
        Ok(Self::from_file(path, file))
    }

    /// Wrap an already open file.
    pub fn from_file<P: Into<PathBuf>>(path: P, file: File) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(Some(file)),
        }
    }

    /// A handle for `path` with no OS handle behind it yet.
    pub fn closed<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Path this handle writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an OS handle is currently held.
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Write `message` through a buffered writer and flush it.
    ///
    /// A closed or unusable handle is reopened with `mode` first. On a write
    /// or flush error the handle is closed, so the next call starts from a
    /// fresh OS handle.
    pub fn write_message(&self, message: &[u8], mode: WriteMode) -> Result<WriteOutcome, HandleError> {
        let mut slot = self.lock();

        let (file, outcome) = match slot.take().filter(|f| f.metadata().is_ok()) {
            Some(file) => (slot.insert(file), WriteOutcome::Reused),
            None => {
                log::debug!("File {} is closed or unusable, reopening", self.path.display());
                let file = mode
                    .open_options()
                    .open(&self.path)
                    .map_err(|source| HandleError::Open {
                        path: self.path.clone(),
                        source,
                    })?;
                (slot.insert(file), WriteOutcome::Reopened)
            }
        };

        let mut writer = BufWriter::new(&*file);
        let result = match writer.write_all(message) {
            Err(source) => Err(HandleError::Write {
                path: self.path.clone(),
                source,
            }),
            Ok(()) => writer.flush().map_err(|source| HandleError::Flush {
                path: self.path.clone(),
                source,
            }),
        };
        drop(writer);

        if result.is_err() {
            // Dropping the File closes it
            slot.take();
        }
        result.map(|()| outcome)
    }
}

impl Connection for FileHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn probe(&self) -> io::Result<()> {
        match self.lock().as_ref() {
            Some(file) => file.metadata().map(|_| ()),
            None => Err(io::Error::new(io::ErrorKind::Other, "file already closed")),
        }
    }

    fn close(&self) -> Result<(), CloseError> {
        // std does not surface close(2) errors; dropping is the close
        match self.lock().take() {
            Some(file) => {
                drop(file);
                Ok(())
            }
            None => Err(CloseError::AlreadyClosed),
        }
    }
}
