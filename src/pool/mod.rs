//! # Connection Pool
//!
//! A bounded cache of open handles keyed by path.
//!
//! ## Design Principles
//!
//! 1. **Bounded descriptors**: at most `capacity` handles are retained. When a
//!    new path is admitted into a full pool, the least-recently-used entry is
//!    evicted and closed. Ties on the last-used stamp go to the entry that was
//!    inserted first.
//!
//! 2. **Liveness on lookup**: a pooled handle is probed (stat) before it is
//!    handed out. A handle that fails the probe is evicted and replaced.
//!
//! 3. **One membership lock**: a single `RwLock` guards the entry map. Lookups
//!    take the read side and refresh the last-used stamp atomically; inserts,
//!    evictions and closes take the write side. Evicted handles are closed
//!    after the lock is released.

mod error;
mod handle;


pub use error::{CloseError, HandleError, PoolError};
pub use handle::{FileHandle, WriteOutcome};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// A handle the pool can verify and close.
pub trait Connection: Send + Sync {
    /// Path the handle belongs to.
    fn path(&self) -> &Path;

    /// Cheap liveness check; `Err` means the handle is unusable.
    fn probe(&self) -> io::Result<()>;

    /// Release the OS resource.
    fn close(&self) -> Result<(), CloseError>;
}

struct PoolEntry<C> {
    conn: Arc<C>,
    last_used: AtomicU64,
    seq: u64,
}

struct Members<C> {
    entries: HashMap<PathBuf, PoolEntry<C>>,
    next_seq: u64,
}

/// Bounded LRU pool of shared handles
pub struct ConnectionPool<C> {
    members: RwLock<Members<C>>,
    capacity: AtomicUsize,
    epoch: Instant,
    clock: AtomicU64,
}

impl<C: Connection> ConnectionPool<C> {
    /// Create a pool retaining at most `capacity` handles (`0` behaves as `1`).
    pub fn new(capacity: usize) -> Self {
        Self {
            members: RwLock::new(Members {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            capacity: AtomicUsize::new(capacity.max(1)),
            epoch: Instant::now(),
            clock: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Members<C>> {
        self.members.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Members<C>> {
        self.members.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Strictly increasing nanosecond stamp since pool creation.
    fn stamp(&self) -> u64 {
        let now = self.epoch.elapsed().as_nanos() as u64;
        match self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            }) {
            Ok(prev) | Err(prev) => now.max(prev + 1),
        }
    }

    /// Maximum number of retained handles.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Change the bound, evicting least-recently-used entries if it shrank.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::SeqCst);

        let mut victims = Vec::new();
        {
            let mut members = self.write();
            while members.entries.len() > capacity {
                match Self::pop_lru(&mut members) {
                    Some(victim) => victims.push(victim),
                    None => break,
                }
            }
        }
        Self::close_quietly(victims);
    }

    /// Number of pooled entries.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists for `path` (live or not).
    pub fn contains(&self, path: &Path) -> bool {
        self.read().entries.contains_key(path)
    }

    /// Paths currently pooled, in no particular order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.read().entries.keys().cloned().collect()
    }

    /// Pooled handle for `path` without any liveness check.
    pub fn get(&self, path: &Path) -> Option<Arc<C>> {
        self.read().entries.get(path).map(|e| Arc::clone(&e.conn))
    }

    /// Verify that `path` is pooled and its handle passes the probe.
    pub fn check(&self, path: &Path) -> Result<(), PoolError> {
        let members = self.read();
        let Some(entry) = members.entries.get(path) else {
            log::debug!("File {} not found in pool", path.display());
            return Err(PoolError::NotFound(path.to_path_buf()));
        };
        entry.conn.probe().map_err(|source| {
            log::debug!("File {} is closed or has error: {}", path.display(), source);
            PoolError::Unusable {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Live pooled handle for `path`, or a new one produced by `open`.
    ///
    /// A pooled handle failing its probe is evicted and closed before `open`
    /// runs, whether or not `open` then succeeds. `open` runs without the
    /// pool lock held; if another thread admitted a live handle for the same
    /// path meanwhile, that handle wins and the freshly opened one is dropped.
    pub fn acquire_with<F>(&self, path: &Path, open: F) -> Result<Arc<C>, PoolError>
    where
        F: FnOnce() -> io::Result<Arc<C>>,
    {
        if let Some(conn) = self.lookup_live(path) {
            return Ok(conn);
        }
        self.evict_unusable(path);

        let fresh = open().map_err(|source| PoolError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut victims = Vec::new();
        let conn = {
            let mut members = self.write();
            match members.entries.get(path) {
                Some(entry) if entry.conn.probe().is_ok() => {
                    entry.last_used.store(self.stamp(), Ordering::SeqCst);
                    Arc::clone(&entry.conn)
                }
                _ => {
                    if let Some(stale) = members.entries.remove(path) {
                        victims.push(stale.conn);
                    }
                    victims.extend(self.make_room(&mut members));
                    self.admit(&mut members, path, Arc::clone(&fresh));
                    fresh
                }
            }
        };
        Self::close_quietly(victims);
        Ok(conn)
    }

    fn lookup_live(&self, path: &Path) -> Option<Arc<C>> {
        let members = self.read();
        let entry = members.entries.get(path)?;
        match entry.conn.probe() {
            Ok(()) => {
                log::debug!("File {} found in pool", path.display());
                entry.last_used.store(self.stamp(), Ordering::SeqCst);
                Some(Arc::clone(&entry.conn))
            }
            Err(err) => {
                log::debug!("File {} in pool is no longer usable: {}", path.display(), err);
                None
            }
        }
    }

    /// Remove and close the entry for `path` if it still fails its probe.
    fn evict_unusable(&self, path: &Path) {
        let stale = {
            let mut members = self.write();
            match members.entries.get(path) {
                Some(entry) if entry.conn.probe().is_err() => members.entries.remove(path),
                _ => None,
            }
        };
        if let Some(stale) = stale {
            log::debug!("Evicting unusable file {}", path.display());
            Self::close_quietly(vec![stale.conn]);
        }
    }

    /// Add `conn` under `path` unless an entry already exists.
    pub fn insert(&self, path: &Path, conn: Arc<C>) {
        let victims = {
            let mut members = self.write();
            if members.entries.contains_key(path) {
                log::debug!("File {} already exists in pool", path.display());
                return;
            }
            let victims = self.make_room(&mut members);
            self.admit(&mut members, path, conn);
            victims
        };
        log::debug!("File {} added to pool", path.display());
        Self::close_quietly(victims);
    }

    /// Install `conn` as the entry for `path`, closing a different handle it
    /// displaces. A new path is admitted through the LRU bound.
    pub fn replace(&self, path: &Path, conn: Arc<C>) {
        let mut victims = Vec::new();
        {
            let mut members = self.write();
            let stamp = self.stamp();
            match members.entries.get_mut(path) {
                Some(entry) => {
                    if !Arc::ptr_eq(&entry.conn, &conn) {
                        victims.push(std::mem::replace(&mut entry.conn, conn));
                    }
                    entry.last_used.store(stamp, Ordering::SeqCst);
                }
                None => {
                    victims.extend(self.make_room(&mut members));
                    self.admit(&mut members, path, conn);
                }
            }
        }
        Self::close_quietly(victims);
    }

    /// Detach the entry for `path` without closing it.
    pub fn remove(&self, path: &Path) -> Result<Arc<C>, PoolError> {
        match self.write().entries.remove(path) {
            Some(entry) => {
                log::debug!("File {} removed from pool", path.display());
                Ok(entry.conn)
            }
            None => {
                log::debug!("File {} not found", path.display());
                Err(PoolError::NotFound(path.to_path_buf()))
            }
        }
    }

    /// Detach and close the entry for `path`.
    pub fn close(&self, path: &Path) -> Result<(), PoolError> {
        let conn = self.remove(path)?;
        match conn.close() {
            Ok(()) | Err(CloseError::AlreadyClosed) => {
                log::debug!("File {} closed", path.display());
                Ok(())
            }
            Err(CloseError::Io(source)) => Err(PoolError::Close {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Drain and close every entry.
    ///
    /// Handles that were already closed count as closed. Genuine failures are
    /// combined into [`PoolError::CloseAll`]; every entry is removed either way.
    pub fn close_all(&self) -> Result<(), PoolError> {
        let drained: Vec<(PathBuf, Arc<C>)> = self
            .write()
            .entries
            .drain()
            .map(|(path, entry)| (path, entry.conn))
            .collect();

        let mut errors = Vec::new();
        for (path, conn) in drained {
            match conn.close() {
                Ok(()) => log::debug!("File {} closed or removed from pool", path.display()),
                Err(CloseError::AlreadyClosed) => {
                    log::debug!("File {} was already closed", path.display())
                }
                Err(CloseError::Io(source)) => {
                    log::debug!("Error closing file {}: {}", path.display(), source);
                    errors.push(PoolError::Close { path, source });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::CloseAll(errors))
        }
    }

    /// Drop every entry without closing; a handle closes once its last
    /// reference is gone.
    pub fn clear(&self) {
        let mut members = self.write();
        members.entries.clear();
        members.next_seq = 0;
    }

    fn admit(&self, members: &mut Members<C>, path: &Path, conn: Arc<C>) {
        let seq = members.next_seq;
        members.next_seq += 1;
        members.entries.insert(
            path.to_path_buf(),
            PoolEntry {
                conn,
                last_used: AtomicU64::new(self.stamp()),
                seq,
            },
        );
    }

    /// Evict until one more entry fits.
    fn make_room(&self, members: &mut Members<C>) -> Vec<Arc<C>> {
        let capacity = self.capacity();
        let mut victims = Vec::new();
        while members.entries.len() >= capacity {
            match Self::pop_lru(members) {
                Some(victim) => victims.push(victim),
                None => break,
            }
        }
        victims
    }

    fn pop_lru(members: &mut Members<C>) -> Option<Arc<C>> {
        let oldest = members
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.last_used.load(Ordering::SeqCst), e.seq))
            .map(|(path, _)| path.clone())?;
        log::debug!("Evicting least recently used file {}", oldest.display());
        members.entries.remove(&oldest).map(|e| e.conn)
    }

    fn close_quietly(victims: Vec<Arc<C>>) {
        for conn in victims {
            match conn.close() {
                Ok(()) | Err(CloseError::AlreadyClosed) => {}
                Err(CloseError::Io(err)) => {
                    log::warn!("Error closing evicted file {}: {}", conn.path().display(), err)
                }
            }
        }
    }
}

impl<C> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .members
            .read()
            .map(|m| m.entries.len())
            .unwrap_or_default();
        f.debug_struct("ConnectionPool")
            .field("len", &len)
            .field("capacity", &self.capacity.load(Ordering::SeqCst))
            .finish()
    }
}
