use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};

use crate::batch::{self, available_cpus};
use crate::cancel::CancelSignal;
use crate::mode::WriteMode;
use crate::pool::{ConnectionPool, FileHandle, PoolError, WriteOutcome};
use crate::results::{Results, ResultsAggregator, NULL_TARGET_KEY};
use crate::retry::{run_with_retry_using, RetryPolicy};

use super::config::{ConfigError, ConfigMap, MapConfig, WriterConfig};
use super::error::WriteError;
use super::pending::{start_with_cancel, PendingWrite};
use super::target::{targets_from_paths, Target};

/// Lifecycle state of a [`WriteEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Targets, mode or message is missing
    Unconfigured,
    /// Fully configured and idle
    Ready,
    /// A write is in flight
    Writing,
}

/// Mutable configuration guarded by the engine lock
#[derive(Debug)]
struct Settings {
    targets: Option<Vec<Option<Target>>>,
    mode: Option<WriteMode>,
    message: Option<String>,
    retries: u64,
    backoff_ms: u64,
    max_pool: u64,
    signal: CancelSignal,
}

impl Settings {
    /// The first required field that is unset, if any.
    fn missing(&self) -> Option<&'static str> {
        if self.targets.is_none() {
            Some("files")
        } else if self.mode.is_none() {
            Some("mode")
        } else if self.message.is_none() {
            Some("message")
        } else {
            None
        }
    }

    fn require_ready(&self) -> Result<(), WriteError> {
        match self.missing() {
            Some(field) => {
                log::warn!("Writer is not configured: {} is not set", field);
                Err(WriteError::NotConfigured(field))
            }
            None => Ok(()),
        }
    }
}

/// Immutable copy of everything one write needs
struct WriteJob {
    targets: Vec<Option<Target>>,
    mode: WriteMode,
    message: Vec<u8>,
    policy: RetryPolicy,
    signal: CancelSignal,
}

/// Clears the busy flag when the write that set it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, WriteError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| WriteError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Concurrent fan-out writer.
///
/// Writes one message to every target using a fixed pool of worker threads,
/// a bounded pool of open file handles, and per-target retry with
/// exponential backoff. Per-target failures are reported in [`Results`];
/// only precondition violations fail [`write`](Self::write) itself.
///
/// # Example
///
/// ```rust,no_run
/// use fanwrite::prelude::*;
///
/// let engine = WriteEngine::new(
///     Some(targets_from_paths(["a.log", "b.log"])),
///     Some(WriteMode::Append),
///     Some("Hello, World!".to_string()),
///     16,
///     3,
///     100,
/// );
/// let results = engine.write(0)?;
/// println!("{}", results);
/// # Ok::<(), fanwrite::engine::WriteError>(())
/// ```
#[derive(Debug)]
pub struct WriteEngine {
    settings: RwLock<Settings>,
    pool: ConnectionPool<FileHandle>,
    busy: AtomicBool,
}

impl WriteEngine {
    /// Create an engine. Absent targets, mode or message leave it
    /// [`EngineState::Unconfigured`].
    pub fn new(
        targets: Option<Vec<Option<Target>>>,
        mode: Option<WriteMode>,
        message: Option<String>,
        max_pool: u64,
        retries: u64,
        backoff_ms: u64,
    ) -> Self {
        Self {
            settings: RwLock::new(Settings {
                targets,
                mode,
                message,
                retries,
                backoff_ms,
                max_pool,
                signal: CancelSignal::new(),
            }),
            pool: ConnectionPool::new(pool_capacity(max_pool)),
            busy: AtomicBool::new(false),
        }
    }

    /// Build from a typed configuration; `files`, `mode` and `message` are required.
    pub fn from_config(config: WriterConfig) -> Result<Self, ConfigError> {
        let files = config.files.ok_or(ConfigError::MissingField("files"))?;
        let mode = config.mode.ok_or(ConfigError::MissingField("mode"))?;
        let message = config.message.ok_or(ConfigError::MissingField("message"))?;
        Ok(Self::new(
            Some(targets_from_paths(files)),
            Some(mode),
            Some(message),
            config.max_pool,
            config.retries,
            config.backoff,
        ))
    }

    /// Build from a map holding exactly the keys
    /// [`CONFIG_KEYS`](super::CONFIG_KEYS) with their expected types.
    pub fn from_map(map: ConfigMap) -> Result<Self, ConfigError> {
        let config = MapConfig::parse(map)?;
        Ok(Self::new(
            Some(config.targets),
            Some(config.mode),
            Some(config.message),
            config.max_pool,
            config.retries,
            config.backoff,
        ))
    }

    /// Build from a JSON document (see [`WriterConfig::from_json`]).
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Self::from_config(WriterConfig::from_json(content)?)
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_settings(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        if self.busy.load(Ordering::Acquire) {
            EngineState::Writing
        } else if self.read().missing().is_some() {
            EngineState::Unconfigured
        } else {
            EngineState::Ready
        }
    }

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------

    /// Write the message to every target with at most `max_workers` threads
    /// (`0` = number of CPUs).
    ///
    /// # Errors
    ///
    /// Fails without touching any file when the attached cancellation signal
    /// is already done, the engine is not configured, the target set is empty,
    /// or another write is running on this engine.
    pub fn write(&self, max_workers: usize) -> Result<Results, WriteError> {
        let signal = self.cancel_signal();
        self.write_with_signal(max_workers, &signal)
    }

    /// Like [`write`](Self::write), but gives up on remaining targets once
    /// `timeout` has elapsed. The engine's attached signal is left untouched.
    ///
    /// Backoff sleeps end as soon as the deadline passes and remaining
    /// attempts fail at once, so the call returns shortly after `timeout`.
    /// An OS write already in flight still completes.
    pub fn write_with_timeout(
        &self,
        max_workers: usize,
        timeout: Duration,
    ) -> Result<Results, WriteError> {
        let signal = self.cancel_signal().with_child_timeout(timeout);
        self.write_with_signal(max_workers, &signal)
    }

    /// Run a write on a background thread; see [`start_with_cancel`](super::start_with_cancel).
    pub fn start_with_cancel(self: &Arc<Self>, max_workers: usize) -> PendingWrite {
        start_with_cancel(Arc::clone(self), max_workers)
    }

    pub(crate) fn write_with_signal(
        &self,
        max_workers: usize,
        signal: &CancelSignal,
    ) -> Result<Results, WriteError> {
        if let Err(reason) = signal.check() {
            log::debug!("Write aborted before dispatch: {}", reason);
            return Err(WriteError::Cancelled(reason));
        }

        let _busy = BusyGuard::acquire(&self.busy)?;
        let job = self.snapshot(signal)?;
        let total = job.targets.len();
        let workers = worker_count(max_workers, total);

        log::debug!("Writing to {} targets with {} workers", total, workers);
        let aggregator = ResultsAggregator::new();
        self.dispatch(&job, workers, &aggregator)?;

        let results = aggregator.finalize(total as u64);
        log::info!(
            "Wrote {} of {} targets ({} failed)",
            results.success,
            results.total,
            results.failure
        );
        Ok(results)
    }

    fn snapshot(&self, signal: &CancelSignal) -> Result<WriteJob, WriteError> {
        let settings = self.read();
        settings.require_ready()?;

        let (Some(targets), Some(mode), Some(message)) =
            (&settings.targets, settings.mode, &settings.message)
        else {
            return Err(WriteError::NotConfigured("files"));
        };
        if targets.is_empty() {
            return Err(WriteError::EmptyTargets);
        }

        Ok(WriteJob {
            targets: targets.clone(),
            mode,
            message: message.clone().into_bytes(),
            policy: RetryPolicy::new(settings.retries, settings.backoff_ms),
            signal: signal.clone(),
        })
    }

    /// Fan the targets out to `workers` scoped threads and wait for all of them.
    fn dispatch(
        &self,
        job: &WriteJob,
        workers: usize,
        aggregator: &ResultsAggregator,
    ) -> Result<(), WriteError> {
        let total = job.targets.len();
        let batched = batch::needs_batching(total);
        let queue_depth = if batched {
            batch::default_batch_size(total)
        } else {
            total
        };
        let (sender, receiver) = bounded::<&Option<Target>>(queue_depth);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let jobs = receiver.clone();
                let spawned = thread::Builder::new()
                    .name(format!("fanwrite-worker-{}", id))
                    .spawn_scoped(scope, move || self.run_worker(job, &jobs, aggregator));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) if handles.is_empty() => return Err(WriteError::Spawn(err)),
                    Err(err) => {
                        log::warn!("Failed to spawn worker {}: {}; continuing with {}", id, err, id);
                        break;
                    }
                }
            }
            drop(receiver);

            if batched {
                let batches = batch::split(&job.targets, 0);
                log::debug!("Enqueueing {} targets in {} batches", total, batches.len());
                'enqueue: for chunk in batches {
                    for slot in chunk {
                        if sender.send(slot).is_err() {
                            break 'enqueue;
                        }
                    }
                }
            } else {
                for slot in &job.targets {
                    if sender.send(slot).is_err() {
                        break;
                    }
                }
            }
            drop(sender);

            let mut panicked = false;
            for handle in handles {
                panicked |= handle.join().is_err();
            }
            if panicked {
                Err(WriteError::ThreadPanicked)
            } else {
                Ok(())
            }
        })
    }

    fn run_worker(
        &self,
        job: &WriteJob,
        jobs: &Receiver<&Option<Target>>,
        results: &ResultsAggregator,
    ) {
        for slot in jobs.iter() {
            let Some(target) = slot else {
                log::debug!("Received null target");
                let err = WriteError::NullTarget;
                results.add_info(NULL_TARGET_KEY, err.to_string());
                results.record_failure(None, err);
                continue;
            };

            let handle = match self.acquire_for_write(target) {
                Ok(handle) => handle,
                Err(err) => {
                    log::debug!("Failed to acquire {}: {}", target.path().display(), err);
                    results.add_info(info_key(target.path()), err.to_string());
                    results.record_failure(Some(target.path()), err);
                    continue;
                }
            };

            match run_with_retry_using(
                || self.write_target(job, target, &handle, results),
                &job.policy,
                |delay| {
                    job.signal.sleep(delay);
                },
            ) {
                Ok(()) => results.record_success(),
                Err(err) => {
                    if !handle.is_open() {
                        // Never opened: drop the placeholder so it does not hold a pool slot
                        self.forget_if_pooled(target.path(), &handle);
                    }
                    results.record_failure(Some(target.path()), err);
                }
            }
        }
    }

    /// One attempt at writing the message to `target`.
    fn write_target(
        &self,
        job: &WriteJob,
        target: &Target,
        handle: &Arc<FileHandle>,
        results: &ResultsAggregator,
    ) -> Result<(), WriteError> {
        job.signal.check().map_err(WriteError::Cancelled)?;

        match handle.write_message(&job.message, job.mode) {
            Ok(WriteOutcome::Reused) => Ok(()),
            Ok(WriteOutcome::Reopened) => {
                // Readmit: the handle was evicted or failed while pooled
                self.pool.replace(target.path(), Arc::clone(handle));
                Ok(())
            }
            Err(err) => {
                results.add_info(info_key(target.path()), err.to_string());
                Err(err.into())
            }
        }
    }

    /// Pooled handle for a write. Path-only targets get a closed handle that
    /// `write_message` opens inside the retry loop.
    fn acquire_for_write(&self, target: &Target) -> Result<Arc<FileHandle>, PoolError> {
        self.pool.acquire_with(target.path(), || {
            Ok(match target.handle() {
                Some(handle) => Arc::clone(handle),
                None => Arc::new(FileHandle::closed(target.path())),
            })
        })
    }

    fn forget_if_pooled(&self, path: &Path, handle: &Arc<FileHandle>) {
        if self
            .pool
            .get(path)
            .is_some_and(|pooled| Arc::ptr_eq(&pooled, handle))
        {
            let _ = self.pool.remove(path);
        }
    }

    fn acquire_with_mode(
        &self,
        target: &Target,
        mode: WriteMode,
    ) -> Result<Arc<FileHandle>, PoolError> {
        self.pool.acquire_with(target.path(), || match target.handle() {
            Some(handle) => Ok(Arc::clone(handle)),
            None => FileHandle::open(target.path(), mode).map(Arc::new),
        })
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Copy of the target set, `None` when unset.
    pub fn targets(&self) -> Option<Vec<Option<Target>>> {
        self.read().targets.clone()
    }

    /// Configured write mode.
    pub fn mode(&self) -> Option<WriteMode> {
        self.read().mode
    }

    /// Configured message.
    pub fn message(&self) -> Option<String> {
        self.read().message.clone()
    }

    /// Configured attempts per target.
    pub fn retries(&self) -> u64 {
        self.read().retries
    }

    /// Configured initial backoff in milliseconds.
    pub fn backoff_ms(&self) -> u64 {
        self.read().backoff_ms
    }

    /// Configured pool capacity.
    pub fn max_pool(&self) -> u64 {
        self.read().max_pool
    }

    /// Replace the target set.
    pub fn set_targets(&self, targets: Vec<Option<Target>>) -> Result<(), WriteError> {
        let mut settings = self.write_settings();
        settings.require_ready()?;
        settings.targets = Some(targets);
        Ok(())
    }

    /// Append to the target set.
    pub fn add_targets<I>(&self, targets: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = Option<Target>>,
    {
        let mut settings = self.write_settings();
        settings.require_ready()?;
        settings.targets.get_or_insert_with(Vec::new).extend(targets);
        Ok(())
    }

    /// Change the write mode.
    pub fn set_mode(&self, mode: WriteMode) -> Result<(), WriteError> {
        let mut settings = self.write_settings();
        settings.require_ready()?;
        settings.mode = Some(mode);
        Ok(())
    }

    /// Change the message.
    pub fn set_message(&self, message: impl Into<String>) -> Result<(), WriteError> {
        let mut settings = self.write_settings();
        settings.require_ready()?;
        settings.message = Some(message.into());
        Ok(())
    }

    /// Change the number of attempts per target.
    pub fn set_retries(&self, retries: u64) -> Result<(), WriteError> {
        let mut settings = self.write_settings();
        settings.require_ready()?;
        settings.retries = retries;
        Ok(())
    }

    /// Change the initial backoff.
    pub fn set_backoff_ms(&self, backoff_ms: u64) -> Result<(), WriteError> {
        let mut settings = self.write_settings();
        settings.require_ready()?;
        settings.backoff_ms = backoff_ms;
        Ok(())
    }

    /// Change the pool capacity, evicting handles if it shrank.
    pub fn set_max_pool(&self, max_pool: u64) -> Result<(), WriteError> {
        {
            let mut settings = self.write_settings();
            settings.require_ready()?;
            settings.max_pool = max_pool;
        }
        self.pool.set_capacity(pool_capacity(max_pool));
        Ok(())
    }

    /// Attach the signal consulted by [`write`](Self::write).
    pub fn set_cancel_signal(&self, signal: CancelSignal) {
        self.write_settings().signal = signal;
    }

    /// Clone of the attached cancellation signal.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.read().signal.clone()
    }

    /// The handle pool.
    pub fn pool(&self) -> &ConnectionPool<FileHandle> {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Pool surface
    // ------------------------------------------------------------------

    /// Pooled handle for `target`, opening (and possibly evicting) as needed.
    pub fn acquire(&self, target: &Target) -> Result<Arc<FileHandle>, WriteError> {
        let mode = self.read().mode.unwrap_or_default();
        Ok(self.acquire_with_mode(target, mode)?)
    }

    /// Whether `path` is pooled with a live handle.
    pub fn check_conn(&self, path: &Path) -> Result<(), PoolError> {
        self.pool.check(path)
    }

    /// Pool the handle of `target` (opening one if it has none) unless the
    /// path is already pooled.
    pub fn add_conn(&self, target: &Target) -> Result<(), WriteError> {
        if self.pool.contains(target.path()) {
            log::debug!("File {} already exists in pool", target.path().display());
            return Ok(());
        }

        let handle = match target.handle() {
            Some(handle) if !handle.is_open() => {
                return Err(WriteError::HandleClosed(target.path().to_path_buf()))
            }
            Some(handle) => Arc::clone(handle),
            None => {
                let mode = self.read().mode.unwrap_or_default();
                let handle =
                    FileHandle::open(target.path(), mode).map_err(|source| WriteError::Io {
                        path: target.path().to_path_buf(),
                        source,
                    })?;
                Arc::new(handle)
            }
        };
        self.pool.insert(target.path(), handle);
        Ok(())
    }

    /// Detach `path` from the pool without closing its handle.
    pub fn remove_conn(&self, path: &Path) -> Result<(), PoolError> {
        self.pool.remove(path).map(drop)
    }

    /// Detach and close the handle pooled under `path`.
    pub fn close_conn(&self, path: &Path) -> Result<(), PoolError> {
        self.pool.close(path)
    }

    /// Close every pooled handle; failures are combined into one error.
    pub fn close_all_conns(&self) -> Result<(), PoolError> {
        self.pool.close_all()
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Forget every pooled handle without closing it.
    pub fn clear_pool(&self) {
        self.pool.clear();
    }

    /// Empty the target set.
    pub fn clear_targets(&self) {
        self.write_settings().targets = Some(Vec::new());
    }

    /// Close every pooled handle, then clear the pool and the target set.
    ///
    /// The target set must be repopulated before the next write.
    pub fn factory_reset(&self) -> Result<(), PoolError> {
        self.close_all_conns()?;
        self.clear_pool();
        self.clear_targets();
        Ok(())
    }
}

/// `0` selects the CPU count; never more workers than targets.
fn worker_count(max_workers: usize, targets: usize) -> usize {
    let requested = if max_workers == 0 {
        available_cpus()
    } else {
        max_workers
    };
    requested.min(targets).max(1)
}

fn pool_capacity(max_pool: u64) -> usize {
    usize::try_from(max_pool).unwrap_or(usize::MAX)
}

fn info_key(path: &Path) -> String {
    path.display().to_string()
}
