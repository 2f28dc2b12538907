//! Cooperative cancellation shared between a caller and a running write.
//!
//! A [`CancelSignal`] is a cheaply clonable flag with an optional deadline.
//! The engine polls it at the start of a write, before every per-target
//! attempt and during retry backoff; an OS write already in flight is never
//! interrupted.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest stretch [`CancelSignal::sleep`] sleeps without polling the signal.
const SLEEP_POLL: Duration = Duration::from_millis(5);

/// Why a signal reports itself as done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancelSignal::cancel`] was called
    Cancelled,
    /// The attached deadline has passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("context canceled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag. A signal derived with
/// [`CancelSignal::with_deadline`] also observes its parent.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
    parent: Option<Arc<CancelSignal>>,
}

impl CancelSignal {
    /// A signal that is never done until [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        }
    }

    /// Derive a child that is done whenever `self` is, and can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Derive a child that expires at `deadline` and is also done whenever
    /// `self` is.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.child()
        }
    }

    /// Derive a child expiring `timeout` from now. A timeout too large to
    /// represent never expires.
    pub fn with_child_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Sleep for `duration`, waking early once the signal is done.
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_cancelled() {
                return false;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return true;
            }
            thread::sleep((duration - elapsed).min(SLEEP_POLL));
        }
    }

    /// Trigger the signal. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Deadline attached to this signal, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this signal is done, or `None` while it is live.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.flag.load(Ordering::SeqCst) {
            return Some(CancelReason::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(CancelReason::DeadlineExceeded);
            }
        }
        self.parent.as_ref().and_then(|parent| parent.reason())
    }

    /// Whether the signal has been triggered or has expired.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// `Err` with the reason once the signal is done.
    pub fn check(&self) -> Result<(), CancelReason> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}
