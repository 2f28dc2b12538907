use std::ops::Deref;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};

use crate::cancel::CancelSignal;
use crate::results::Results;

use super::engine_impl::WriteEngine;
use super::error::WriteError;

/// A write running on a background thread.
///
/// Exactly one of [`results`](Self::results) and [`errors`](Self::errors)
/// receives a value once the write ends. [`cancel`](Self::cancel) stops
/// workers from starting further attempts; an OS write already in flight
/// completes.
#[derive(Debug)]
pub struct PendingWrite {
    signal: CancelSignal,
    results: Receiver<Results>,
    errors: Receiver<WriteError>,
    dispatcher: Option<JoinHandle<()>>,
}

impl PendingWrite {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Receives the results of a write that ran to completion.
    pub fn results(&self) -> &Receiver<Results> {
        &self.results
    }

    /// Receives the error of a write that failed a precondition.
    pub fn errors(&self) -> &Receiver<WriteError> {
        &self.errors
    }

    /// Block until the write ends and return its outcome.
    pub fn wait(mut self) -> Result<Results, WriteError> {
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                return Err(WriteError::ThreadPanicked);
            }
        }
        if let Ok(results) = self.results.try_recv() {
            return Ok(results);
        }
        match self.errors.try_recv() {
            Ok(err) => Err(err),
            Err(_) => Err(WriteError::ThreadPanicked),
        }
    }
}

/// Start a write on `engine` from a background thread.
///
/// The write observes a fresh child of the engine's attached signal, so the
/// returned handle can cancel this write alone while a cancellation of the
/// attached signal still applies. Works with any owner of the engine that can
/// move to another thread, such as an `Arc<WriteEngine>` or the `&'static`
/// [`default_engine`](super::default_engine).
pub fn start_with_cancel<E>(engine: E, max_workers: usize) -> PendingWrite
where
    E: Deref<Target = WriteEngine> + Send + 'static,
{
    let signal = engine.cancel_signal().child();
    let (result_tx, results) = bounded(1);
    let (error_tx, errors) = bounded(1);

    let write_signal = signal.clone();
    let spawned = thread::Builder::new()
        .name("fanwrite-dispatcher".to_string())
        .spawn({
            let error_tx = error_tx.clone();
            move || match engine.write_with_signal(max_workers, &write_signal) {
                Ok(outcome) => {
                    let _ = result_tx.send(outcome);
                }
                Err(err) => {
                    let _ = error_tx.send(err);
                }
            }
        });

    let dispatcher = match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::warn!("Failed to spawn write dispatcher: {}", err);
            let _ = error_tx.send(WriteError::Spawn(err));
            None
        }
    };

    PendingWrite {
        signal,
        results,
        errors,
        dispatcher,
    }
}
