//! Ordered, bounded-time teardown of the span pipeline.
//!
//! Teardown is two-phase: flush buffered spans to the transport with a
//! bounded wait, then close the transport. The close runs even when the flush
//! times out or fails (a stalled backend must not leave sockets and worker
//! threads behind), and the whole sequence executes at most once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ExportError;

/// Teardown capability of the span pipeline.
///
/// Both operations may block: the coordinator bounds the `flush` wait itself
/// and awaits `close` unbounded (the transport must be released before the
/// process exits).
pub trait ShutdownableExporter: Send + Sync {
    /// Hand spans buffered in the pipeline to the transport.
    fn flush(&self) -> Result<(), ExportError>;

    /// Tear down the transport: sockets, worker threads, buffers.
    fn close(&self) -> Result<(), ExportError>;
}

/// What a `shutdown` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Flush completed and the transport was closed.
    Completed,
    /// Flush reported a backend error; the transport was closed anyway.
    FlushFailed,
    /// Flush was still pending when the bound elapsed; the transport was
    /// closed anyway.
    FlushTimedOut,
    /// A previous call already tore the pipeline down; nothing was done.
    AlreadyShutDown,
}

const STATE_OPEN: u8 = 0;
const STATE_FLUSHING: u8 = 1;
const STATE_CLOSED: u8 = 2;

enum FlushWait {
    Done(Result<(), ExportError>),
    TimedOut,
}

/// Runs the two-phase pipeline teardown exactly once.
///
/// State machine `OPEN -> FLUSHING -> CLOSED`, entered by the single caller
/// that wins the `compare_exchange`; every later call returns immediately.
pub struct ShutdownCoordinator {
    exporter: Arc<dyn ShutdownableExporter>,
    state: AtomicU8,
    flush_timeout: Duration,
}

impl ShutdownCoordinator {
    pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(exporter: Arc<dyn ShutdownableExporter>) -> Self {
        Self {
            exporter,
            state: AtomicU8::new(STATE_OPEN),
            flush_timeout: Self::DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Bound on the flush wait; the close that follows is not bounded.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Flush and close the pipeline. Idempotent; telemetry-backend failures
    /// are logged and absorbed, never returned to the host.
    pub fn shutdown(&self) -> ShutdownOutcome {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_FLUSHING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("trace pipeline already shut down");
            return ShutdownOutcome::AlreadyShutDown;
        }

        let flush_started = Instant::now();
        let outcome = match self.flush_bounded() {
            FlushWait::Done(Ok(())) => {
                debug!(
                    elapsed_ms = flush_started.elapsed().as_millis() as u64,
                    "trace flush complete"
                );
                ShutdownOutcome::Completed
            }
            FlushWait::Done(Err(err)) => {
                warn!(
                    elapsed_ms = flush_started.elapsed().as_millis() as u64,
                    "trace flush failed ({err}), closing transport anyway"
                );
                ShutdownOutcome::FlushFailed
            }
            FlushWait::TimedOut => {
                let err = ExportError::FlushTimeout {
                    timeout: self.flush_timeout,
                };
                warn!("{err}, closing transport anyway");
                ShutdownOutcome::FlushTimedOut
            }
        };

        let close_started = Instant::now();
        match self.exporter.close() {
            Ok(()) => debug!(
                elapsed_ms = close_started.elapsed().as_millis() as u64,
                "trace transport closed"
            ),
            Err(err) => warn!("failed to close trace transport: {err}"),
        }
        self.state.store(STATE_CLOSED, Ordering::Release);
        outcome
    }

    /// Run `flush` on a helper thread and wait at most `flush_timeout`. On
    /// timeout the helper is left detached, still holding its handle on the
    /// exporter; the close that follows must tolerate a concurrent flush.
    fn flush_bounded(&self) -> FlushWait {
        let (tx, rx) = mpsc::channel();
        let exporter = Arc::clone(&self.exporter);
        let spawned = thread::Builder::new()
            .name("buildtrace-flush".into())
            .spawn(move || {
                let _ = tx.send(exporter.flush());
            });
        if let Err(err) = spawned {
            return FlushWait::Done(Err(ExportError::Backend(format!(
                "failed to spawn flush thread: {err}"
            ))));
        }
        match rx.recv_timeout(self.flush_timeout) {
            Ok(result) => FlushWait::Done(result),
            Err(_) => FlushWait::TimedOut,
        }
    }
}
