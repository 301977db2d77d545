//! Worker lifecycle glue
//!
//! Every long-running stage owns one named OS thread that drives a
//! single-threaded tokio runtime. The owner keeps a [`WorkerThread`] for
//! `join()` and a [`StopSignal`] for `stop()`; the loop holds the matching
//! [`StopListener`].

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::thread;

use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::{debug, error};

/// Stop request sender, safe to trigger from any thread
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

/// Receiving side of a [`StopSignal`], observed by the worker loop
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Create a signal and its listener
    pub fn new() -> (Self, StopListener) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, StopListener { rx })
    }

    /// Request the loop to stop
    ///
    /// Returns `true` for the first request, `false` if already stopped.
    pub fn stop(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl StopListener {
    /// Resolve once a stop was requested (or the signal was dropped)
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Spawn a named thread running `run` to completion on a current-thread runtime
///
/// The runtime is built before the thread starts so that build failures are
/// reported to the caller.
pub fn spawn_runtime_thread<F, Fut>(
    name: impl Into<String>,
    run: F,
) -> std::io::Result<thread::JoinHandle<Fut::Output>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future + 'static,
    Fut::Output: Send + 'static,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new()
        .name(name.into())
        .spawn(move || runtime.block_on(run()))
}

/// Joinable handle to a worker thread
///
/// `join` may be called from any thread through a shared reference; only the
/// first call observes the thread's output.
#[derive(Debug)]
pub struct WorkerThread<T> {
    name: String,
    handle: Mutex<Option<thread::JoinHandle<T>>>,
}

impl<T> WorkerThread<T> {
    pub fn new(name: impl Into<String>, handle: thread::JoinHandle<T>) -> Self {
        Self {
            name: name.into(),
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has exited (or was already joined)
    pub fn is_finished(&self) -> bool {
        self.lock()
            .as_ref()
            .map(thread::JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Wait for the thread to exit
    ///
    /// Returns `None` if already joined or if the thread panicked.
    pub fn join(&self) -> Option<T> {
        let handle = self.lock().take()?;
        match handle.join() {
            Ok(output) => {
                debug!(worker = %self.name, "Worker thread joined");
                Some(output)
            }
            Err(_) => {
                error!(worker = %self.name, "Worker thread panicked");
                None
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<thread::JoinHandle<T>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
