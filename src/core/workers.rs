//! Background thread pool for blocking fetch jobs.
//!
//! Uses work-stealing deques:
//! - Jobs from outside the pool land in a shared injector
//! - Idle workers steal from each other before sleeping
//!
//! Per-job `CancelToken`s let a hidden row's fetch be skipped if no worker
//! has picked it up yet.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared cancellation flag for one fetch attempt.
///
/// Cloning shares the flag. Cancelling is sticky.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Work-stealing worker pool.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4)?;
/// let token = CancelToken::new();
/// workers.execute_cancellable(token.clone(), move |cancelled| {
///     if !cancelled {
///         // fetch
///     }
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,          // Global queue for external jobs
    handles: Vec<thread::JoinHandle<()>>,  // Thread handles for shutdown
    shutdown: Arc<AtomicBool>,
}

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

fn spawn_named(worker_id: usize, body: WorkerBody) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("thumb-fetch-{}", worker_id))
        .spawn(body)
}

impl Workers {
    /// Create pool with `num_threads` workers (clamped to at least 1).
    ///
    /// Fetch jobs mostly wait on the network, so the default from
    /// `LoaderSettings` is a few threads per core rather than one.
    /// Fails only if not a single thread could be started; a pool with no
    /// threads would accept jobs and never run them.
    pub fn new(num_threads: usize) -> io::Result<Self> {
        Self::start(num_threads, spawn_named)
    }

    fn start<S>(num_threads: usize, mut spawn: S) -> io::Result<Self>
    where
        S: FnMut(usize, WorkerBody) -> io::Result<thread::JoinHandle<()>>,
    {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(|w| w.stealer()).collect();

        let mut handles = Vec::with_capacity(num_threads);
        let mut last_error = None;
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let body: WorkerBody =
                Box::new(move || worker_loop(worker_id, local, injector, stealers, shutdown));
            match spawn(worker_id, body) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn fetch worker {}: {}", worker_id, e);
                    last_error = Some(e);
                }
            }
        }

        if handles.is_empty() {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(io::Error::other(format!("no fetch worker could be started: {}", reason)));
        }

        trace!("Workers initialized: {} threads (work-stealing)", handles.len());

        Ok(Self {
            injector,
            handles,
            shutdown,
        })
    }

    /// Number of live worker threads
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run closure on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    /// Run closure on a worker thread, passing whether `token` was cancelled.
    ///
    /// The check happens when a worker picks the job up, not at enqueue time,
    /// so a job queued for a row that scrolled away sees `cancelled == true`
    /// and can report back without doing the work.
    pub fn execute_cancellable<F>(&self, token: CancelToken, f: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.injector.push(Box::new(move || f(token.is_cancelled())));
    }
}

fn worker_loop(
    worker_id: usize,
    local: Worker<Job>,
    injector: Arc<Injector<Job>>,
    stealers: Vec<Stealer<Job>>,
    shutdown: Arc<AtomicBool>,
) {
    trace!("Worker {} started", worker_id);

    loop {
        // Own queue, then injector (batch into own queue), then siblings
        let job = local.pop().or_else(|| {
            std::iter::repeat_with(|| {
                injector
                    .steal_batch_and_pop(&local)
                    .or_else(|| stealers.iter().map(|s| s.steal()).collect())
            })
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        });

        if let Some(job) = job {
            job();
            continue;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // No work: short sleep instead of pure spin
        thread::sleep(Duration::from_millis(1));
    }

    trace!("Worker {} stopped", worker_id);
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // In-flight GETs are bounded by the request timeout; don't wait past this
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}
