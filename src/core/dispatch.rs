//! Delivery context for fetch completions.
//!
//! `ImageFetchCache` never assumes which thread finishes a fetch. The
//! completion step (map update + listener calls) is handed to a `Dispatcher`:
//! - `ImmediateDispatcher` runs it inline on the transport thread
//! - `MainQueue` queues it for the owning thread to drain with `poll()`
//!
//! With `MainQueue`, `cancel()` issued from the draining thread is always
//! ordered against completions, so a cancelled row never sees a late image.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::trace;
use std::time::{Duration, Instant};

/// Type-erased unit of delivery work
pub type DispatchJob = Box<dyn FnOnce() + Send + 'static>;

/// Execution context completions are delivered on.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: DispatchJob);
}

/// Runs jobs inline on whichever thread completed the fetch.
///
/// Callbacks must then be thread-safe themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateDispatcher;

impl Dispatcher for ImmediateDispatcher {
    fn dispatch(&self, job: DispatchJob) {
        job();
    }
}

/// Channel-backed queue drained by one owner thread (the UI/main loop).
///
/// # Example
/// ```ignore
/// let queue = Arc::new(MainQueue::new());
/// let cache = ImageFetchCache::new(transport, decoder, queue.clone(), manager);
///
/// // In the main loop:
/// queue.poll();
/// ```
#[derive(Debug, Clone)]
pub struct MainQueue {
    tx: Sender<DispatchJob>,
    rx: Receiver<DispatchJob>,
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Run every queued job on the calling thread. Returns how many ran.
    pub fn poll(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if ran > 0 {
            trace!("MainQueue: delivered {} completions", ran);
        }
        ran
    }

    /// Block up to `timeout` for the first job, then drain the rest.
    /// Returns how many ran (0 on timeout).
    pub fn wait(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        match self.rx.recv_deadline(deadline) {
            Ok(job) => {
                job();
                1 + self.poll()
            }
            Err(_) => 0,
        }
    }

    /// Jobs waiting to be delivered
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Dispatcher for MainQueue {
    fn dispatch(&self, job: DispatchJob) {
        // Receiver lives in self, so send can't fail while self is alive
        if self.tx.send(job).is_err() {
            log::warn!("MainQueue: receiver gone, completion dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_immediate_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        ImmediateDispatcher.dispatch(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_main_queue_defers_until_poll() {
        let queue = MainQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = Arc::clone(&hits);
            queue.dispatch(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 3);

        assert_eq!(queue.poll(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(queue.poll(), 0);
    }

    #[test]
    fn test_main_queue_runs_on_polling_thread() {
        let queue = Arc::new(MainQueue::new());
        let main_id = thread::current().id();
        let seen = Arc::new(std::sync::Mutex::new(None));

        let q = Arc::clone(&queue);
        let s = Arc::clone(&seen);
        thread::spawn(move || {
            q.dispatch(Box::new(move || {
                *s.lock().unwrap() = Some(thread::current().id());
            }));
        })
        .join()
        .unwrap();

        assert_eq!(queue.wait(Duration::from_secs(5)), 1);
        assert_eq!(*seen.lock().unwrap(), Some(main_id));
    }

    #[test]
    fn test_wait_times_out() {
        let queue = MainQueue::new();
        assert_eq!(queue.wait(Duration::from_millis(10)), 0);
    }
}
