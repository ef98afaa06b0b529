//! Fixed-size worker pool with a completion barrier and cancellation.
//!
//! Jobs travel to the workers over a [`flume`] channel. The pool tracks an
//! active count covering both queued and running jobs; [`ThreadPool::wait`]
//! blocks until it drops to zero and [`ThreadPool::clear_tasks`] discards
//! everything that has not started yet.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::{RenderError, RenderResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queued plus running jobs, and the barrier that waits on them.
struct Counter {
    active: Mutex<usize>,
    /// Signalled when the active count reaches zero
    finished: Condvar,
}

impl Counter {
    fn lock(&self) -> MutexGuard<'_, usize> {
        // Jobs never run under the lock, so a poisoned lock still holds
        // a consistent count.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, count: usize) {
        *self.lock() += count;
    }

    fn finish(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut active = self.lock();
        *active -= count;
        if *active == 0 {
            self.finished.notify_all();
        }
    }
}

/// A pool of named worker threads.
pub struct ThreadPool {
    /// `None` only while dropping, to disconnect the workers
    sender: Option<flume::Sender<Job>>,
    receiver: flume::Receiver<Job>,
    counter: Arc<Counter>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> RenderResult<Self> {
        let size = size.max(1);
        let (sender, receiver) = flume::unbounded();
        let mut pool = Self {
            sender: Some(sender),
            receiver,
            counter: Arc::new(Counter {
                active: Mutex::new(0),
                finished: Condvar::new(),
            }),
            workers: Vec::with_capacity(size),
        };

        for index in 0..size {
            let receiver = pool.receiver.clone();
            let counter = Arc::clone(&pool.counter);
            // On error the partially built pool is dropped, which disconnects
            // and joins the workers spawned so far.
            let handle = thread::Builder::new()
                .name(format!("lumen-worker-{index}"))
                .spawn(move || worker_loop(&receiver, &counter))
                .map_err(RenderError::Spawn)?;
            pool.workers.push(handle);
        }

        log::info!("Started thread pool with {} workers", size);
        Ok(pool)
    }

    /// Queue a job for execution.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return;
        };
        // Counted before sending so a fast worker can never finish it first
        self.counter.add(1);
        if sender.send(Box::new(job)).is_err() {
            self.counter.finish(1);
        }
    }

    /// Block until every queued and running job has finished.
    ///
    /// Jobs enqueued from another thread while waiting extend the wait.
    pub fn wait(&self) {
        let mut active = self.counter.lock();
        while *active > 0 {
            active = self
                .counter
                .finished
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Discard all jobs that have not started. Running jobs are unaffected.
    ///
    /// Returns the number of jobs dropped.
    pub fn clear_tasks(&self) -> usize {
        let count = self.receiver.drain().count();
        self.counter.finish(count);
        if count > 0 {
            log::debug!("Cleared {} queued jobs", count);
        }
        count
    }

    /// Jobs waiting to start.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Jobs queued or running.
    pub fn active(&self) -> usize {
        *self.counter.lock()
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let dropped = self.receiver.drain().count();
        self.counter.finish(dropped);
        self.sender = None;

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Worker thread exited abnormally");
            }
        }
    }
}

fn worker_loop(receiver: &flume::Receiver<Job>, counter: &Counter) {
    // Ends with `RecvError::Disconnected` once the pool drops its sender
    while let Ok(job) = receiver.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown panic");
            log::error!(
                "Job panicked on {}: {}",
                thread::current().name().unwrap_or("worker"),
                message
            );
        }

        counter.finish(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_runs_all_jobs() {
        let pool = ThreadPool::new(4).unwrap();
        assert_eq!(pool.size(), 4);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait();

        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_wait_on_idle_pool_returns() {
        let pool = ThreadPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
        pool.wait();
    }

    #[test]
    fn test_clear_tasks_drops_queued_jobs() {
        let pool = ThreadPool::new(1).unwrap();
        let (started_tx, started_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded::<()>();

        // Occupy the only worker
        pool.enqueue(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        started_rx.recv().unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.queued(), 10);
        assert_eq!(pool.active(), 11);

        assert_eq!(pool.clear_tasks(), 10);
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.active(), 1);

        release_tx.send(()).unwrap();
        pool.wait();
        assert_eq!(pool.active(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_jobs_after_clear_still_run() {
        let pool = ThreadPool::new(2).unwrap();
        let (release_tx, release_rx) = flume::unbounded::<()>();

        for _ in 0..2 {
            let release_rx = release_rx.clone();
            pool.enqueue(move || {
                let _ = release_rx.recv();
            });
        }
        for _ in 0..8 {
            pool.enqueue(|| {});
        }
        let dropped = pool.clear_tasks();
        assert!(dropped >= 8);
        assert_eq!(pool.queued(), 0);
        drop(release_tx);
        pool.wait();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn test_panicking_job_keeps_pool_usable() {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = ThreadPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.enqueue(|| panic!("job failure"));
        let c = Arc::clone(&counter);
        pool.enqueue(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        pool.wait();

        assert_eq!(pool.active(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded::<()>();
        {
            let pool = ThreadPool::new(1).unwrap();
            pool.enqueue(move || {
                started_tx.send(()).unwrap();
                // Returns once the sender is dropped along with the queue
                let _ = release_rx.recv();
            });
            started_rx.recv().unwrap();
            for _ in 0..5 {
                let counter = Arc::clone(&counter);
                let release_tx = release_tx.clone();
                pool.enqueue(move || {
                    drop(release_tx);
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            drop(release_tx);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
