//! Background task scheduler
//!
//! A bounded pool of [`ThreadWorker`]s owned by the runtime. Workers are spawned lazily: a new
//! one is started for each submission until `max_workers` exist, after which tasks are handed
//! out round-robin. Workers that retired after idling are purged before every assignment.

pub mod task;
pub mod worker;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::executor::errors::{ErrorKind, LangError, LangResult};

pub use task::{BackgroundTask, Poll, Resumable, TaskHandle};
pub use worker::ThreadWorker;

pub struct TaskScheduler {
    max_workers: usize,
    idle_ttl: Duration,
    poll_timeout: Duration,
    debug: bool,
    workers: Mutex<Vec<Arc<ThreadWorker>>>,
    next_worker: AtomicUsize,
    next_id: AtomicUsize,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("max_workers", &self.max_workers)
            .field("workers", &self.workers.lock().len())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            idle_ttl: Duration::from_millis(config.worker_idle_ttl_ms),
            poll_timeout: Duration::from_millis(config.worker_poll_timeout_ms.max(1)),
            debug: config.debug,
            workers: Mutex::new(Vec::new()),
            next_worker: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Submit a machine for background execution
    pub fn schedule(&self, label: &str, machine: Box<dyn Resumable>) -> LangResult<TaskHandle> {
        if self.is_shut_down() {
            return Err(LangError::new(
                ErrorKind::Scheduler,
                "cannot schedule a background task after shutdown",
            ));
        }

        let task = BackgroundTask::new(label, machine, self.debug);
        loop {
            let worker = self.pick_worker()?;
            if worker.submit(Arc::clone(&task)) {
                debug!(task_id = %task.id(), task = label, worker = worker.id(), "task scheduled");
                return Ok(task);
            }
            // The worker retired between the purge and the submission; pick again
        }
    }

    fn pick_worker(&self) -> LangResult<Arc<ThreadWorker>> {
        let mut workers = self.workers.lock();

        let (active, retired): (Vec<_>, Vec<_>) =
            workers.drain(..).partition(|worker| worker.is_active());
        *workers = active;
        for worker in retired {
            worker.join();
        }

        if workers.len() < self.max_workers {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let worker = ThreadWorker::spawn(id, self.idle_ttl, self.poll_timeout).map_err(|e| {
                LangError::new(
                    ErrorKind::Scheduler,
                    format!("failed to start worker thread: {}", e),
                )
            })?;
            workers.push(Arc::clone(&worker));
            return Ok(worker);
        }

        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % workers.len();
        Ok(Arc::clone(&workers[index]))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop and join every worker; unfinished tasks are reported and dropped
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.stop();
        }
        for worker in &workers {
            worker.join();
        }
        for worker in &workers {
            for task in worker.pending() {
                if !task.is_done() {
                    warn!(
                        task_id = %task.id(),
                        task = task.label(),
                        age_ms = task.age().num_milliseconds(),
                        "background task unfinished at shutdown"
                    );
                    task.abandon();
                }
            }
            worker.clear();
        }
        debug!(workers = workers.len(), "scheduler shut down");
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
