//! Worker threads
//!
//! Each [`ThreadWorker`] owns an OS thread and a private task list. The thread advances every
//! task it owns one step per pass, sleeps on a condition variable while it has nothing to do,
//! and retires itself once it has been idle for longer than its time-to-live.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::task::TaskHandle;

#[derive(Debug, Default)]
struct WorkerState {
    tasks: VecDeque<TaskHandle>,
    /// Cleared (under this lock) when the worker retires; no task is accepted afterwards
    active: bool,
}

pub struct ThreadWorker {
    id: usize,
    state: Mutex<WorkerState>,
    task_added: Condvar,
    stop: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    idle_ttl: Duration,
    poll_timeout: Duration,
}

impl ThreadWorker {
    /// Start a worker thread
    pub fn spawn(id: usize, idle_ttl: Duration, poll_timeout: Duration) -> io::Result<Arc<Self>> {
        let worker = Arc::new(ThreadWorker {
            id,
            state: Mutex::new(WorkerState {
                tasks: VecDeque::new(),
                active: true,
            }),
            task_added: Condvar::new(),
            stop: AtomicBool::new(false),
            handle: Mutex::new(None),
            idle_ttl,
            poll_timeout,
        });

        let runner = Arc::clone(&worker);
        let handle = thread::Builder::new()
            .name(format!("jurist-worker-{}", id))
            .spawn(move || runner.run())?;
        *worker.handle.lock() = Some(handle);

        debug!(worker = id, "worker started");
        Ok(worker)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Hand a task to this worker; false if the worker has already retired
    pub fn submit(&self, task: TaskHandle) -> bool {
        let mut state = self.state.lock();
        if !state.active {
            return false;
        }
        state.tasks.push_back(task);
        self.task_added.notify_one();
        true
    }

    /// Tasks still owned by this worker
    pub fn pending(&self) -> Vec<TaskHandle> {
        self.state.lock().tasks.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.state.lock().tasks.clear();
    }

    /// Ask the thread to exit after its current step
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _state = self.state.lock();
        self.task_added.notify_all();
    }

    pub fn join(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!(worker = self.id, "worker thread panicked");
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(self: Arc<Self>) {
        let mut idle_since = Instant::now();

        loop {
            if self.stopped() {
                break;
            }

            let batch: Vec<TaskHandle> = {
                let mut state = self.state.lock();
                if state.tasks.is_empty() {
                    if idle_since.elapsed() >= self.idle_ttl {
                        state.active = false;
                        debug!(worker = self.id, "worker idle, retiring");
                        break;
                    }
                    self.task_added.wait_for(&mut state, self.poll_timeout);
                    if state.tasks.is_empty() {
                        continue;
                    }
                }
                state.tasks.iter().cloned().collect()
            };

            let mut finished = false;
            for task in &batch {
                if self.stopped() {
                    break;
                }
                finished |= task.advance();
            }
            if finished {
                self.state.lock().tasks.retain(|task| !task.is_done());
            }
            idle_since = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::Val;
    use crate::scheduler::task::{BackgroundTask, Poll, Resumable};

    struct Immediate(i64);

    impl Resumable for Immediate {
        fn resume(&mut self) -> Poll {
            Poll::Done(Ok(Val::Int(self.0)))
        }
    }

    fn wait_done(task: &TaskHandle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !task.is_done() {
            assert!(Instant::now() < deadline, "task did not finish");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_worker_runs_submitted_tasks() {
        let worker =
            ThreadWorker::spawn(0, Duration::from_secs(5), Duration::from_millis(10)).unwrap();
        let task = BackgroundTask::new("seven", Box::new(Immediate(7)), false);
        assert!(worker.submit(Arc::clone(&task)));
        wait_done(&task);
        assert_eq!(task.claim().unwrap().unwrap(), Val::Int(7));
        worker.stop();
        worker.join();
    }

    #[test]
    fn test_idle_worker_retires_and_rejects_tasks() {
        let worker =
            ThreadWorker::spawn(1, Duration::from_millis(20), Duration::from_millis(5)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.is_active() {
            assert!(Instant::now() < deadline, "worker never retired");
            thread::sleep(Duration::from_millis(5));
        }
        let task = BackgroundTask::new("late", Box::new(Immediate(1)), false);
        assert!(!worker.submit(task));
        worker.join();
    }
}
