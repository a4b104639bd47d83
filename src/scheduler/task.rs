//! Background tasks
//!
//! A [`BackgroundTask`] wraps a resumable machine. Workers advance it one step at a time until
//! it reports [`Poll::Done`]; the outcome is then parked until exactly one `wait` claims it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::executor::errors::{ErrorKind, LangError, LangResult};
use crate::executor::types::Val;

/// Result of resuming a machine
#[derive(Debug)]
pub enum Poll {
    /// Reached a checkpoint; resume again later
    Suspended,
    Done(LangResult<Val>),
}

/// A computation that runs in steps
pub trait Resumable: Send {
    fn resume(&mut self) -> Poll;
}

pub type TaskHandle = Arc<BackgroundTask>;

pub struct BackgroundTask {
    id: Uuid,
    label: String,
    created_at: DateTime<Utc>,
    done: AtomicBool,
    waited: AtomicBool,
    outcome: Mutex<Option<LangResult<Val>>>,
    machine: Mutex<Option<Box<dyn Resumable>>>,
    /// Keep panic payloads in the task's error instead of yielding `empty`
    debug: bool,
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("done", &self.is_done())
            .field("waited", &self.is_waited())
            .finish()
    }
}

impl BackgroundTask {
    pub fn new(label: impl Into<String>, machine: Box<dyn Resumable>, debug: bool) -> TaskHandle {
        Arc::new(BackgroundTask {
            id: Uuid::new_v4(),
            label: label.into(),
            created_at: Utc::now(),
            done: AtomicBool::new(false),
            waited: AtomicBool::new(false),
            outcome: Mutex::new(None),
            machine: Mutex::new(Some(machine)),
            debug,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time since the task was created
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn is_waited(&self) -> bool {
        self.waited.load(Ordering::Acquire)
    }

    /// Run the machine to its next checkpoint; true once the task is finished
    pub fn advance(&self) -> bool {
        let mut slot = self.machine.lock();
        let Some(machine) = slot.as_mut() else {
            return true;
        };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| machine.resume())) {
            Ok(Poll::Suspended) => return false,
            Ok(Poll::Done(outcome)) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task_id = %self.id, task = %self.label, panic = %message, "background task panicked");
                if self.debug {
                    Err(LangError::internal(format!(
                        "background task '{}' panicked: {}",
                        self.label, message
                    )))
                } else {
                    Ok(Val::Null)
                }
            }
        };

        *slot = None;
        self.finish(outcome);
        true
    }

    /// Drop the machine of a task that will never run again
    ///
    /// Waiters get a scheduler error instead of polling forever.
    pub fn abandon(&self) {
        self.machine.lock().take();
        if !self.is_done() {
            self.finish(Err(LangError::new(
                ErrorKind::Scheduler,
                format!("task '{}' ({}) was abandoned at shutdown", self.label, self.id),
            )));
        }
    }

    fn finish(&self, outcome: LangResult<Val>) {
        *self.outcome.lock() = Some(outcome);
        self.done.store(true, Ordering::Release);
    }

    /// Take the outcome of a finished task; only the first caller gets it
    pub fn claim(&self) -> LangResult<LangResult<Val>> {
        if self
            .waited
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(double_wait(self));
        }
        Ok(self.outcome.lock().take().unwrap_or(Ok(Val::Null)))
    }
}

pub fn double_wait(task: &BackgroundTask) -> LangError {
    LangError::new(
        ErrorKind::DoubleWait,
        format!("task '{}' ({}) was already waited for", task.label, task.id),
    )
}

/// Text of a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down, then finishes with the number of steps taken
    struct Countdown {
        left: u32,
        steps: i64,
    }

    impl Resumable for Countdown {
        fn resume(&mut self) -> Poll {
            self.steps += 1;
            if self.left == 0 {
                Poll::Done(Ok(Val::Int(self.steps)))
            } else {
                self.left -= 1;
                Poll::Suspended
            }
        }
    }

    struct Panics;

    impl Resumable for Panics {
        fn resume(&mut self) -> Poll {
            panic!("boom");
        }
    }

    #[test]
    fn test_advance_until_done() {
        let task = BackgroundTask::new("countdown", Box::new(Countdown { left: 2, steps: 0 }), false);
        assert!(!task.advance());
        assert!(!task.advance());
        assert!(!task.is_done());
        assert!(task.advance());
        assert!(task.is_done());
        assert_eq!(task.claim().unwrap().unwrap(), Val::Int(3));
    }

    #[test]
    fn test_second_claim_fails() {
        let task = BackgroundTask::new("once", Box::new(Countdown { left: 0, steps: 0 }), false);
        task.advance();
        assert!(task.claim().is_ok());
        let err = task.claim().unwrap_err();
        assert_eq!(err.kind, ErrorKind::DoubleWait);
    }

    #[test]
    fn test_abandoned_task_fails_its_waiter() {
        let task = BackgroundTask::new("stuck", Box::new(Countdown { left: 5, steps: 0 }), false);
        assert!(!task.advance());
        task.abandon();
        assert!(task.is_done());
        assert!(task.advance());
        let err = task.claim().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Scheduler);
        assert!(err.message.contains("stuck"));
    }

    #[test]
    fn test_panic_becomes_empty_result() {
        let task = BackgroundTask::new("panics", Box::new(Panics), false);
        assert!(task.advance());
        assert_eq!(task.claim().unwrap().unwrap(), Val::Null);
    }

    #[test]
    fn test_panic_is_kept_in_debug_mode() {
        let task = BackgroundTask::new("panics", Box::new(Panics), true);
        assert!(task.advance());
        let err = task.claim().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("boom"));
    }
}
