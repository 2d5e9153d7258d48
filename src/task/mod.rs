//! Declared tasks and the scheduler they are handed to.
//!
//! Units declare [`Task`]s; once a unit has been finalized the orchestrator
//! submits them to a [`TaskScheduler`]. [`CronScheduler`] is the bundled
//! implementation.

mod scheduler;

pub use scheduler::CronScheduler;

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

pub type TaskFn = Arc<dyn Fn() + Send + Sync>;

/// Scheduled work declared by a unit.
///
/// A task without a schedule expression or without an action is skipped by
/// the scheduler.
#[derive(Clone, Default)]
pub struct Task {
    pub name: String,
    /// Cron expression, seconds first: `"0 */5 * * * *"`.
    pub cron: String,
    pub run: Option<TaskFn>,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, cron: impl Into<String>, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            cron: cron.into(),
            run: Some(Arc::new(run)),
        }
    }

    /// Whether the task carries both a schedule and an action.
    pub fn is_runnable(&self) -> bool {
        !self.cron.trim().is_empty() && self.run.is_some()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("cron", &self.cron)
            .field("run", &self.run.is_some())
            .finish()
    }
}

/// Accepts task registrations and runs them on its own execution context.
///
/// Failures inside a running task are logged by the scheduler and never
/// reach the orchestrator.
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, task: &Task) -> Result<()>;

    /// Stop every scheduled task.
    fn shutdown(&self) {}
}
