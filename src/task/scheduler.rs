use super::{Task, TaskFn, TaskScheduler};
use crate::error::{EnsembleError, Result};
use crate::lifecycle::panic_message;
use chrono::Utc;
use cron::Schedule;
use parking_lot::Mutex;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;

struct ScheduledJob {
    name: String,
    handle: JoinHandle<()>,
}

/// Cron-driven scheduler running one tokio task per registration.
///
/// Each firing runs on the blocking pool; a panicking action is logged and
/// the schedule keeps going. Registration must happen inside a tokio runtime.
#[derive(Default)]
pub struct CronScheduler {
    jobs: Mutex<Vec<ScheduledJob>>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tasks currently scheduled, in registration order.
    pub fn scheduled(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|job| job.name.clone()).collect()
    }
}

impl TaskScheduler for CronScheduler {
    fn schedule(&self, task: &Task) -> Result<()> {
        let Some(run) = task.run.clone().filter(|_| task.is_runnable()) else {
            tracing::debug!("skipping task {} without schedule or action", task.name);
            return Ok(());
        };

        let schedule = Schedule::from_str(task.cron.trim()).map_err(|e| EnsembleError::Task {
            name: task.name.clone(),
            message: format!("invalid cron expression '{}': {}", task.cron, e),
        })?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| EnsembleError::Task {
            name: task.name.clone(),
            message: format!("no async runtime available: {}", e),
        })?;

        if let Some(next) = schedule.upcoming(Utc).next() {
            tracing::debug!("task {} [{}] next run at {}", task.name, task.cron, next);
        }

        let handle = runtime.spawn(run_schedule(task.name.clone(), schedule, run));
        self.jobs.lock().push(ScheduledJob {
            name: task.name.clone(),
            handle,
        });
        Ok(())
    }

    fn shutdown(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        for job in jobs {
            job.handle.abort();
            tracing::debug!("task {} stopped", job.name);
        }
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        for job in self.jobs.get_mut().drain(..) {
            job.handle.abort();
        }
    }
}

async fn run_schedule(name: String, schedule: Schedule, run: TaskFn) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::debug!("task {} has no upcoming runs", name);
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        let action = run.clone();
        match tokio::task::spawn_blocking(move || action()).await {
            Ok(()) => tracing::trace!("task {} finished", name),
            Err(e) if e.is_panic() => {
                tracing::error!("Task[{}] panicked: {}", name, panic_message(&*e.into_panic()));
            }
            Err(e) => {
                tracing::warn!("Task[{}] was cancelled: {}", name, e);
                return;
            }
        }
    }
}
