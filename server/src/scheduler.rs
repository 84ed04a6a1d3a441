//! Fixed-tick scheduler for periodic server tasks.
//!
//! One loop wakes every [`TICK`] and runs each enabled task whose interval
//! has elapsed. Tasks run inline on the scheduler's own timeline, so they
//! must stay short. A task that fails or panics is logged and the loop
//! carries on with the rest.

use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};

/// Scheduler cadence: 20 iterations per second.
pub const TICK: Duration = Duration::from_millis(50);

pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type TaskFn = Box<dyn Fn() -> TaskResult + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no task named '{0}'")]
    NotFound(String),
    #[error("a task named '{0}' is already registered")]
    Duplicate(String),
}

struct Task {
    name: String,
    interval: Duration,
    delayed_start: bool,
    enabled: AtomicBool,
    executing: AtomicBool,
    last_exec: Mutex<Option<Instant>>,
    func: TaskFn,
}

impl Task {
    /// Runs the task if it is due at `now`. Returns whether it ran.
    ///
    /// A poll that finds the task still executing leaves its clock alone.
    fn poll(&self, now: Instant) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }

        if self.executing.swap(true, Ordering::SeqCst) {
            debug!("[scheduler] Task '{}' still executing; skipped", self.name);
            return false;
        }

        {
            let mut last = self.last_exec.lock();
            let due = match *last {
                None => !self.delayed_start,
                Some(at) => now.duration_since(at) >= self.interval,
            };
            if last.is_none() || due {
                *last = Some(now);
            }
            if !due {
                self.executing.store(false, Ordering::SeqCst);
                return false;
            }
        }

        match catch_unwind(AssertUnwindSafe(|| (self.func)())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("[scheduler] Task '{}' failed: {}", self.name, e),
            Err(_) => error!("[scheduler] Task '{}' panicked", self.name),
        }

        self.executing.store(false, Ordering::SeqCst);
        true
    }
}

#[derive(Default)]
pub struct Scheduler {
    tasks: RwLock<Vec<Arc<Task>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task. With `delayed_start` the first due check only
    /// records the time, so the first run happens one interval later.
    pub fn add_task<F>(
        &self,
        name: &str,
        interval: Duration,
        delayed_start: bool,
        func: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        let mut tasks = self.tasks.write();
        if tasks.iter().any(|task| task.name == name) {
            return Err(SchedulerError::Duplicate(name.to_string()));
        }

        tasks.push(Arc::new(Task {
            name: name.to_string(),
            interval,
            delayed_start,
            enabled: AtomicBool::new(true),
            executing: AtomicBool::new(false),
            last_exec: Mutex::new(None),
            func: Box::new(func),
        }));
        debug!("[scheduler] Registered task '{}' every {:?}", name, interval);
        Ok(())
    }

    pub fn enable(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), SchedulerError> {
        let tasks = self.tasks.read();
        let task = tasks
            .iter()
            .find(|task| task.name == name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?;
        task.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.tasks
            .read()
            .iter()
            .find(|task| task.name == name)
            .map(|task| task.enabled.load(Ordering::SeqCst))
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.read().iter().map(|task| task.name.clone()).collect()
    }

    /// One scheduler iteration at `now`. Returns how many tasks ran.
    pub fn run_due(&self, now: Instant) -> usize {
        // snapshot so a task may register or toggle others without deadlock
        let tasks: Vec<Arc<Task>> = self.tasks.read().clone();
        tasks.iter().filter(|task| task.poll(now)).count()
    }

    /// Runs forever at [`TICK`] cadence. Each iteration measures the real
    /// time instead of trusting the sleep, so slow tasks do not cause drift.
    pub async fn run(&self) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("[scheduler] Started with {} task(s)", self.tasks.read().len());

        loop {
            ticker.tick().await;
            self.run_due(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(scheduler: &Scheduler, name: &str, every: Duration, delayed: bool) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        scheduler
            .add_task(name, every, delayed, move || {
                inner.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        count
    }

    #[test]
    fn test_runs_when_interval_elapsed() {
        let scheduler = Scheduler::new();
        let count = counter_task(&scheduler, "tick", Duration::from_secs(1), false);
        let start = Instant::now();

        assert_eq!(scheduler.run_due(start), 1);
        assert_eq!(scheduler.run_due(start + Duration::from_millis(500)), 0);
        assert_eq!(scheduler.run_due(start + Duration::from_millis(1000)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delayed_start_warms_up() {
        let scheduler = Scheduler::new();
        let count = counter_task(&scheduler, "late", Duration::from_secs(1), true);
        let start = Instant::now();

        assert_eq!(scheduler.run_due(start), 0);
        assert_eq!(scheduler.run_due(start + Duration::from_millis(999)), 0);
        assert_eq!(scheduler.run_due(start + Duration::from_secs(1)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_task_skipped() {
        let scheduler = Scheduler::new();
        let count = counter_task(&scheduler, "toggle", Duration::ZERO, false);
        let now = Instant::now();

        scheduler.disable("toggle").unwrap();
        assert_eq!(scheduler.is_enabled("toggle"), Some(false));
        assert_eq!(scheduler.run_due(now), 0);

        scheduler.enable("toggle").unwrap();
        assert_eq!(scheduler.run_due(now), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let scheduler = Scheduler::new();
        assert_eq!(
            scheduler.enable("missing"),
            Err(SchedulerError::NotFound("missing".to_string()))
        );
        assert!(scheduler.disable("missing").is_err());
        assert_eq!(scheduler.is_enabled("missing"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let scheduler = Scheduler::new();
        counter_task(&scheduler, "dup", Duration::ZERO, false);
        assert!(matches!(
            scheduler.add_task("dup", Duration::ZERO, false, || Ok(())),
            Err(SchedulerError::Duplicate(_))
        ));
        assert_eq!(scheduler.task_names(), vec!["dup".to_string()]);
    }

    #[test]
    fn test_failing_task_does_not_stop_others() {
        let scheduler = Scheduler::new();
        scheduler
            .add_task("fails", Duration::ZERO, false, || Err("boom".into()))
            .unwrap();
        scheduler
            .add_task("panics", Duration::ZERO, false, || panic!("task panic"))
            .unwrap();
        let count = counter_task(&scheduler, "ok", Duration::ZERO, false);

        let now = Instant::now();
        assert_eq!(scheduler.run_due(now), 3);
        assert_eq!(scheduler.run_due(now), 3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reentrant_poll_skips_without_touching_clock() {
        let scheduler = Arc::new(Scheduler::new());
        let start = Instant::now();
        let nested_runs = Arc::new(AtomicUsize::new(usize::MAX));

        let inner = Arc::clone(&scheduler);
        let nested = Arc::clone(&nested_runs);
        scheduler
            .add_task("reentrant", Duration::from_secs(1), false, move || {
                let ran = inner.run_due(start + Duration::from_millis(500));
                nested.store(ran, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(scheduler.run_due(start), 1);
        assert_eq!(nested_runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.run_due(start + Duration::from_secs(1)), 1);
    }

    #[tokio::test]
    async fn test_run_loop_ticks() {
        let scheduler = Arc::new(Scheduler::new());
        let count = counter_task(&scheduler, "fast", Duration::from_millis(10), false);

        let runner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
