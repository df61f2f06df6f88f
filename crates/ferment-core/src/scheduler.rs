//! Multi-rate periodic task driver.
//!
//! Every task gets its own loop on the tokio runtime. Ticks are synchronous
//! and run on the blocking pool, so a slow device read in one task never
//! stalls another. Waits are interruptible: stopping a task wakes it at once
//! and the loop only lingers for the tick that is already in flight.

use crate::error::SetupError;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A unit of periodic work driven by the [`Scheduler`].
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &str;

    /// One bounded unit of work. Ticks of the same task never overlap.
    fn tick(&mut self);

    /// Runs exactly once after the task has been stopped.
    fn shutdown(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub init_delay: Duration,
}

impl Schedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            init_delay: Duration::ZERO,
        }
    }

    pub fn with_init_delay(mut self, init_delay: Duration) -> Self {
        self.init_delay = init_delay;
        self
    }

    /// Builds a schedule from configuration seconds. Negative or non-finite
    /// values are rejected.
    pub fn from_secs(interval: f64, init_delay: f64) -> Result<Self, SetupError> {
        Ok(Self {
            interval: secs("interval", interval)?,
            init_delay: secs("init delay", init_delay)?,
        })
    }
}

fn secs(what: &'static str, value: f64) -> Result<Duration, SetupError> {
    Duration::try_from_secs_f64(value).map_err(|_| SetupError::InvalidDuration { what, value })
}

/// Outcome of one task loop, returned once the loop has fully exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub ticks: u64,
    pub max_tick: Duration,
    pub shut_down: bool,
}

impl TaskReport {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn record_tick(&mut self, elapsed: Duration) {
        self.ticks += 1;
        self.max_tick = self.max_tick.max(elapsed);
    }
}

/// Per-task stop switch.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: String,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotent. Wakes the task if it is waiting.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct Scheduler {
    shutdown: CancellationToken,
    tasks: JoinSet<TaskReport>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Spawns the task loop. Must be called from within a tokio runtime.
    pub fn start<T: PeriodicTask>(&mut self, task: T, schedule: Schedule) -> TaskHandle {
        let name = task.name().to_string();
        let token = self.shutdown.child_token();

        debug!(
            task = %name,
            interval_ms = schedule.interval.as_millis() as u64,
            init_delay_ms = schedule.init_delay.as_millis() as u64,
            "Starting periodic task"
        );

        self.tasks
            .spawn(drive(Box::new(task), schedule, token.clone()));
        TaskHandle { name, token }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stops every task and waits for each loop, shutdown hook included.
    pub async fn shutdown(mut self) -> Vec<TaskReport> {
        info!(tasks = self.tasks.len(), "Stopping periodic tasks");
        self.shutdown.cancel();

        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Periodic task loop aborted"),
            }
        }
        reports
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

type Job = Box<dyn PeriodicTask>;

async fn drive(mut task: Job, schedule: Schedule, stop: CancellationToken) -> TaskReport {
    let mut report = TaskReport::new(task.name().to_string());

    if wait(schedule.init_delay, &stop).await {
        while !stop.is_cancelled() {
            let started = Instant::now();
            task = match run_blocking(task, |t| t.tick()).await {
                Some(task) => task,
                None => {
                    error!(task = %report.name, "Tick panicked, task abandoned");
                    return report;
                }
            };
            report.record_tick(started.elapsed());

            if !wait(schedule.interval, &stop).await {
                break;
            }
        }
    }

    report.shut_down = run_blocking(task, |t| t.shutdown()).await.is_some();
    debug!(task = %report.name, ticks = report.ticks, "Periodic task exited");
    report
}

/// Returns false when woken by the stop signal.
async fn wait(period: Duration, stop: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

async fn run_blocking(task: Job, f: fn(&mut Job)) -> Option<Job> {
    tokio::task::spawn_blocking(move || {
        let mut task = task;
        f(&mut task);
        task
    })
    .await
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Counters {
        ticks: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    struct Counting {
        name: &'static str,
        counters: Counters,
    }

    impl PeriodicTask for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn tick(&mut self) {
            self.counters.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn shutdown(&mut self) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(name: &'static str) -> (Counting, Counters) {
        let counters = Counters::default();
        (
            Counting {
                name,
                counters: counters.clone(),
            },
            counters,
        )
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn stop_wakes_task_before_interval_elapses() {
        let mut scheduler = Scheduler::new();
        let (task, counters) = counting("slow");
        let handle = scheduler.start(task, Schedule::every(Duration::from_secs(3600)));

        wait_until(|| counters.ticks.load(Ordering::SeqCst) == 1).await;
        handle.stop();
        wait_until(|| counters.shutdowns.load(Ordering::SeqCst) == 1).await;

        let reports = scheduler.shutdown().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].ticks, 1);
        assert!(reports[0].shut_down);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stopping_one_task_leaves_others_running() {
        let mut scheduler = Scheduler::new();
        let (first, first_counters) = counting("first");
        let (second, second_counters) = counting("second");
        let first_handle = scheduler.start(first, Schedule::every(Duration::from_millis(5)));
        scheduler.start(second, Schedule::every(Duration::from_millis(5)));

        first_handle.stop();
        first_handle.stop();
        wait_until(|| first_counters.shutdowns.load(Ordering::SeqCst) == 1).await;

        let before = second_counters.ticks.load(Ordering::SeqCst);
        wait_until(|| second_counters.ticks.load(Ordering::SeqCst) > before + 2).await;
        assert_eq!(second_counters.shutdowns.load(Ordering::SeqCst), 0);

        scheduler.shutdown().await;
        assert_eq!(first_counters.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(second_counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_runs_once_even_without_ticks() {
        let mut scheduler = Scheduler::new();
        let (task, counters) = counting("delayed");
        scheduler.start(
            task,
            Schedule::every(Duration::from_millis(1)).with_init_delay(Duration::from_secs(3600)),
        );

        let reports = tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown())
            .await
            .expect("shutdown should not wait for the init delay");

        assert_eq!(reports[0].ticks, 0);
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    struct Overlap {
        busy: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
        ticks: Arc<AtomicUsize>,
    }

    impl PeriodicTask for Overlap {
        fn name(&self) -> &str {
            "overlap"
        }

        fn tick(&mut self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(10));
            self.busy.store(false, Ordering::SeqCst);
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn ticks_of_one_task_never_overlap() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.start(
            Overlap {
                busy: Arc::new(AtomicBool::new(false)),
                overlapped: Arc::clone(&overlapped),
                ticks: Arc::clone(&ticks),
            },
            Schedule::every(Duration::ZERO),
        );

        wait_until(|| ticks.load(Ordering::SeqCst) >= 5).await;
        scheduler.shutdown().await;

        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn schedule_rejects_negative_seconds() {
        assert!(Schedule::from_secs(-1.0, 0.0).is_err());
        assert!(Schedule::from_secs(1.0, f64::NAN).is_err());

        let schedule = Schedule::from_secs(0.5, 2.0).unwrap();
        assert_eq!(schedule.interval, Duration::from_millis(500));
        assert_eq!(schedule.init_delay, Duration::from_secs(2));
    }
}
