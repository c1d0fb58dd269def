use anyhow::Result;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use click_config::{check_cron, parse_hhmm, ConfigError, TaskConfig};
use click_state::RunControl;
use std::time::Duration;
use tracing::{debug, info};

/// Cadence of the scheduler loop.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Source of local wall-clock time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Inclusive time-of-day window, evaluated at minute resolution.
///
/// Unless both ends are set the window is always open. A start later than
/// the end wraps past midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleWindow {
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
}

impl ScheduleWindow {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn from_config(task: &TaskConfig) -> Result<Self, ConfigError> {
        let start = task
            .start_time
            .as_deref()
            .map(|s| parse_hhmm("task.start_time", s))
            .transpose()?;
        let end = task
            .end_time
            .as_deref()
            .map(|s| parse_hhmm("task.end_time", s))
            .transpose()?;
        Ok(Self { start, end })
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn contains(&self, at: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return true;
        };
        let at = NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).unwrap_or(at);
        if start <= end {
            start <= at && at <= end
        } else {
            at >= start || at <= end
        }
    }
}

/// A cron expression honored at whole-minute resolution only: any
/// well-formed expression fires once per minute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    expr: String,
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        check_cron(expr)?;
        Ok(Self {
            expr: expr.trim().to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    pub fn period(&self) -> TimeDelta {
        TimeDelta::minutes(1)
    }
}

#[derive(Debug)]
struct Job {
    period: TimeDelta,
    next_run: NaiveDateTime,
}

impl Job {
    fn new(period: TimeDelta, now: NaiveDateTime) -> Self {
        Self {
            period,
            next_run: now + period,
        }
    }

    fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next_run
    }

    fn reschedule(&mut self, after: NaiveDateTime) {
        self.next_run = after + self.period;
    }
}

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    OutsideWindow,
    Idle,
    Ran(usize),
}

/// Invokes a task periodically inside a time-of-day window until stopped.
/// Each instance owns its registered jobs.
pub struct TaskScheduler<C: Clock = LocalClock> {
    enabled: bool,
    cron: Option<CronSpec>,
    window: ScheduleWindow,
    jobs: Vec<Job>,
    control: RunControl,
    clock: C,
}

impl TaskScheduler<LocalClock> {
    pub fn from_config(task: &TaskConfig, control: RunControl) -> Result<Self, ConfigError> {
        Self::with_clock(task, control, LocalClock)
    }
}

impl<C: Clock> TaskScheduler<C> {
    pub fn with_clock(
        task: &TaskConfig,
        control: RunControl,
        clock: C,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: task.enable_schedule,
            cron: task.cron.as_deref().map(CronSpec::parse).transpose()?,
            window: ScheduleWindow::from_config(task)?,
            jobs: Vec::new(),
            control,
            clock,
        })
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> ScheduleWindow {
        self.window
    }

    pub fn cron(&self) -> Option<&CronSpec> {
        self.cron.as_ref()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_within_time_window(&self) -> bool {
        self.window.contains(self.clock.now().time())
    }

    /// Replace the cron expression and drop any registered jobs.
    pub fn set_cron(&mut self, expr: Option<&str>) -> Result<(), ConfigError> {
        self.cron = expr.map(CronSpec::parse).transpose()?;
        self.jobs.clear();
        Ok(())
    }

    fn register(&mut self) {
        let period = self
            .cron
            .as_ref()
            .map_or(TimeDelta::minutes(1), CronSpec::period);
        self.jobs.push(Job::new(period, self.clock.now()));
    }

    /// One loop step: outside the window nothing runs; inside it every due
    /// job invokes `task` once.
    pub fn tick<F>(&mut self, task: &mut F) -> Result<Tick>
    where
        F: FnMut() -> Result<()>,
    {
        let now = self.clock.now();
        if !self.window.contains(now.time()) {
            debug!("{} is outside the schedule window, skipping tick", now.format("%H:%M"));
            return Ok(Tick::OutsideWindow);
        }

        let mut ran = 0;
        for job in self.jobs.iter_mut().filter(|j| j.is_due(now)) {
            let result = task();
            job.reschedule(self.clock.now());
            result?;
            ran += 1;
        }
        Ok(if ran == 0 { Tick::Idle } else { Tick::Ran(ran) })
    }

    /// Register `task` and run the tick loop until stopped. Does nothing when
    /// scheduling is disabled. A task error ends the loop and is returned.
    pub fn start<F>(&mut self, mut task: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        if !self.enabled {
            info!("Scheduling is disabled (task.enable_schedule = false)");
            return Ok(());
        }

        let owned = self.control.start();
        self.register();
        info!(
            "Scheduler started: cron={}, window={:?}",
            self.cron.as_ref().map_or("every minute", CronSpec::as_str),
            self.window
        );

        let result = self.run_loop(&mut task);

        self.jobs.clear();
        if owned {
            self.control.finish();
        }
        info!("Scheduler stopped");
        result
    }

    fn run_loop<F>(&mut self, task: &mut F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        loop {
            if self.control.is_cancelled() {
                return Ok(());
            }
            self.tick(task)?;
            if self.control.wait(TICK_INTERVAL) {
                return Ok(());
            }
        }
    }

    /// Ask the loop to exit at its next tick boundary.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Invoke `task` once right now, ignoring the window and the loop state.
    pub fn run_now<F, T>(&self, task: F) -> T
    where
        F: FnOnce() -> T,
    {
        task()
    }
}
