use anyhow::{bail, Result};
use click_config::{AppConfig, QuantityPlan, TaskConfig};
use click_schedule::TaskScheduler;
use click_state::{Outcome, RunControl, RunReport, StepEvent};
use std::time::Duration;
use tracing::{info, warn};

use super::ClickTask;

/// What a run does once started.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    /// Each target in order, `times` attempts apiece, `interval` between
    /// consecutive attempts.
    Sequence {
        targets: Vec<String>,
        times: u32,
        interval: Duration,
    },
    /// Click `target` in rounds until the configured total succeeds.
    Quantity { target: String },
    /// Click `target` every scheduler period while inside the time window.
    Schedule { target: String },
    /// Print everything OCR sees.
    ListText,
}

impl Job {
    pub fn once(target: impl Into<String>) -> Self {
        Self::Sequence {
            targets: vec![target.into()],
            times: 1,
            interval: Duration::ZERO,
        }
    }
}

/// Run each target in order.
///
/// Cancellation is checked before every target and every attempt. The pause
/// comes before each attempt except the very first of the run, so targets are
/// spaced by `interval` too.
pub fn run_sequence(
    task: &mut ClickTask,
    targets: &[String],
    times: u32,
    interval: Duration,
    control: &RunControl,
) -> Result<()> {
    let total = targets.len();
    let mut first = true;
    for (index, target) in targets.iter().enumerate() {
        if control.is_cancelled() {
            break;
        }
        task.events().emit(StepEvent::TargetStarted {
            index,
            total,
            target: target.clone(),
        });

        for _ in 0..times {
            if control.is_cancelled() {
                break;
            }
            if !first && !interval.is_zero() {
                task.events().emit(StepEvent::Waiting {
                    seconds: interval.as_secs_f64(),
                });
                if control.wait(interval) {
                    break;
                }
            }
            first = false;
            task.run(target)?;
        }

        if !control.is_cancelled() {
            task.events().emit(StepEvent::TargetFinished {
                index,
                total,
                target: target.clone(),
            });
        }
    }
    Ok(())
}

/// Click `target` until `plan.total_clicks` attempts have succeeded.
///
/// Rounds hold `min(clicks_per_round, remaining)` attempts; only successful
/// clicks count toward the total. The pause between rounds is skipped once
/// the total is reached.
pub fn run_quantity(
    task: &mut ClickTask,
    target: &str,
    plan: &QuantityPlan,
    control: &RunControl,
) -> Result<()> {
    let total = plan.total_clicks;
    let per_round = plan.clicks_per_round.max(1);
    info!(
        "Quantity run on {:?}: {} click(s), {} per round",
        target, total, per_round
    );

    let mut completed = 0;
    let mut round = 0;
    while completed < total {
        if control.is_cancelled() {
            break;
        }
        round += 1;
        let clicks = per_round.min(total - completed);
        task.events().emit(StepEvent::RoundStarted { round, clicks });

        for _ in 0..clicks {
            if control.is_cancelled() {
                break;
            }
            if task.run(target)? {
                completed += 1;
                task.events().emit(StepEvent::Progress { completed, total });
            }
        }

        if completed < total {
            if control.is_cancelled() {
                break;
            }
            task.events().emit(StepEvent::Waiting {
                seconds: plan.round_interval,
            });
            if control.wait(plan.round_interval()) {
                break;
            }
        }
    }
    Ok(())
}

/// Click `target` on the scheduler's timer until stopped. A disabled
/// schedule returns at once.
pub fn run_schedule(
    task: &mut ClickTask,
    target: &str,
    config: &TaskConfig,
    control: &RunControl,
) -> Result<()> {
    let mut scheduler = TaskScheduler::from_config(config, control.clone())?;
    if !scheduler.is_enabled() {
        warn!("Scheduling is disabled; set task.enable_schedule to use it");
        return Ok(());
    }
    scheduler.start(|| task.run(target).map(drop).map_err(anyhow::Error::from))
}

/// Run `job` to completion or cancellation and report how it ended.
///
/// Capture and OCR failures end the run with an error outcome. Everything
/// else the task reports per attempt.
pub fn execute(
    job: &Job,
    config: &AppConfig,
    task: &mut ClickTask,
    control: &RunControl,
) -> RunReport {
    let mut transcript = None;
    let result = match job {
        Job::Sequence {
            targets,
            times,
            interval,
        } => {
            if targets.is_empty() {
                Err(anyhow::anyhow!("no target text given"))
            } else {
                run_sequence(task, targets, *times, *interval, control)
            }
        }
        Job::Quantity { target } => run_quantity(task, target, &config.quantity, control),
        Job::Schedule { target } => run_schedule(task, target, &config.task, control),
        Job::ListText => task
            .list_text()
            .map(|text| transcript = Some(text))
            .map_err(Into::into),
    };

    let outcome = match result {
        Err(e) => Outcome::Error {
            message: format!("{:#}", e),
        },
        Ok(()) if control.is_stopping() => Outcome::Stopped,
        Ok(()) => Outcome::Completed,
    };
    task.events().emit(StepEvent::Finished {
        outcome: outcome.clone(),
    });

    let mut report = RunReport::new(outcome, task.tally());
    report.transcript = transcript;
    report
}

/// Reject empty targets before a run starts.
pub fn check_targets(targets: &[String]) -> Result<()> {
    if targets.is_empty() || targets.iter().any(|t| t.is_empty()) {
        bail!("target text must not be empty");
    }
    Ok(())
}
