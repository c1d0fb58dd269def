use anyhow::{Context, Result};
use click_config::AppConfig;
use click_state::{EventSink, RunControl, RunReport, RunState, StepEvent};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::commands::{self, ClickTask, Job};

/// Runs one job on a dedicated worker thread and exposes its state, its
/// event stream and a stop switch.
pub struct Pipeline {
    control: RunControl,
    events: Option<mpsc::UnboundedReceiver<StepEvent>>,
    worker: Option<JoinHandle<RunReport>>,
}

impl Pipeline {
    /// Start `job` in the background.
    ///
    /// `build` runs on the worker thread and wires up the task there, so
    /// platform handles never cross threads.
    pub fn start<F>(job: Job, config: AppConfig, build: F) -> Result<Self>
    where
        F: FnOnce(&AppConfig, EventSink) -> Result<ClickTask> + Send + 'static,
    {
        let control = RunControl::new();
        control.start();
        let (sink, events) = EventSink::channel();

        let worker_control = control.clone();
        let spawned = thread::Builder::new()
            .name("screenclick-worker".into())
            .spawn(move || {
                let report = match build(&config, sink.clone()) {
                    Ok(mut task) => commands::execute(&job, &config, &mut task, &worker_control),
                    Err(e) => {
                        let report = RunReport::failed(format!("{:#}", e));
                        sink.emit(StepEvent::Finished {
                            outcome: report.outcome.clone(),
                        });
                        report
                    }
                };
                worker_control.finish();
                report
            });

        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                control.finish();
                return Err(e).context("failed to spawn worker thread");
            }
        };

        info!("Pipeline started");
        Ok(Self {
            control,
            events: Some(events),
            worker: Some(worker),
        })
    }

    /// Ask the worker to stop at its next checkpoint.
    pub fn stop(&self) {
        info!("Pipeline stop requested");
        self.control.request_stop();
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.control.subscribe()
    }

    /// The event stream. Can be taken once; it closes when the worker exits.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<StepEvent>> {
        self.events.take()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the worker exits and return its report.
    pub fn join(mut self) -> RunReport {
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(_)) => {
                warn!("Worker thread panicked");
                self.control.finish();
                RunReport::failed("worker thread panicked")
            }
            None => RunReport::failed("pipeline already joined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use crate::commands::testing::{hit, quick_config, Fakes};
    use click_state::Outcome;
    use std::time::{Duration, Instant};

    fn start_with(fakes: &Fakes, job: Job) -> Pipeline {
        let fakes = fakes.clone();
        Pipeline::start(job, quick_config(), move |config, events| {
            Ok(fakes.task(config, events))
        })
        .unwrap()
    }

    #[test]
    fn test_single_click_run() {
        let fakes = Fakes::new(vec![vec![hit("帮助", 92.0)]]);
        let mut pipeline = start_with(&fakes, Job::once("帮助"));
        let mut events = pipeline.take_events().unwrap();
        assert!(pipeline.take_events().is_none());

        let report = pipeline.join();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.tally.clicked, 1);
        assert_eq!(fakes.moves(), vec![(124, 52)]);

        let tags: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.tag())
            .collect();
        assert_eq!(
            tags,
            vec!["target", "searching", "found", "clicked", "target done", "completed"]
        );
    }

    #[test]
    fn test_stop_during_interval() {
        let fakes = Fakes::new(vec![vec![hit("OK", 90.0)]; 3]);
        let job = Job::Sequence {
            targets: vec!["OK".into()],
            times: 3,
            interval: Duration::from_secs(30),
        };
        let pipeline = start_with(&fakes, job);
        let mut states = pipeline.subscribe();

        std::thread::sleep(Duration::from_millis(150));
        let stopped_at = Instant::now();
        pipeline.stop();
        let report = pipeline.join();

        assert!(stopped_at.elapsed() < Duration::from_secs(2));
        assert_eq!(report.outcome, Outcome::Stopped);
        assert_eq!(report.tally.clicked, 1);
        assert_eq!(*states.borrow_and_update(), RunState::Idle);
    }

    #[test]
    fn test_build_failure_reports_error() {
        let pipeline = Pipeline::start(Job::once("OK"), quick_config(), |_, _| {
            bail!("OCR engine unavailable")
        })
        .unwrap();
        let control = pipeline.control.clone();

        let report = pipeline.join();
        assert_eq!(
            report.outcome,
            Outcome::Error {
                message: "OCR engine unavailable".into()
            }
        );
        assert_eq!(control.state(), RunState::Idle);
    }

    #[test]
    fn test_capture_failure_reports_error() {
        let fakes = Fakes::new(vec![]).without_monitor();
        let report = start_with(&fakes, Job::once("OK")).join();
        assert!(matches!(report.outcome, Outcome::Error { .. }));
        assert!(fakes.moves().is_empty());
    }
}
