use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Stopped,
    Error { message: String },
}

impl Outcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error { .. } => "error",
        }
    }
}

/// One entry of the running log a front-end shows while a job executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    TargetStarted { index: usize, total: usize, target: String },
    Searching { target: String },
    Found { target: String, x: i32, y: i32 },
    NotFound { target: String },
    Clicked { x: i32, y: i32 },
    ClickFailed { target: String, error: String },
    Waiting { seconds: f64 },
    RoundStarted { round: u32, clicks: u32 },
    Progress { completed: u32, total: u32 },
    TargetFinished { index: usize, total: usize, target: String },
    Transcript { text: String },
    Finished { outcome: Outcome },
}

impl StepEvent {
    /// Short status tag shown in front of each log line.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::TargetStarted { .. } => "target",
            Self::Searching { .. } => "searching",
            Self::Found { .. } => "found",
            Self::NotFound { .. } => "not found",
            Self::Clicked { .. } => "clicked",
            Self::ClickFailed { .. } => "click failed",
            Self::Waiting { .. } => "waiting",
            Self::RoundStarted { .. } => "round",
            Self::Progress { .. } => "progress",
            Self::TargetFinished { .. } => "target done",
            Self::Transcript { .. } => "text",
            Self::Finished { outcome } => outcome.tag(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.tag())?;
        match self {
            Self::TargetStarted { index, total, target } => {
                write!(f, "target {}/{}: {}", index + 1, total, target)
            }
            Self::Searching { target } => write!(f, "looking for {:?}", target),
            Self::Found { target, x, y } => write!(f, "{:?} at ({}, {})", target, x, y),
            Self::NotFound { target } => write!(f, "{:?} not on screen", target),
            Self::Clicked { x, y } => write!(f, "clicked ({}, {})", x, y),
            Self::ClickFailed { target, error } => write!(f, "{:?}: {}", target, error),
            Self::Waiting { seconds } => write!(f, "{} s", seconds),
            Self::RoundStarted { round, clicks } => {
                write!(f, "round {} ({} click(s))", round, clicks)
            }
            Self::Progress { completed, total } => write!(f, "{}/{}", completed, total),
            Self::TargetFinished { index, total, target } => {
                write!(f, "target {}/{}: {}", index + 1, total, target)
            }
            Self::Transcript { text } => {
                write!(f, "{} character(s) recognized", text.chars().count())
            }
            Self::Finished { outcome: Outcome::Error { message } } => f.write_str(message),
            Self::Finished { .. } => f.write_str("run finished"),
        }
    }
}

/// Forwards step events to the log and, when connected, to a front-end.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<StepEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StepEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Log only.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: StepEvent) {
        match &event {
            StepEvent::NotFound { .. } | StepEvent::ClickFailed { .. } => warn!("{}", event),
            StepEvent::Finished {
                outcome: Outcome::Error { .. },
            } => error!("{}", event),
            _ => info!("{}", event),
        }
        if let Some(tx) = &self.tx {
            // The front-end may have gone away; the log line above still stands.
            let _ = tx.send(event);
        }
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub found: u32,
    pub not_found: u32,
    pub clicked: u32,
    pub failed: u32,
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: Outcome,
    #[serde(flatten)]
    pub tally: Tally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl RunReport {
    pub fn new(outcome: Outcome, tally: Tally) -> Self {
        Self {
            outcome,
            tally,
            transcript: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(
            Outcome::Error {
                message: message.into(),
            },
            Tally::default(),
        )
    }
}
