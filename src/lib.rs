mod cli;
pub mod commands;
pub mod pipeline;

pub use commands::{ClickTask, Job};
pub use pipeline::Pipeline;

use anyhow::{bail, Context, Result};
use clap::Parser;
use click_config::AppConfig;
use click_state::{Outcome, RunReport, StepEvent};
use std::future::Future;
use std::io;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CRATES: &[&str] = &[
    "screenclick",
    "screenclick_lib",
    "click_capture",
    "click_vision",
    "click_input",
    "click_config",
    "click_state",
    "click_schedule",
];

/// `RUST_LOG` wins; otherwise every workspace crate logs at `level`.
fn init_tracing(level: &str) {
    let fallback = CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect::<Vec<_>>()
        .join(",");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &cli::Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("could not load {}", args.config.display()))?;
    if let Some(confidence) = args.confidence {
        config.ocr.confidence = confidence;
        config.validate()?;
    }
    Ok(config)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    if let Some(text) = &report.transcript {
        println!("{}", text);
    }
    println!(
        "{}: found {}, not found {}, clicked {}, click failures {}",
        report.outcome.tag(),
        report.tally.found,
        report.tally.not_found,
        report.tally.clicked,
        report.tally.failed
    );
    Ok(())
}

/// Print worker events until the stream closes, stopping the pipeline when
/// `interrupt` resolves. An interrupt source that fails is disabled, and
/// the run carries on.
async fn forward_events<S, Fut>(
    events: &mut mpsc::UnboundedReceiver<StepEvent>,
    pipeline: &Pipeline,
    json: bool,
    mut interrupt: S,
) where
    S: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut listening = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) if json => println!("{}", event.to_json()),
                Some(_) => {}
                None => break,
            },
            signal = interrupt(), if listening => match signal {
                Ok(()) => pipeline.stop(),
                Err(e) => {
                    warn!("Could not listen for Ctrl-C, the run cannot be interrupted: {}", e);
                    listening = false;
                }
            },
        }
    }
}

pub async fn run() -> Result<()> {
    let args = cli::Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.logging.level);
    info!("Loaded configuration from {}", args.config.display());

    let job = args.job()?;
    info!("Starting {:?}", job);

    let mut pipeline = Pipeline::start(job, config, ClickTask::from_config)?;
    let mut events = pipeline
        .take_events()
        .context("event stream already taken")?;

    forward_events(&mut events, &pipeline, args.json, tokio::signal::ctrl_c).await;

    let report = tokio::task::spawn_blocking(move || pipeline.join()).await?;
    print_report(&report, args.json)?;
    if let Outcome::Error { message } = report.outcome {
        bail!(message);
    }
    Ok(())
}
