use anyhow::{bail, ensure, Result};
use clap::Parser;
use click_config::seconds;
use std::path::PathBuf;

use crate::commands::{check_targets, Job};

/// Find text on screen with OCR and click it.
#[derive(Debug, Parser)]
#[command(name = "screenclick", version)]
pub struct Args {
    /// Text to click. Separate several targets with commas to click them in order.
    #[arg(short, long)]
    pub text: Option<String>,

    /// YAML configuration file; missing sections fall back to defaults.
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Attempts per target.
    #[arg(long, default_value_t = 1)]
    pub times: u32,

    /// Seconds between attempts.
    #[arg(long, default_value_t = 2.0)]
    pub interval: f64,

    /// Click in rounds until `quantity.total_clicks` succeed.
    #[arg(long, conflicts_with = "schedule")]
    pub quantity: bool,

    /// Click on the scheduler's timer inside `task.start_time`..`task.end_time`.
    #[arg(long)]
    pub schedule: bool,

    /// Print all recognized text and exit.
    #[arg(long, conflicts_with_all = ["text", "quantity", "schedule"])]
    pub list_text: bool,

    /// Override `ocr.confidence`.
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Print step events and the final report as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    fn targets(&self) -> Result<Vec<String>> {
        let Some(text) = &self.text else {
            bail!("no target text given; pass -t/--text or --list-text");
        };
        let targets: Vec<String> = text.split(',').map(|t| t.trim().to_string()).collect();
        check_targets(&targets)?;
        Ok(targets)
    }

    fn single_target(&self, mode: &str) -> Result<String> {
        let mut targets = self.targets()?;
        ensure!(targets.len() == 1, "{} mode takes a single target", mode);
        Ok(targets.remove(0))
    }

    /// Translate the flags into the job to run.
    pub fn job(&self) -> Result<Job> {
        if self.list_text {
            return Ok(Job::ListText);
        }
        if self.quantity {
            return Ok(Job::Quantity {
                target: self.single_target("quantity")?,
            });
        }
        if self.schedule {
            return Ok(Job::Schedule {
                target: self.single_target("schedule")?,
            });
        }

        Ok(Job::Sequence {
            targets: self.targets()?,
            times: self.times,
            interval: seconds("--interval", self.interval)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("screenclick").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["-t", "确定"]);
        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert!(!args.json);
        assert_eq!(
            args.job().unwrap(),
            Job::Sequence {
                targets: vec!["确定".into()],
                times: 1,
                interval: Duration::from_secs(2),
            }
        );
    }

    #[test]
    fn test_comma_separated_sequence() {
        let args = parse(&["--text", "设置, 帮助", "--times", "3", "--interval", "0.5"]);
        assert_eq!(
            args.job().unwrap(),
            Job::Sequence {
                targets: vec!["设置".into(), "帮助".into()],
                times: 3,
                interval: Duration::from_millis(500),
            }
        );
    }

    #[test]
    fn test_modes() {
        assert_eq!(
            parse(&["-t", "领取", "--quantity"]).job().unwrap(),
            Job::Quantity {
                target: "领取".into()
            }
        );
        assert_eq!(
            parse(&["-t", "签到", "--schedule"]).job().unwrap(),
            Job::Schedule {
                target: "签到".into()
            }
        );
        assert_eq!(parse(&["--list-text"]).job().unwrap(), Job::ListText);
    }

    #[test]
    fn test_rejected_inputs() {
        assert!(parse(&[]).job().is_err());
        assert!(parse(&["-t", ""]).job().is_err());
        assert!(parse(&["-t", "a,,b"]).job().is_err());
        assert!(parse(&["-t", "a,b", "--quantity"]).job().is_err());
        assert!(parse(&["-t", "a", "--interval=-1"]).job().is_err());
        assert!(
            Args::try_parse_from(["screenclick", "-t", "a", "--quantity", "--schedule"]).is_err()
        );
    }

    #[test]
    fn test_interval_too_long() {
        assert!(parse(&["-t", "a", "--interval", "1e20"]).job().is_err());
        assert!(parse(&["-t", "a", "--interval", "inf"]).job().is_err());
        assert!(parse(&["-t", "a", "--interval", "86400"]).job().is_ok());
    }

    #[test]
    fn test_confidence_override() {
        let args = parse(&["--list-text", "--confidence", "0.6"]);
        assert_eq!(args.confidence, Some(0.6));
    }
}
