use chrono::NaiveTime;
use click_capture::ScreenRegion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Whole configuration file. Every section and field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ocr: OcrConfig,
    pub click: ClickConfig,
    pub task: TaskConfig,
    pub quantity: QuantityPlan,
    pub logging: LoggingConfig,
}

/// `ocr` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Minimum normalized confidence, 0.0-1.0. Default 0.8.
    pub confidence: f64,
    /// Tesseract language code. Default `chi_sim`.
    pub language: String,
    /// `[left, top, width, height]`; absent means the whole primary monitor.
    #[serde(with = "region_list")]
    pub region: Option<ScreenRegion>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            confidence: 0.8,
            language: "chi_sim".to_string(),
            region: None,
        }
    }
}

/// Pointer gesture performed at the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClickType {
    #[default]
    Single,
    Double,
    Right,
}

impl ClickType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "single" => Some(Self::Single),
            "double" => Some(Self::Double),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// Unknown names fall back to a single click.
    pub fn from_name_lossy(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!("Unknown click type {:?}, using single click", name);
            Self::Single
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for ClickType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ClickType {
    fn from(name: String) -> Self {
        Self::from_name_lossy(&name)
    }
}

impl From<ClickType> for String {
    fn from(t: ClickType) -> Self {
        t.as_str().to_string()
    }
}

/// `click` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub click_type: ClickType,
    /// Seconds to let the target application settle after each click. Default 1.0.
    pub interval: f64,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Attempts made by the pipeline's retrying click. Default 3.
    pub max_retries: u32,
    /// Seconds between failed attempts. Default 1.0.
    pub retry_interval: f64,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            click_type: ClickType::Single,
            interval: 1.0,
            offset_x: 0,
            offset_y: 0,
            max_retries: 3,
            retry_interval: 1.0,
        }
    }
}

impl ClickConfig {
    pub fn interval(&self) -> Duration {
        secs(self.interval)
    }

    pub fn retry_interval(&self) -> Duration {
        secs(self.retry_interval)
    }
}

/// `task` section: schedule gating.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub enable_schedule: bool,
    pub cron: Option<String>,
    /// `HH:MM`
    pub start_time: Option<String>,
    /// `HH:MM`
    pub end_time: Option<String>,
}

/// `quantity` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantityPlan {
    pub total_clicks: u32,
    pub clicks_per_round: u32,
    /// Seconds to pause between rounds. Default 5.0.
    pub round_interval: f64,
}

impl Default for QuantityPlan {
    fn default() -> Self {
        Self {
            total_clicks: 100,
            clicks_per_round: 10,
            round_interval: 5.0,
        }
    }
}

impl QuantityPlan {
    pub fn round_interval(&self) -> Duration {
        secs(self.round_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        debug!("Parsed configuration from {}", path.display());
        Ok(config)
    }

    /// Parse YAML without validating. An empty document yields the defaults.
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ocr = &self.ocr;
        if !(0.0..=1.0).contains(&ocr.confidence) {
            return Err(ConfigError::invalid(
                "ocr.confidence",
                format!("{} is not within 0.0-1.0", ocr.confidence),
            ));
        }
        if ocr.language.trim().is_empty() {
            return Err(ConfigError::invalid("ocr.language", "must not be empty"));
        }

        check_seconds("click.interval", self.click.interval)?;
        check_seconds("click.retry_interval", self.click.retry_interval)?;
        if self.click.max_retries == 0 {
            return Err(ConfigError::invalid("click.max_retries", "must be at least 1"));
        }

        if let Some(start) = &self.task.start_time {
            parse_hhmm("task.start_time", start)?;
        }
        if let Some(end) = &self.task.end_time {
            parse_hhmm("task.end_time", end)?;
        }
        if let Some(cron) = &self.task.cron {
            check_cron(cron)?;
        }

        if self.quantity.clicks_per_round == 0 {
            return Err(ConfigError::invalid(
                "quantity.clicks_per_round",
                "must be at least 1",
            ));
        }
        check_seconds("quantity.round_interval", self.quantity.round_interval)?;

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }
        Ok(())
    }
}

/// Parse an `HH:MM` time of day.
pub fn parse_hhmm(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| ConfigError::invalid(field, format!("{:?} is not HH:MM ({})", value, e)))
}

/// Cron expressions are accepted with 5, 6 or 7 whitespace-separated fields.
/// Only the shape is checked; the scheduler ticks once per minute regardless.
pub fn check_cron(expr: &str) -> Result<(), ConfigError> {
    let fields = expr.split_whitespace().count();
    if (5..=7).contains(&fields) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "task.cron",
            format!("{:?} has {} field(s), expected 5-7", expr, fields),
        ))
    }
}

/// Longest pause any setting may ask for: one day.
pub const MAX_SECONDS: f64 = 86_400.0;

/// Convert a seconds setting into a `Duration`, rejecting negative,
/// non-finite and over-long values.
pub fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !(0.0..=MAX_SECONDS).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("{} is not between 0 and {} seconds", value, MAX_SECONDS),
        ));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::invalid(field, format!("{} seconds: {}", value, e)))
}

fn check_seconds(field: &'static str, value: f64) -> Result<(), ConfigError> {
    seconds(field, value).map(drop)
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// `[left, top, width, height]` <-> `ScreenRegion`.
mod region_list {
    use click_capture::ScreenRegion;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        region: &Option<ScreenRegion>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        region
            .map(|r| [r.left as i64, r.top as i64, r.width as i64, r.height as i64])
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ScreenRegion>, D::Error> {
        let Some([left, top, width, height]) = Option::<[i64; 4]>::deserialize(deserializer)?
        else {
            return Ok(None);
        };
        if width <= 0 || height <= 0 {
            return Err(D::Error::custom(format!(
                "region size {}x{} must be positive",
                width, height
            )));
        }
        let int = |v: i64| {
            i32::try_from(v).map_err(|_| D::Error::custom("region value out of range"))
        };
        Ok(Some(ScreenRegion::new(
            int(left)?,
            int(top)?,
            int(width)? as u32,
            int(height)? as u32,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
ocr:
  confidence: 0.9
  language: eng
  region: [100, 200, 640, 480]
click:
  click_type: double
  interval: 0.5
  offset_x: 4
  offset_y: -2
task:
  enable_schedule: true
  cron: "*/5 * * * *"
  start_time: "09:00"
  end_time: "17:30"
quantity:
  total_clicks: 5
  clicks_per_round: 2
  round_interval: 1.5
logging:
  level: debug
"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ocr.confidence, 0.8);
        assert_eq!(config.ocr.language, "chi_sim");
        assert!(config.ocr.region.is_none());
        assert_eq!(config.click.click_type, ClickType::Single);
        assert_eq!(config.click.interval(), Duration::from_secs(1));
        assert_eq!(config.click.max_retries, 3);
        assert!(!config.task.enable_schedule);
        assert_eq!(config.quantity.total_clicks, 100);
        assert_eq!(config.quantity.clicks_per_round, 10);
        assert_eq!(config.quantity.round_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.ocr.region, Some(ScreenRegion::new(100, 200, 640, 480)));
        assert_eq!(config.click.click_type, ClickType::Double);
        assert_eq!((config.click.offset_x, config.click.offset_y), (4, -2));
        assert_eq!(config.task.start_time.as_deref(), Some("09:00"));
        assert_eq!(config.quantity.clicks_per_round, 2);
        assert_eq!(config.logging.level, "debug");
        // Untouched fields keep their defaults.
        assert_eq!(config.click.max_retries, 3);
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = AppConfig::parse("  \n").unwrap();
        assert_eq!(config.ocr.confidence, 0.8);
    }

    #[test]
    fn test_partial_section() {
        let config = AppConfig::parse("click:\n  offset_x: 10\n").unwrap();
        assert_eq!(config.click.offset_x, 10);
        assert_eq!(config.click.interval, 1.0);
        assert_eq!(config.ocr.language, "chi_sim");
    }

    #[test]
    fn test_unknown_click_type_falls_back() {
        let config = AppConfig::parse("click:\n  click_type: triple\n").unwrap();
        assert_eq!(config.click.click_type, ClickType::Single);
    }

    #[test]
    fn test_bad_region_rejected() {
        assert!(AppConfig::parse("ocr:\n  region: [0, 0, 0, 10]\n").is_err());
        assert!(AppConfig::parse("ocr:\n  region: [0, 0, 10]\n").is_err());
    }

    #[test]
    fn test_confidence_out_of_range() {
        let config = AppConfig::parse("ocr:\n  confidence: 80\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ocr.confidence", .. }));
    }

    #[test]
    fn test_malformed_time_window() {
        let config = AppConfig::parse("task:\n  start_time: \"9am\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "task.start_time", .. }));
    }

    #[test]
    fn test_cron_shape() {
        assert!(check_cron("* * * * *").is_ok());
        assert!(check_cron("0 */2 * * * * 2030").is_ok());
        assert!(check_cron("* * *").is_err());
    }

    #[test]
    fn test_zero_clicks_per_round() {
        let config = AppConfig::parse("quantity:\n  clicks_per_round: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_interval() {
        let config = AppConfig::parse("click:\n  interval: -1\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_intervals_rejected() {
        let config = AppConfig::parse("quantity:\n  round_interval: 1.8e19\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "quantity.round_interval", .. }
        ));

        let config = AppConfig::parse("click:\n  retry_interval: .inf\n").unwrap();
        assert!(config.validate().is_err());

        assert_eq!(
            seconds("click.interval", MAX_SECONDS).unwrap(),
            Duration::from_secs(86_400)
        );
        assert!(seconds("click.interval", 1e20).is_err());
        assert!(seconds("click.interval", f64::NAN).is_err());
    }

    #[test]
    fn test_parse_hhmm() {
        let t = parse_hhmm("task.start_time", "17:00").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert!(parse_hhmm("task.start_time", "25:00").is_err());
    }
}
