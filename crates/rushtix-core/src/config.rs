//! Run configuration and timing knobs.
//!
//! [`RunConfig`] is the user-facing JSON file describing one grab attempt:
//! what to search for, which city and date, the on-sale deadline, and who the
//! tickets are for. It is loaded and validated before any session opens;
//! validation failures are fatal and never retried.
//!
//! [`Timings`] collects every delay and timeout the engine uses. The original
//! tool shared a single global delay constant across all call sites; here each
//! operation gets an explicit knob passed down through the components.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration problems, surfaced before any session opens.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One grab attempt, as described by the user's JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Automation server endpoint, e.g. `http://127.0.0.1:4723`.
    pub server_url: String,
    /// Search keyword, typically the performer's name.
    pub keyword: String,
    /// Attendee names, in the order their checkboxes should be tapped.
    /// Also determines the requested ticket quantity.
    pub users: Vec<String>,
    /// Target city shown on the detail surface.
    pub city: String,
    /// Target show date, `YYYY-MM-DD`.
    pub date: String,
    /// On-sale deadline, `HH:MM:SS` local wall-clock time.
    pub time: String,
    /// Preferred price tier label, e.g. `"699"`.
    pub price: String,
    /// Index into the available tier list when the label is not found.
    pub price_index: usize,
    /// When false, every stage runs except the final order submission.
    pub if_commit_order: bool,
}

impl RunConfig {
    /// Load and validate a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let config: RunConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url is empty".to_string()));
        }
        if self.keyword.trim().is_empty() {
            return Err(ConfigError::Invalid("keyword is empty".to_string()));
        }
        if self.users.is_empty() {
            return Err(ConfigError::Invalid(
                "users must list at least one attendee".to_string(),
            ));
        }
        self.deadline()?;
        Ok(())
    }

    /// The on-sale deadline parsed from the `time` field.
    pub fn deadline(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.time, "%H:%M:%S").map_err(|e| {
            ConfigError::Invalid(format!("time must be HH:MM:SS, got {:?}: {e}", self.time))
        })
    }

    /// Requested ticket quantity: one per attendee.
    pub fn quantity(&self) -> usize {
        self.users.len()
    }
}

/// Per-operation delays and timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Budget per locator candidate while resolving.
    pub locate_timeout: Duration,
    /// Budget per interaction technique in the action cascade.
    pub technique_timeout: Duration,
    /// Sleep between deadline polls.
    pub poll_interval: Duration,
    /// Pause between consecutive taps in a batch or a navigation fallback.
    pub inter_action_delay: Duration,
    /// Touch hold duration for coordinate taps.
    pub tap_duration: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            locate_timeout: Duration::from_millis(1500),
            technique_timeout: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(10),
            inter_action_delay: Duration::from_millis(50),
            tap_duration: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> RunConfig {
        RunConfig {
            server_url: "http://127.0.0.1:4723".to_string(),
            keyword: "刘若英".to_string(),
            users: vec!["张三".to_string(), "李四".to_string()],
            city: "上海".to_string(),
            date: "2025-11-01".to_string(),
            time: "12:00:00".to_string(),
            price: "699".to_string(),
            price_index: 0,
            if_commit_order: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
        assert_eq!(sample().quantity(), 2);
    }

    #[test]
    fn deadline_parses() {
        let t = sample().deadline().unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn rejects_empty_keyword() {
        let mut config = sample();
        config.keyword = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_no_users() {
        let mut config = sample();
        config.users.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_time() {
        let mut config = sample();
        config.time = "noon".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_round_trips_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&sample()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = RunConfig::load(file.path()).unwrap();
        assert_eq!(loaded.keyword, "刘若英");
        assert_eq!(loaded.users.len(), 2);
        assert!(!loaded.if_commit_order);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = RunConfig::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn default_timings_are_sub_second() {
        let timings = Timings::default();
        assert!(timings.poll_interval < timings.inter_action_delay);
        assert!(timings.inter_action_delay < timings.locate_timeout);
    }
}
