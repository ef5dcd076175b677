//! Windowing configuration.
//!
//! Day counts are read from JSON and converted to `chrono::Duration` at the
//! point of use. Quarantine pairing (events and days together) is checked
//! when the quarantine step is built, since the events come from a loader.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "cohort-windower";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "cohort_windower=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    /// Span before each prediction time whose events feed the window.
    pub lookbehind_days: i64,
    /// Span after each prediction time in which an outcome counts.
    pub lookahead_days: i64,
    /// Days after a quarantine event during which prediction times are dropped.
    #[serde(default)]
    pub quarantine_days: Option<i64>,
    /// Minimum follow-up required before the end of the data.
    #[serde(default)]
    pub min_lookahead_days: Option<i64>,
}

impl WindowConfig {
    pub fn new(lookbehind_days: i64, lookahead_days: i64) -> Self {
        Self {
            lookbehind_days,
            lookahead_days,
            quarantine_days: None,
            min_lookahead_days: None,
        }
    }

    pub fn with_quarantine_days(mut self, days: i64) -> Self {
        self.quarantine_days = Some(days);
        self
    }

    pub fn with_min_lookahead_days(mut self, days: i64) -> Self {
        self.min_lookahead_days = Some(days);
        self
    }

    pub fn lookbehind(&self) -> Duration {
        Duration::days(self.lookbehind_days)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::days(self.lookahead_days)
    }

    pub fn min_lookahead(&self) -> Option<Duration> {
        self.min_lookahead_days.map(Duration::days)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), ?config, "Loaded window config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("lookbehind_days", Some(self.lookbehind_days)),
            ("lookahead_days", Some(self.lookahead_days)),
            ("quarantine_days", self.quarantine_days),
            ("min_lookahead_days", self.min_lookahead_days),
        ];
        for (field, value) in fields {
            if let Some(days) = value {
                if days < 0 {
                    return Err(ConfigError::Invalid {
                        field,
                        reason: format!("must be non-negative, got {days}"),
                    });
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
