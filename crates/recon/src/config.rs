use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::MatchError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    pub name: String,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub period: Option<PeriodConfig>,
    #[serde(default)]
    pub episodes: EpisodeRules,
    #[serde(default)]
    pub columns: ColumnsConfig,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Upper bound of the increasing-slack loop.
    #[serde(default = "default_max_slack_days")]
    pub max_slack_days: u32,
    /// Threshold the issue classifier re-validates boundary misses against.
    /// Defaults to `max_slack_days`.
    #[serde(default)]
    pub boundary_limit_days: Option<u32>,
}

fn default_max_slack_days() -> u32 {
    7
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_slack_days: default_max_slack_days(),
            boundary_limit_days: None,
        }
    }
}

impl MatchingConfig {
    pub fn boundary_limit_days(&self) -> u32 {
        self.boundary_limit_days.unwrap_or(self.max_slack_days)
    }
}

// ---------------------------------------------------------------------------
// Reporting period + episode rules
// ---------------------------------------------------------------------------

/// Reporting window. Episodes are in scope if active on any day of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeriodConfig {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EpisodeRules {
    /// Warn about in-scope episodes longer than this many days.
    #[serde(default)]
    pub max_duration_days: Option<u32>,
}

// ---------------------------------------------------------------------------
// Column mapping (CSV ingestion)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnsConfig {
    pub date_format: String,
    pub episodes: EpisodeColumns,
    pub assessments: AssessmentColumns,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".into(),
            episodes: EpisodeColumns::default(),
            assessments: AssessmentColumns::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpisodeColumns {
    pub episode_id: String,
    pub client_key: String,
    pub program: String,
    pub start: String,
    pub end: String,
}

impl Default for EpisodeColumns {
    fn default() -> Self {
        Self {
            episode_id: "PMSEpisodeID".into(),
            client_key: "SLK".into(),
            program: "Program".into(),
            start: "CommencementDate".into(),
            end: "EndDate".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssessmentColumns {
    pub assessment_id: String,
    pub client_key: String,
    pub program: String,
    pub date: String,
}

impl Default for AssessmentColumns {
    fn default() -> Self {
        Self {
            assessment_id: "RowKey".into(),
            client_key: "SLK".into(),
            program: "Program".into(),
            date: "AssessmentDate".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MatchConfig {
    /// Defaults for everything but the run name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matching: MatchingConfig::default(),
            period: None,
            episodes: EpisodeRules::default(),
            columns: ColumnsConfig::default(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, MatchError> {
        let config: MatchConfig =
            toml::from_str(input).map_err(|e| MatchError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, MatchError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| MatchError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.name.trim().is_empty() {
            return Err(MatchError::ConfigValidation("name must not be empty".into()));
        }

        // Slack loop runs once per day of tolerance
        if self.matching.max_slack_days > 366 {
            return Err(MatchError::ConfigValidation(format!(
                "max_slack_days must be at most 366, got {}",
                self.matching.max_slack_days
            )));
        }

        if self.matching.boundary_limit_days() < self.matching.max_slack_days {
            return Err(MatchError::ConfigValidation(format!(
                "boundary_limit_days ({}) must not be below max_slack_days ({})",
                self.matching.boundary_limit_days(),
                self.matching.max_slack_days
            )));
        }

        if let Some(period) = &self.period {
            if period.end < period.start {
                return Err(MatchError::ConfigValidation(format!(
                    "period end {} is before start {}",
                    period.end, period.start
                )));
            }
        }

        if self.columns.date_format.is_empty() {
            return Err(MatchError::ConfigValidation("date_format must not be empty".into()));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
