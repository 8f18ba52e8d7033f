use std::fmt;

use chrono::NaiveDate;

#[derive(Debug)]
pub enum MatchError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (inverted period, limit below slack, etc.).
    ConfigValidation(String),
    /// Key-field list is empty or repeats a field.
    InvalidKeySpec(String),
    /// Missing required column in input data.
    MissingColumn { source: String, column: String },
    /// Date parse error.
    DateParse { source: String, record_id: String, value: String },
    /// Episode ends before it starts.
    InvalidEpisode { episode_id: String, start: NaiveDate, end: NaiveDate },
    /// IO error (config file read, CSV reader, etc.).
    Io(String),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidKeySpec(msg) => write!(f, "invalid key fields: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "{source}: missing column '{column}'")
            }
            Self::DateParse { source, record_id, value } => {
                write!(f, "{source}, record '{record_id}': cannot parse date '{value}'")
            }
            Self::InvalidEpisode { episode_id, start, end } => {
                write!(f, "episode '{episode_id}': end {end} is before start {start}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for MatchError {}
