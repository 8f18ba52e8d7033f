//! `carelink-recon` — Tiered assessment-to-episode reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded episodes and assessments, returns
//! the matched set plus classified data-quality issues. The CSV adapter in
//! [`ingest`] works on text; the crate never touches files except to read a
//! config.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod ingest;
pub mod model;
pub mod reconcile;
pub mod scope;
pub mod slack;

pub use config::MatchConfig;
pub use engine::run;
pub use error::MatchError;
pub use ingest::{load_assessments_csv, load_episodes_csv, Ingested};
pub use model::{
    Assessment, Episode, Issue, IssueKind, IssueLevel, IssueReport, MatchInput, MatchOutcome,
    MatchRecord, MatchTier,
};
