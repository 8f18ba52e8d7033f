use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::error::MatchError;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A treatment period for one client.
///
/// Constructed through [`Episode::new`] or [`Episode::with_open_end`], both of
/// which guarantee `start <= end`. The engine never sees a blank end date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Episode {
    episode_id: String,
    client_key: String,
    program: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl Episode {
    pub fn new(
        episode_id: impl Into<String>,
        client_key: impl Into<String>,
        program: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, MatchError> {
        let episode_id = episode_id.into();
        if end < start {
            return Err(MatchError::InvalidEpisode { episode_id, start, end });
        }
        Ok(Self {
            episode_id,
            client_key: client_key.into(),
            program: program.into(),
            start,
            end,
        })
    }

    /// An episode whose end date may still be blank. A missing end is taken
    /// as `as_of`, but never earlier than the start.
    pub fn with_open_end(
        episode_id: impl Into<String>,
        client_key: impl Into<String>,
        program: impl Into<String>,
        start: NaiveDate,
        end: Option<NaiveDate>,
        as_of: NaiveDate,
    ) -> Result<Self, MatchError> {
        let end = end.unwrap_or_else(|| as_of.max(start));
        Self::new(episode_id, client_key, program, start, end)
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// True if `[start, end]` shares at least one day with `[from, to]`.
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start <= to && self.end >= from
    }
}

/// A single clinical assessment event.
///
/// `fields` carries every clinical column the engine does not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    client_key: String,
    assessment_id: String,
    program: String,
    date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, String>,
}

impl Assessment {
    pub fn new(
        client_key: impl Into<String>,
        assessment_id: impl Into<String>,
        program: impl Into<String>,
        date: Option<NaiveDate>,
    ) -> Self {
        Self {
            client_key: client_key.into(),
            assessment_id: assessment_id.into(),
            program: program.into(),
            date,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    /// Copy of this assessment recorded under another program.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    pub fn assessment_id(&self) -> &str {
        &self.assessment_id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn key(&self) -> AssessmentKey {
        AssessmentKey {
            client_key: self.client_key.clone(),
            assessment_id: self.assessment_id.clone(),
        }
    }
}

/// Pre-loaded records for one run.
#[derive(Debug, Clone, Default)]
pub struct MatchInput {
    pub episodes: Vec<Episode>,
    pub assessments: Vec<Assessment>,
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Assessment ids are only unique per client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssessmentKey {
    pub client_key: String,
    pub assessment_id: String,
}

/// Identity of one (episode, assessment) candidate row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey {
    pub episode_id: String,
    pub assessment: AssessmentKey,
}

/// Identity used to drop relaxed-tier matches already made by the strict tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeDayKey {
    pub client_key: String,
    pub episode_id: String,
    pub date: NaiveDate,
}

/// A natural field usable as part of a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyField {
    Client,
    Program,
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Program => write!(f, "program"),
        }
    }
}

/// Ordered, non-empty list of distinct key fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySpec {
    fields: Vec<KeyField>,
}

impl KeySpec {
    pub fn new(fields: Vec<KeyField>) -> Result<Self, MatchError> {
        if fields.is_empty() {
            return Err(MatchError::InvalidKeySpec("at least one key field is required".into()));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].contains(field) {
                return Err(MatchError::InvalidKeySpec(format!("field '{field}' repeated")));
            }
        }
        Ok(Self { fields })
    }

    pub fn client() -> Self {
        Self { fields: vec![KeyField::Client] }
    }

    pub fn client_program() -> Self {
        Self { fields: vec![KeyField::Client, KeyField::Program] }
    }

    pub fn program() -> Self {
        Self { fields: vec![KeyField::Program] }
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn contains(&self, field: KeyField) -> bool {
        self.fields.contains(&field)
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// Field values of a [`KeySpec`], in spec order. Compared structurally;
/// the `_`-joined form is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(pub Vec<String>);

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("_"))
    }
}

impl Serialize for CompositeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Read access to the natural fields a [`KeySpec`] can name.
pub trait Keyed {
    fn key_field(&self, field: KeyField) -> &str;

    fn composite_key(&self, spec: &KeySpec) -> CompositeKey {
        CompositeKey(
            spec.fields()
                .iter()
                .map(|f| self.key_field(*f).to_string())
                .collect(),
        )
    }
}

impl Keyed for Episode {
    fn key_field(&self, field: KeyField) -> &str {
        match field {
            KeyField::Client => &self.client_key,
            KeyField::Program => &self.program,
        }
    }
}

impl Keyed for Assessment {
    fn key_field(&self, field: KeyField) -> &str {
        match field {
            KeyField::Client => &self.client_key,
            KeyField::Program => &self.program,
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Tier 1: client + program.
    ClientProgram,
    /// Tier 2: client only, program corrected afterwards.
    Client,
}

impl MatchTier {
    pub fn key_spec(&self) -> KeySpec {
        match self {
            Self::ClientProgram => KeySpec::client_program(),
            Self::Client => KeySpec::client(),
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientProgram => write!(f, "client_program"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// One row of the inner join between episodes and assessments on a tier key.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub key: CompositeKey,
    pub episode: Episode,
    pub assessment: Assessment,
}

impl CandidatePair {
    pub fn candidate_key(&self) -> CandidateKey {
        CandidateKey {
            episode_id: self.episode.episode_id.clone(),
            assessment: self.assessment.key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub tier: MatchTier,
    pub key: CompositeKey,
    pub episode: Episode,
    pub assessment: Assessment,
    /// Smallest slack at which the assessment date fell inside the episode.
    pub slack_days: u32,
    /// Program the assessment was recorded under before correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_program: Option<String>,
}

impl MatchRecord {
    pub fn from_candidate(pair: &CandidatePair, tier: MatchTier, slack_days: u32) -> Self {
        Self {
            tier,
            key: pair.key.clone(),
            episode: pair.episode.clone(),
            assessment: pair.assessment.clone(),
            slack_days,
            original_program: None,
        }
    }

    /// `None` only for an assessment without a date, which never matches.
    pub fn episode_day_key(&self) -> Option<EpisodeDayKey> {
        self.assessment.date.map(|date| EpisodeDayKey {
            client_key: self.assessment.client_key.clone(),
            episode_id: self.episode.episode_id.clone(),
            date,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySide {
    BeforeStart,
    AfterEnd,
}

/// An assessment that no candidate episode contained, even at maximum slack.
/// Describes the nearest candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryMiss {
    pub tier: MatchTier,
    pub key: CompositeKey,
    pub episode: Episode,
    pub assessment: Assessment,
    pub side: BoundarySide,
    pub days_outside: u32,
    pub candidate_count: usize,
}

#[derive(Debug, Default)]
pub struct DateMatchOutput {
    /// Exactly one row per unambiguously matched assessment.
    pub matched: Vec<MatchRecord>,
    pub unmatched: Vec<BoundaryMiss>,
    /// Every candidate row of each ambiguous assessment.
    pub duplicates: Vec<MatchRecord>,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueLevel {
    Error,
    Warning,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingClientKey,
    MissingAssessmentDate,
    MissingProgram,
    ClientOnlyInAssessments,
    ClientOnlyInEpisodes,
    ProgramNotRecognized,
    KeyOnlyInAssessments,
    KeyOnlyInEpisodes,
    AssessmentBeforeEpisodeStart,
    AssessmentAfterEpisodeEnd,
    AssessmentMatchedMultipleEpisodes,
    SupersededByStrictMatch,
    ProgramCorrected,
    EpisodeExceedsMaxDuration,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingClientKey => "missing_client_key",
            Self::MissingAssessmentDate => "missing_assessment_date",
            Self::MissingProgram => "missing_program",
            Self::ClientOnlyInAssessments => "client_only_in_assessments",
            Self::ClientOnlyInEpisodes => "client_only_in_episodes",
            Self::ProgramNotRecognized => "program_not_recognized",
            Self::KeyOnlyInAssessments => "key_only_in_assessments",
            Self::KeyOnlyInEpisodes => "key_only_in_episodes",
            Self::AssessmentBeforeEpisodeStart => "assessment_before_episode_start",
            Self::AssessmentAfterEpisodeEnd => "assessment_after_episode_end",
            Self::AssessmentMatchedMultipleEpisodes => "assessment_matched_multiple_episodes",
            Self::SupersededByStrictMatch => "superseded_by_strict_match",
            Self::ProgramCorrected => "program_corrected",
            Self::EpisodeExceedsMaxDuration => "episode_exceeds_max_duration",
        };
        write!(f, "{s}")
    }
}

/// A classified data-quality finding. Never re-consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub level: IssueLevel,
    pub client_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_outside: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<MatchTier>,
    pub message: String,
}

impl Issue {
    pub fn new(
        kind: IssueKind,
        level: IssueLevel,
        client_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            level,
            client_key: client_key.into(),
            assessment_id: None,
            episode_id: None,
            program: None,
            date: None,
            days_outside: None,
            tier: None,
            message: message.into(),
        }
    }

    /// Attach the assessment id, program and date.
    pub fn with_assessment(mut self, assessment: &Assessment) -> Self {
        self.assessment_id = Some(assessment.assessment_id.clone());
        self.program = Some(assessment.program.clone());
        self.date = assessment.date;
        self
    }

    /// Attach the episode id; the episode program fills `program` if unset.
    pub fn with_episode(mut self, episode: &Episode) -> Self {
        self.episode_id = Some(episode.episode_id.clone());
        if self.program.is_none() {
            self.program = Some(episode.program.clone());
        }
        self
    }

    pub fn in_tier(mut self, tier: MatchTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_days_outside(mut self, days: u32) -> Self {
        self.days_outside = Some(days);
        self
    }

    pub fn assessment_key(&self) -> Option<AssessmentKey> {
        self.assessment_id.as_ref().map(|id| AssessmentKey {
            client_key: self.client_key.clone(),
            assessment_id: id.clone(),
        })
    }
}

/// Issue tables, one per category, in pipeline order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueReport {
    pub excluded: Vec<Issue>,
    pub clients_only_in_assessments: Vec<Issue>,
    pub clients_only_in_episodes: Vec<Issue>,
    pub episode_warnings: Vec<Issue>,
    pub programs_not_recognized: Vec<Issue>,
    pub key_only_in_assessments: Vec<Issue>,
    pub key_only_in_episodes: Vec<Issue>,
    pub tier1_date_issues: Vec<Issue>,
    pub tier2_date_issues: Vec<Issue>,
    pub superseded: Vec<Issue>,
    pub program_corrections: Vec<Issue>,
}

impl IssueReport {
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.excluded
            .iter()
            .chain(&self.clients_only_in_assessments)
            .chain(&self.clients_only_in_episodes)
            .chain(&self.episode_warnings)
            .chain(&self.programs_not_recognized)
            .chain(&self.key_only_in_assessments)
            .chain(&self.key_only_in_episodes)
            .chain(&self.tier1_date_issues)
            .chain(&self.tier2_date_issues)
            .chain(&self.superseded)
            .chain(&self.program_corrections)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.iter().filter(move |i| i.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchSummary {
    pub episodes_in: usize,
    pub assessments_in: usize,
    pub matched_tier1: usize,
    pub matched_tier2: usize,
    pub matched_total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub issue_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub max_slack_days: u32,
    pub boundary_limit_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub meta: MatchMeta,
    pub summary: MatchSummary,
    pub matched: Vec<MatchRecord>,
    pub issues: IssueReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn episode_rejects_inverted_dates() {
        let err = Episode::new("E1", "C1", "P", d("2024-02-01"), d("2024-01-31")).unwrap_err();
        assert!(err.to_string().contains("before start"));
    }

    #[test]
    fn open_end_defaults_to_as_of() {
        let ep = Episode::with_open_end("E1", "C1", "P", d("2024-01-01"), None, d("2024-06-30"))
            .unwrap();
        assert_eq!(ep.end(), d("2024-06-30"));

        // Starts after as_of: still a valid single-day interval.
        let ep = Episode::with_open_end("E2", "C1", "P", d("2024-07-10"), None, d("2024-06-30"))
            .unwrap();
        assert_eq!(ep.end(), d("2024-07-10"));
    }

    #[test]
    fn key_spec_validation() {
        assert!(KeySpec::new(vec![]).is_err());
        let err = KeySpec::new(vec![KeyField::Client, KeyField::Client]).unwrap_err();
        assert!(err.to_string().contains("repeated"));
        let spec = KeySpec::new(vec![KeyField::Program, KeyField::Client]).unwrap();
        assert_eq!(spec.to_string(), "program+client");
    }

    #[test]
    fn composite_key_is_structural() {
        // "A_B"+"C" and "A"+"B_C" display the same but never compare equal.
        let left = Assessment::new("A_B", "1", "C", None);
        let right = Assessment::new("A", "1", "B_C", None);
        let spec = KeySpec::client_program();
        assert_eq!(left.composite_key(&spec).to_string(), right.composite_key(&spec).to_string());
        assert_ne!(left.composite_key(&spec), right.composite_key(&spec));
    }

    #[test]
    fn overlap_is_inclusive() {
        let ep = Episode::new("E1", "C1", "P", d("2024-01-10"), d("2024-01-20")).unwrap();
        assert!(ep.overlaps(d("2024-01-20"), d("2024-02-01")));
        assert!(ep.overlaps(d("2024-01-01"), d("2024-01-10")));
        assert!(!ep.overlaps(d("2024-01-21"), d("2024-02-01")));
    }

    #[test]
    fn issue_builder_prefers_assessment_program() {
        let ep = Episode::new("E1", "C1", "P", d("2024-01-01"), d("2024-01-31")).unwrap();
        let asmt = Assessment::new("C1", "R1", "Q", Some(d("2024-01-15")));
        let issue = Issue::new(IssueKind::ProgramCorrected, IssueLevel::Warning, "C1", "x")
            .with_assessment(&asmt)
            .with_episode(&ep);
        assert_eq!(issue.program.as_deref(), Some("Q"));
        assert_eq!(issue.episode_id.as_deref(), Some("E1"));
        assert_eq!(issue.date, Some(d("2024-01-15")));
    }
}
