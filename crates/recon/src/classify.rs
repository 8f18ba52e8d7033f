use crate::model::{
    Assessment, BoundaryMiss, BoundarySide, Episode, Issue, IssueKind, IssueLevel, KeySpec,
    MatchRecord,
};

/// Classify unmatched assessments by which boundary they missed.
///
/// The matcher already applied the slack limit; `boundary_limit_days`
/// re-validates the distance: beyond it is an error, within it a warning.
pub fn classify_boundary_issues(unmatched: &[BoundaryMiss], boundary_limit_days: u32) -> Vec<Issue> {
    unmatched
        .iter()
        .map(|miss| {
            let (kind, edge, boundary) = match miss.side {
                BoundarySide::BeforeStart => (
                    IssueKind::AssessmentBeforeEpisodeStart,
                    "before episode start",
                    miss.episode.start(),
                ),
                BoundarySide::AfterEnd => (
                    IssueKind::AssessmentAfterEpisodeEnd,
                    "after episode end",
                    miss.episode.end(),
                ),
            };
            let level = if miss.days_outside > boundary_limit_days {
                IssueLevel::Error
            } else {
                IssueLevel::Warning
            };
            Issue::new(
                kind,
                level,
                miss.assessment.client_key(),
                format!(
                    "assessment is {} days {edge} {boundary} (limit {boundary_limit_days}, {} candidate episode(s))",
                    miss.days_outside, miss.candidate_count
                ),
            )
            .with_assessment(&miss.assessment)
            .with_episode(&miss.episode)
            .with_days_outside(miss.days_outside)
            .in_tier(miss.tier)
        })
        .collect()
}

/// One error per candidate row of each ambiguous assessment, so the audit
/// trail lists every episode it could have matched.
pub fn classify_duplicates(duplicates: &[MatchRecord]) -> Vec<Issue> {
    duplicates
        .iter()
        .map(|r| {
            Issue::new(
                IssueKind::AssessmentMatchedMultipleEpisodes,
                IssueLevel::Error,
                r.assessment.client_key(),
                format!(
                    "assessment matches more than one episode at slack {}; candidate {} ({} to {})",
                    r.slack_days,
                    r.episode.episode_id(),
                    r.episode.start(),
                    r.episode.end()
                ),
            )
            .with_assessment(&r.assessment)
            .with_episode(&r.episode)
            .in_tier(r.tier)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Excluded rows
// ---------------------------------------------------------------------------

pub fn assessment_missing_client_key(assessment: &Assessment) -> Issue {
    Issue::new(
        IssueKind::MissingClientKey,
        IssueLevel::Error,
        "",
        "assessment has no client key; excluded from matching",
    )
    .with_assessment(assessment)
}

pub fn episode_missing_client_key(episode: &Episode) -> Issue {
    Issue::new(
        IssueKind::MissingClientKey,
        IssueLevel::Error,
        "",
        "episode has no client key; excluded from matching",
    )
    .with_episode(episode)
}

pub fn assessment_missing_date(assessment: &Assessment) -> Issue {
    Issue::new(
        IssueKind::MissingAssessmentDate,
        IssueLevel::Error,
        assessment.client_key(),
        "assessment has no date; excluded from matching",
    )
    .with_assessment(assessment)
}

pub fn assessment_missing_program(assessment: &Assessment) -> Issue {
    Issue::new(
        IssueKind::MissingProgram,
        IssueLevel::Error,
        assessment.client_key(),
        "assessment has no program; excluded from matching",
    )
    .with_assessment(assessment)
}

pub fn episode_missing_program(episode: &Episode) -> Issue {
    Issue::new(
        IssueKind::MissingProgram,
        IssueLevel::Error,
        episode.client_key(),
        "episode has no program; excluded from matching",
    )
    .with_episode(episode)
}

// ---------------------------------------------------------------------------
// Key-level mismatches
// ---------------------------------------------------------------------------

pub fn client_only_in_assessments(assessment: &Assessment) -> Issue {
    Issue::new(
        IssueKind::ClientOnlyInAssessments,
        IssueLevel::Error,
        assessment.client_key(),
        "client has assessments but no active episode",
    )
    .with_assessment(assessment)
}

pub fn client_only_in_episodes(episode: &Episode) -> Issue {
    Issue::new(
        IssueKind::ClientOnlyInEpisodes,
        IssueLevel::Warning,
        episode.client_key(),
        format!(
            "client has an active episode ({} to {}) but no assessment",
            episode.start(),
            episode.end()
        ),
    )
    .with_episode(episode)
}

pub fn program_not_recognized(assessment: &Assessment) -> Issue {
    Issue::new(
        IssueKind::ProgramNotRecognized,
        IssueLevel::Warning,
        assessment.client_key(),
        format!("program '{}' has no episodes", assessment.program()),
    )
    .with_assessment(assessment)
}

pub fn key_only_in_assessments(assessment: &Assessment, key_spec: &KeySpec) -> Issue {
    Issue::new(
        IssueKind::KeyOnlyInAssessments,
        IssueLevel::Warning,
        assessment.client_key(),
        format!("no episode shares this assessment's {key_spec} key"),
    )
    .with_assessment(assessment)
}

pub fn key_only_in_episodes(episode: &Episode, key_spec: &KeySpec) -> Issue {
    Issue::new(
        IssueKind::KeyOnlyInEpisodes,
        IssueLevel::Warning,
        episode.client_key(),
        format!("no assessment shares this episode's {key_spec} key"),
    )
    .with_episode(episode)
}

// ---------------------------------------------------------------------------
// Post-processing notes
// ---------------------------------------------------------------------------

pub fn superseded_by_strict_match(record: &MatchRecord) -> Issue {
    Issue::new(
        IssueKind::SupersededByStrictMatch,
        IssueLevel::Warning,
        record.assessment.client_key(),
        format!(
            "episode {} already has a client+program match on this date; relaxed match dropped",
            record.episode.episode_id()
        ),
    )
    .with_assessment(&record.assessment)
    .with_episode(&record.episode)
    .in_tier(record.tier)
}

/// Audit note for a record whose program was overwritten.
pub fn program_corrected(record: &MatchRecord) -> Option<Issue> {
    let original = record.original_program.as_ref()?;
    Some(
        Issue::new(
            IssueKind::ProgramCorrected,
            IssueLevel::Warning,
            record.assessment.client_key(),
            format!(
                "program corrected from '{original}' to '{}'",
                record.episode.program()
            ),
        )
        .with_assessment(&record.assessment)
        .with_episode(&record.episode)
        .in_tier(record.tier),
    )
}

pub fn episode_exceeds_max_duration(episode: &Episode, max_days: u32) -> Issue {
    Issue::new(
        IssueKind::EpisodeExceedsMaxDuration,
        IssueLevel::Warning,
        episode.client_key(),
        format!(
            "episode runs {} days, longer than {max_days}",
            episode.duration_days()
        ),
    )
    .with_episode(episode)
}
