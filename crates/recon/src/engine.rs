use std::collections::BTreeSet;

use crate::classify::{
    self, classify_boundary_issues, classify_duplicates, key_only_in_assessments,
    key_only_in_episodes,
};
use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::evidence::compute_summary;
use crate::model::{
    Assessment, AssessmentKey, DateMatchOutput, Episode, EpisodeDayKey, Issue, IssueReport,
    KeyField, MatchInput, MatchMeta, MatchOutcome, MatchRecord, MatchTier,
};
use crate::reconcile::{inner_join, reconcile, Partition};
use crate::scope::{exclude_unmatchable, filter_by_episode_programs, partition_clients, window_to_period};
use crate::slack::match_dates;

/// Run both tiers per config. Returns the final matched set, every issue
/// table and a summary.
pub fn run(config: &MatchConfig, input: &MatchInput) -> Result<MatchOutcome, MatchError> {
    config.validate()?;

    let mut issues = IssueReport::default();
    let matched = if input.episodes.is_empty() || input.assessments.is_empty() {
        log::info!(
            "nothing to match: {} episodes, {} assessments",
            input.episodes.len(),
            input.assessments.len()
        );
        Vec::new()
    } else {
        match_all(config, input, &mut issues)
    };

    let summary = compute_summary(input.episodes.len(), input.assessments.len(), &matched, &issues);
    log::info!(
        "{}: matched {} (tier 1: {}, tier 2: {}), {} errors, {} warnings",
        config.name,
        summary.matched_total,
        summary.matched_tier1,
        summary.matched_tier2,
        summary.errors,
        summary.warnings
    );

    Ok(MatchOutcome {
        meta: MatchMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            max_slack_days: config.matching.max_slack_days,
            boundary_limit_days: config.matching.boundary_limit_days(),
        },
        summary,
        matched,
        issues,
    })
}

fn match_all(config: &MatchConfig, input: &MatchInput, issues: &mut IssueReport) -> Vec<MatchRecord> {
    let max_slack = config.matching.max_slack_days;
    let limit = config.matching.boundary_limit_days();

    let excluded = exclude_unmatchable(&input.episodes, &input.assessments);
    issues.excluded = excluded.issues;

    let windowed = window_to_period(
        excluded.episodes,
        excluded.assessments,
        config.period.as_ref(),
        max_slack,
        config.episodes.max_duration_days,
    );
    issues.episode_warnings = windowed.long_episodes;
    if windowed.episodes.is_empty() || windowed.assessments.is_empty() {
        log::info!(
            "nothing in scope: {} episodes, {} assessments",
            windowed.episodes.len(),
            windowed.assessments.len()
        );
        return Vec::new();
    }

    let clients = partition_clients(&windowed.episodes, &windowed.assessments, config.period.as_ref());
    issues.clients_only_in_assessments = clients.only_in_assessments;
    issues.clients_only_in_episodes = clients.only_in_episodes;

    let (recognized, unrecognized) = filter_by_episode_programs(&clients.episodes, &clients.assessments);
    issues.programs_not_recognized = unrecognized;

    // Tier 1
    let strict = run_tier(MatchTier::ClientProgram, &clients.episodes, &recognized, max_slack);

    // Everything tier 1 did not match is retried, ambiguous assessments included.
    let strict_keys: BTreeSet<AssessmentKey> =
        strict.dates.matched.iter().map(|r| r.assessment.key()).collect();
    let leftover: Vec<Assessment> = recognized
        .into_iter()
        .filter(|a| !strict_keys.contains(&a.key()))
        .collect();

    // Tier 2
    let relaxed = run_tier(MatchTier::Client, &clients.episodes, &leftover, max_slack);
    issues.tier2_date_issues = date_issues(&relaxed.dates, limit);

    let (relaxed_matched, superseded) = drop_superseded(&strict.dates.matched, relaxed.dates.matched);
    issues.superseded = superseded;

    let corrected: Vec<MatchRecord> = relaxed_matched.into_iter().map(correct_program).collect();
    issues.program_corrections = corrected.iter().filter_map(classify::program_corrected).collect();

    // Tier-1 findings for assessments and episodes that tier 2 resolved are
    // stale by now.
    let resolved: BTreeSet<AssessmentKey> = corrected.iter().map(|r| r.assessment.key()).collect();
    let resolved_episodes: BTreeSet<&str> = corrected.iter().map(|r| r.episode.episode_id()).collect();
    let unresolved = |issue: &Issue| !issue.assessment_key().is_some_and(|k| resolved.contains(&k));

    let key_spec = &strict.partition.key_spec;
    issues.key_only_in_assessments = strict
        .partition
        .right_only
        .iter()
        .map(|a| key_only_in_assessments(a, key_spec))
        .filter(unresolved)
        .collect();
    issues.key_only_in_episodes = strict
        .partition
        .left_only
        .iter()
        .filter(|e| !resolved_episodes.contains(e.episode_id()))
        .map(|e| key_only_in_episodes(e, key_spec))
        .collect();
    issues.tier1_date_issues = date_issues(&strict.dates, limit)
        .into_iter()
        .filter(unresolved)
        .collect();

    let mut matched = strict.dates.matched;
    matched.extend(corrected);
    matched.sort_by(|a, b| {
        (a.assessment.client_key(), a.assessment.assessment_id())
            .cmp(&(b.assessment.client_key(), b.assessment.assessment_id()))
    });
    matched
}

struct TierRun {
    partition: Partition<Episode, Assessment>,
    dates: DateMatchOutput,
}

/// Reconcile, join and date-match one tier. A tier whose key omits the
/// program only considers pairs whose programs differ; same-program pairs
/// belong to the strict tier.
fn run_tier(tier: MatchTier, episodes: &[Episode], assessments: &[Assessment], max_slack: u32) -> TierRun {
    let key_spec = tier.key_spec();
    let partition = reconcile(episodes, assessments, &key_spec);

    let mut candidates = inner_join(&partition.left_in_both, &partition.right_in_both, &key_spec);
    if !key_spec.contains(KeyField::Program) {
        candidates.retain(|c| c.assessment.program() != c.episode.program());
    }
    log::info!("{tier}: {} candidate rows", candidates.len());

    let dates = match_dates(&candidates, tier, max_slack);
    TierRun { partition, dates }
}

fn date_issues(dates: &DateMatchOutput, boundary_limit_days: u32) -> Vec<Issue> {
    let mut issues = classify_boundary_issues(&dates.unmatched, boundary_limit_days);
    issues.extend(classify_duplicates(&dates.duplicates));
    issues
}

/// Remove relaxed matches whose (client, episode, date) the strict tier
/// already matched.
pub fn drop_superseded(
    strict: &[MatchRecord],
    relaxed: Vec<MatchRecord>,
) -> (Vec<MatchRecord>, Vec<Issue>) {
    let taken: BTreeSet<EpisodeDayKey> = strict.iter().filter_map(MatchRecord::episode_day_key).collect();

    let mut kept = Vec::with_capacity(relaxed.len());
    let mut superseded = Vec::new();
    for record in relaxed {
        if record.episode_day_key().is_some_and(|k| taken.contains(&k)) {
            superseded.push(classify::superseded_by_strict_match(&record));
        } else {
            kept.push(record);
        }
    }

    if !superseded.is_empty() {
        log::info!("dropped {} relaxed matches already made by the strict tier", superseded.len());
    }
    (kept, superseded)
}

/// Overwrite the assessment's program with the matched episode's, keeping
/// the first original. Applying it twice changes nothing.
pub fn correct_program(mut record: MatchRecord) -> MatchRecord {
    if record.assessment.program() != record.episode.program() {
        if record.original_program.is_none() {
            record.original_program = Some(record.assessment.program().to_string());
        }
        let program = record.episode.program().to_string();
        record.assessment = record.assessment.with_program(program);
    }
    record
}
