//! Increasing-slack date matching.
//!
//! For each assessment, candidate episodes are tested for containment of the
//! assessment date in `[start - slack, end + slack]`, with slack growing from
//! 0 to `max_slack_days`. The first slack level with any containment decides:
//! - one containing episode: matched at that slack
//! - two or more: ambiguous, every candidate row goes to `duplicates`
//! - none up to the maximum: unmatched, annotated with the nearest miss

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::model::{
    AssessmentKey, BoundaryMiss, BoundarySide, CandidatePair, DateMatchOutput, Episode,
    MatchRecord, MatchTier,
};

/// How far `date` lies outside the episode interval, or `None` if inside.
pub fn days_outside(episode: &Episode, date: NaiveDate) -> Option<(BoundarySide, u32)> {
    let (side, days) = if date < episode.start() {
        (BoundarySide::BeforeStart, (episode.start() - date).num_days())
    } else if date > episode.end() {
        (BoundarySide::AfterEnd, (date - episode.end()).num_days())
    } else {
        return None;
    };
    Some((side, u32::try_from(days).unwrap_or(u32::MAX)))
}

/// Interval containment with `slack_days` of tolerance on both ends.
pub fn contains(episode: &Episode, date: NaiveDate, slack_days: u32) -> bool {
    match days_outside(episode, date) {
        None => true,
        Some((_, days)) => days <= slack_days,
    }
}

enum Resolution<'a> {
    Single(&'a CandidatePair, u32),
    Ambiguous(u32),
    Unmatched,
}

fn resolve<'a>(rows: &[&'a CandidatePair], date: NaiveDate, max_slack_days: u32) -> Resolution<'a> {
    for slack in 0..=max_slack_days {
        let mut contained = rows.iter().filter(|r| contains(&r.episode, date, slack));
        match (contained.next(), contained.next()) {
            (None, _) => continue,
            (Some(row), None) => return Resolution::Single(*row, slack),
            (Some(_), Some(_)) => return Resolution::Ambiguous(slack),
        }
    }
    Resolution::Unmatched
}

/// Nearest candidate by distance outside its interval; first one wins ties.
fn nearest_miss(rows: &[&CandidatePair], date: NaiveDate, tier: MatchTier) -> Option<BoundaryMiss> {
    rows.iter()
        .filter_map(|r| days_outside(&r.episode, date).map(|(side, days)| (r, side, days)))
        .min_by_key(|(_, _, days)| *days)
        .map(|(r, side, days)| BoundaryMiss {
            tier,
            key: r.key.clone(),
            episode: r.episode.clone(),
            assessment: r.assessment.clone(),
            side,
            days_outside: days,
            candidate_count: rows.len(),
        })
}

/// Match candidate rows of one tier by assessment date.
///
/// Candidate rows repeating an (episode, assessment) identity are ignored
/// after the first. Assessments without a date produce no output at all;
/// callers exclude and report them before matching.
pub fn match_dates(candidates: &[CandidatePair], tier: MatchTier, max_slack_days: u32) -> DateMatchOutput {
    let mut seen = BTreeSet::new();
    let mut by_assessment: BTreeMap<AssessmentKey, Vec<&CandidatePair>> = BTreeMap::new();
    for pair in candidates {
        if !seen.insert(pair.candidate_key()) {
            log::debug!("skipping repeated candidate {:?}", pair.candidate_key());
            continue;
        }
        by_assessment.entry(pair.assessment.key()).or_default().push(pair);
    }

    let mut out = DateMatchOutput::default();

    for (key, rows) in &by_assessment {
        let Some(date) = rows[0].assessment.date() else {
            continue;
        };

        match resolve(rows, date, max_slack_days) {
            Resolution::Single(row, slack) => {
                log::debug!(
                    "{tier}: {}/{} matched episode {} at slack {slack}",
                    key.client_key,
                    key.assessment_id,
                    row.episode.episode_id()
                );
                out.matched.push(MatchRecord::from_candidate(row, tier, slack));
            }
            Resolution::Ambiguous(slack) => {
                log::debug!(
                    "{tier}: {}/{} ambiguous at slack {slack} across {} candidates",
                    key.client_key,
                    key.assessment_id,
                    rows.len()
                );
                out.duplicates
                    .extend(rows.iter().map(|r| MatchRecord::from_candidate(r, tier, slack)));
            }
            Resolution::Unmatched => {
                if let Some(miss) = nearest_miss(rows, date, tier) {
                    out.unmatched.push(miss);
                }
            }
        }
    }

    log::info!(
        "{tier}: date matching over {} assessments: {} matched, {} unmatched, {} duplicate rows",
        by_assessment.len(),
        out.matched.len(),
        out.unmatched.len(),
        out.duplicates.len()
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assessment, CompositeKey};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn pair(ep_id: &str, start: &str, end: &str, row: &str, date: &str) -> CandidatePair {
        CandidatePair {
            key: CompositeKey(vec!["C1".into(), "P".into()]),
            episode: Episode::new(ep_id, "C1", "P", d(start), d(end)).unwrap(),
            assessment: Assessment::new("C1", row, "P", Some(d(date))),
        }
    }

    #[test]
    fn inside_matches_at_zero_slack() {
        let cands = vec![pair("E1", "2024-01-01", "2024-03-31", "R1", "2024-02-15")];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert_eq!(out.matched.len(), 1);
        assert_eq!(out.matched[0].slack_days, 0);
        assert!(out.unmatched.is_empty());
        assert!(out.duplicates.is_empty());
    }

    #[test]
    fn single_day_episode_matches_same_day() {
        let cands = vec![pair("E1", "2024-01-10", "2024-01-10", "R1", "2024-01-10")];
        let out = match_dates(&cands, MatchTier::ClientProgram, 0);
        assert_eq!(out.matched.len(), 1);
        assert_eq!(out.matched[0].slack_days, 0);
    }

    #[test]
    fn reports_minimum_slack() {
        // 3 days after end
        let cands = vec![pair("E1", "2024-01-01", "2024-01-31", "R1", "2024-02-03")];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert_eq!(out.matched.len(), 1);
        assert_eq!(out.matched[0].slack_days, 3);
    }

    #[test]
    fn beyond_max_slack_is_unmatched_with_distance() {
        let cands = vec![pair("E1", "2024-03-01", "2024-05-31", "R1", "2024-01-21")];
        let out = match_dates(&cands, MatchTier::ClientProgram, 30);
        assert!(out.matched.is_empty());
        assert_eq!(out.unmatched.len(), 1);
        assert_eq!(out.unmatched[0].side, BoundarySide::BeforeStart);
        assert_eq!(out.unmatched[0].days_outside, 40);
        assert_eq!(out.unmatched[0].candidate_count, 1);
    }

    #[test]
    fn overlapping_episodes_are_duplicates() {
        let cands = vec![
            pair("E1", "2024-01-01", "2024-02-28", "R1", "2024-02-10"),
            pair("E2", "2024-02-01", "2024-03-31", "R1", "2024-02-10"),
        ];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert!(out.matched.is_empty());
        assert_eq!(out.duplicates.len(), 2);
        assert!(out.duplicates.iter().all(|r| r.slack_days == 0));
    }

    #[test]
    fn smaller_slack_wins_over_larger() {
        // E1 contains at slack 0, E2 only at slack 5.
        let cands = vec![
            pair("E2", "2024-02-15", "2024-03-31", "R1", "2024-02-10"),
            pair("E1", "2024-01-01", "2024-02-10", "R1", "2024-02-10"),
        ];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert_eq!(out.matched.len(), 1);
        assert_eq!(out.matched[0].episode.episode_id(), "E1");
        assert!(out.duplicates.is_empty());
    }

    #[test]
    fn same_slack_outside_both_is_duplicate() {
        // Gap between episodes; assessment 2 days from each.
        let cands = vec![
            pair("E1", "2024-01-01", "2024-01-31", "R1", "2024-02-02"),
            pair("E2", "2024-02-04", "2024-02-28", "R1", "2024-02-02"),
        ];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert!(out.matched.is_empty());
        assert_eq!(out.duplicates.len(), 2);
        assert!(out.duplicates.iter().all(|r| r.slack_days == 2));
    }

    #[test]
    fn duplicates_include_non_containing_candidates() {
        let cands = vec![
            pair("E1", "2024-01-01", "2024-02-28", "R1", "2024-02-10"),
            pair("E2", "2024-02-01", "2024-03-31", "R1", "2024-02-10"),
            pair("E3", "2024-06-01", "2024-06-30", "R1", "2024-02-10"),
        ];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert_eq!(out.duplicates.len(), 3);
    }

    #[test]
    fn nearest_miss_is_reported() {
        let cands = vec![
            pair("E1", "2024-05-01", "2024-05-31", "R1", "2024-01-01"),
            pair("E2", "2023-10-01", "2023-11-30", "R1", "2024-01-01"),
        ];
        let out = match_dates(&cands, MatchTier::ClientProgram, 7);
        assert_eq!(out.unmatched.len(), 1);
        assert_eq!(out.unmatched[0].episode.episode_id(), "E2");
        assert_eq!(out.unmatched[0].side, BoundarySide::AfterEnd);
        assert_eq!(out.unmatched[0].days_outside, 32);
        assert_eq!(out.unmatched[0].candidate_count, 2);
    }

    #[test]
    fn missing_date_produces_nothing() {
        let mut p = pair("E1", "2024-01-01", "2024-03-31", "R1", "2024-02-15");
        p.assessment = Assessment::new("C1", "R1", "P", None);
        let out = match_dates(&[p], MatchTier::ClientProgram, 7);
        assert!(out.matched.is_empty());
        assert!(out.unmatched.is_empty());
        assert!(out.duplicates.is_empty());
    }

    #[test]
    fn repeated_candidate_rows_count_once() {
        let p = pair("E1", "2024-01-01", "2024-03-31", "R1", "2024-02-15");
        let out = match_dates(&[p.clone(), p], MatchTier::ClientProgram, 7);
        assert_eq!(out.matched.len(), 1);
        assert!(out.duplicates.is_empty());
    }

    #[test]
    fn containment_is_monotonic_in_slack() {
        let ep = Episode::new("E1", "C1", "P", d("2024-01-10"), d("2024-01-20")).unwrap();
        let date = d("2024-01-05");
        assert!(!contains(&ep, date, 4));
        for slack in 5..20 {
            assert!(contains(&ep, date, slack));
        }
    }
}
