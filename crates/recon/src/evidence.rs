use std::collections::BTreeMap;

use crate::model::{IssueLevel, IssueReport, MatchRecord, MatchSummary, MatchTier};

/// Compute summary statistics from the final matches and issue report.
pub fn compute_summary(
    episodes_in: usize,
    assessments_in: usize,
    matched: &[MatchRecord],
    issues: &IssueReport,
) -> MatchSummary {
    let mut issue_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut errors = 0;
    let mut warnings = 0;

    for issue in issues.iter() {
        *issue_counts.entry(issue.kind.to_string()).or_insert(0) += 1;

        match issue.level {
            IssueLevel::Error => errors += 1,
            IssueLevel::Warning => warnings += 1,
        }
    }

    let matched_tier1 = matched.iter().filter(|r| r.tier == MatchTier::ClientProgram).count();
    let matched_tier2 = matched.iter().filter(|r| r.tier == MatchTier::Client).count();

    MatchSummary {
        episodes_in,
        assessments_in,
        matched_tier1,
        matched_tier2,
        matched_total: matched.len(),
        errors,
        warnings,
        issue_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assessment, CompositeKey, Episode, Issue, IssueKind};
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(tier: MatchTier, row: &str) -> MatchRecord {
        MatchRecord {
            tier,
            key: CompositeKey(vec!["C1".into()]),
            episode: Episode::new("E1", "C1", "P", d("2024-01-01"), d("2024-01-31")).unwrap(),
            assessment: Assessment::new("C1", row, "P", Some(d("2024-01-10"))),
            slack_days: 0,
            original_program: None,
        }
    }

    fn issue(kind: IssueKind, level: IssueLevel) -> Issue {
        Issue::new(kind, level, "C1", "x")
    }

    #[test]
    fn summary_counts() {
        let matched = vec![
            record(MatchTier::ClientProgram, "1"),
            record(MatchTier::ClientProgram, "2"),
            record(MatchTier::Client, "3"),
        ];
        let mut issues = IssueReport::default();
        issues.excluded.push(issue(IssueKind::MissingAssessmentDate, IssueLevel::Error));
        issues.tier1_date_issues.push(issue(IssueKind::AssessmentAfterEpisodeEnd, IssueLevel::Error));
        issues.tier1_date_issues.push(issue(IssueKind::AssessmentAfterEpisodeEnd, IssueLevel::Warning));
        issues.program_corrections.push(issue(IssueKind::ProgramCorrected, IssueLevel::Warning));

        let summary = compute_summary(4, 6, &matched, &issues);
        assert_eq!(summary.episodes_in, 4);
        assert_eq!(summary.assessments_in, 6);
        assert_eq!(summary.matched_tier1, 2);
        assert_eq!(summary.matched_tier2, 1);
        assert_eq!(summary.matched_total, 3);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.warnings, 2);
        assert_eq!(summary.issue_counts["assessment_after_episode_end"], 2);
        assert_eq!(summary.issue_counts["program_corrected"], 1);
        assert!(!summary.issue_counts.contains_key("key_only_in_episodes"));
    }
}
