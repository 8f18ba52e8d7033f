//! Pre-tier filters: rows that cannot be matched, the reporting window,
//! clients missing on one side, and programs no episode carries.

use chrono::{Duration, NaiveDate};

use crate::classify;
use crate::config::PeriodConfig;
use crate::model::{Assessment, Episode, Issue, KeySpec};
use crate::reconcile::reconcile;

/// Rows safe to match, plus issues for those removed.
#[derive(Debug, Default)]
pub struct Exclusions {
    pub episodes: Vec<Episode>,
    pub assessments: Vec<Assessment>,
    pub issues: Vec<Issue>,
}

/// Remove rows with a blank client key, a blank program or no assessment
/// date. A blank join key must never pair with another blank key.
pub fn exclude_unmatchable(episodes: &[Episode], assessments: &[Assessment]) -> Exclusions {
    let mut out = Exclusions::default();

    for ep in episodes {
        if ep.client_key().trim().is_empty() {
            out.issues.push(classify::episode_missing_client_key(ep));
        } else if ep.program().trim().is_empty() {
            out.issues.push(classify::episode_missing_program(ep));
        } else {
            out.episodes.push(ep.clone());
        }
    }

    for asmt in assessments {
        if asmt.client_key().trim().is_empty() {
            out.issues.push(classify::assessment_missing_client_key(asmt));
        } else if asmt.program().trim().is_empty() {
            out.issues.push(classify::assessment_missing_program(asmt));
        } else if asmt.date().is_none() {
            out.issues.push(classify::assessment_missing_date(asmt));
        } else {
            out.assessments.push(asmt.clone());
        }
    }

    if !out.issues.is_empty() {
        log::info!("excluded {} rows without a client key, program or date", out.issues.len());
    }
    out
}

/// Episodes and assessments inside the reporting window.
#[derive(Debug, Default)]
pub struct Windowed {
    pub episodes: Vec<Episode>,
    pub assessments: Vec<Assessment>,
    pub long_episodes: Vec<Issue>,
}

/// Keep episodes active in `period` and assessments dated from the earliest
/// such episode start (less `max_slack_days`) to the end of the period.
///
/// Assessments before the period are kept so an episode that started
/// earlier can still find its intake assessment.
pub fn window_to_period(
    episodes: Vec<Episode>,
    assessments: Vec<Assessment>,
    period: Option<&PeriodConfig>,
    max_slack_days: u32,
    max_duration_days: Option<u32>,
) -> Windowed {
    let (episodes, assessments) = match period {
        None => (episodes, assessments),
        Some(period) => {
            let active: Vec<Episode> = episodes
                .into_iter()
                .filter(|e| e.overlaps(period.start, period.end))
                .collect();

            let earliest = active.iter().map(Episode::start).min().unwrap_or(period.start);
            let from = earliest
                .checked_sub_signed(Duration::days(i64::from(max_slack_days)))
                .unwrap_or(NaiveDate::MIN);

            let in_window: Vec<Assessment> = assessments
                .into_iter()
                .filter(|a| a.date().is_some_and(|d| from <= d && d <= period.end))
                .collect();

            log::info!(
                "period {} to {}: {} active episodes, {} assessments from {from}",
                period.start,
                period.end,
                active.len(),
                in_window.len()
            );
            (active, in_window)
        }
    };

    let long_episodes = match max_duration_days {
        Some(max) => episodes
            .iter()
            .filter(|e| e.duration_days() > i64::from(max))
            .map(|e| classify::episode_exceeds_max_duration(e, max))
            .collect(),
        None => Vec::new(),
    };

    Windowed {
        episodes,
        assessments,
        long_episodes,
    }
}

/// Result of the client-level partition.
#[derive(Debug, Default)]
pub struct ClientPartition {
    pub episodes: Vec<Episode>,
    pub assessments: Vec<Assessment>,
    pub only_in_assessments: Vec<Issue>,
    pub only_in_episodes: Vec<Issue>,
}

/// Split by client key. Clients seen on one side only are reported;
/// assessments are reported only when dated inside `period` (if any).
pub fn partition_clients(
    episodes: &[Episode],
    assessments: &[Assessment],
    period: Option<&PeriodConfig>,
) -> ClientPartition {
    let part = reconcile(episodes, assessments, &KeySpec::client());

    let only_in_assessments: Vec<Issue> = part
        .right_only
        .iter()
        .filter(|a| match (period, a.date()) {
            (Some(p), Some(d)) => p.contains(d),
            _ => true,
        })
        .map(classify::client_only_in_assessments)
        .collect();
    let only_in_episodes: Vec<Issue> =
        part.left_only.iter().map(classify::client_only_in_episodes).collect();

    log::info!(
        "clients: {} assessments without an episode ({} reported), {} episodes without an assessment",
        part.right_only.len(),
        only_in_assessments.len(),
        only_in_episodes.len()
    );

    ClientPartition {
        episodes: part.left_in_both,
        assessments: part.right_in_both,
        only_in_assessments,
        only_in_episodes,
    }
}

/// Keep assessments whose program appears on at least one episode.
///
/// Programs no episode carries (e.g. a retired service) can never match,
/// so they are reported once here instead of as date or key issues.
pub fn filter_by_episode_programs(
    episodes: &[Episode],
    assessments: &[Assessment],
) -> (Vec<Assessment>, Vec<Issue>) {
    let part = reconcile(episodes, assessments, &KeySpec::program());
    let issues = part.right_only.iter().map(classify::program_not_recognized).collect();
    (part.right_in_both, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueKind;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ep(id: &str, slk: &str, start: &str, end: &str) -> Episode {
        Episode::new(id, slk, "P", d(start), d(end)).unwrap()
    }

    fn asmt(slk: &str, row: &str, prog: &str, date: &str) -> Assessment {
        Assessment::new(slk, row, prog, Some(d(date)))
    }

    fn q1() -> PeriodConfig {
        PeriodConfig { start: d("2024-01-01"), end: d("2024-03-31") }
    }

    #[test]
    fn excludes_blank_keys_and_dates() {
        let eps = vec![ep("E1", "C1", "2024-01-01", "2024-01-31"), ep("E2", " ", "2024-01-01", "2024-01-31")];
        let asmts = vec![
            asmt("C1", "1", "P", "2024-01-05"),
            asmt("", "2", "P", "2024-01-05"),
            Assessment::new("C1", "3", "P", None),
        ];
        let out = exclude_unmatchable(&eps, &asmts);
        assert_eq!(out.episodes.len(), 1);
        assert_eq!(out.assessments.len(), 1);
        assert_eq!(out.issues.len(), 3);
        assert_eq!(out.issues.iter().filter(|i| i.kind == IssueKind::MissingClientKey).count(), 2);
        assert_eq!(out.issues.iter().filter(|i| i.kind == IssueKind::MissingAssessmentDate).count(), 1);
    }

    #[test]
    fn excludes_blank_programs() {
        let eps = vec![
            ep("E1", "C1", "2024-01-01", "2024-03-31"),
            Episode::new("E2", "C1", "", d("2024-01-01"), d("2024-03-31")).unwrap(),
        ];
        let asmts = vec![
            asmt("C1", "1", "P", "2024-02-10"),
            asmt("C1", "2", "", "2024-02-10"),
            asmt("C1", "3", "  ", "2024-02-10"),
        ];
        let out = exclude_unmatchable(&eps, &asmts);
        assert_eq!(out.episodes.len(), 1);
        assert_eq!(out.episodes[0].episode_id(), "E1");
        assert_eq!(out.assessments.len(), 1);
        assert_eq!(out.assessments[0].assessment_id(), "1");

        let missing: Vec<_> = out.issues.iter().filter(|i| i.kind == IssueKind::MissingProgram).collect();
        assert_eq!(missing.len(), 3);
        assert!(missing.iter().all(|i| i.client_key == "C1"));
        assert_eq!(missing[0].episode_id.as_deref(), Some("E2"));
    }

    #[test]
    fn window_keeps_active_episodes_and_early_assessments() {
        let eps = vec![
            ep("E1", "C1", "2023-12-20", "2024-01-10"),
            ep("E2", "C2", "2023-06-01", "2023-09-30"),
            ep("E3", "C3", "2024-04-01", "2024-05-01"),
        ];
        let asmts = vec![
            asmt("C1", "1", "P", "2023-12-15"), // within 7 days before E1 start
            asmt("C1", "2", "P", "2023-12-01"), // too early
            asmt("C1", "3", "P", "2024-04-02"), // after period
        ];
        let w = window_to_period(eps, asmts, Some(&q1()), 7, None);
        assert_eq!(w.episodes.len(), 1);
        assert_eq!(w.episodes[0].episode_id(), "E1");
        assert_eq!(w.assessments.len(), 1);
        assert_eq!(w.assessments[0].assessment_id(), "1");
    }

    #[test]
    fn no_period_keeps_everything() {
        let eps = vec![ep("E2", "C2", "2023-06-01", "2023-09-30")];
        let asmts = vec![asmt("C2", "1", "P", "2020-01-01")];
        let w = window_to_period(eps, asmts, None, 7, None);
        assert_eq!(w.episodes.len(), 1);
        assert_eq!(w.assessments.len(), 1);
    }

    #[test]
    fn long_episode_warning() {
        let eps = vec![ep("E1", "C1", "2023-01-01", "2024-02-01"), ep("E2", "C2", "2024-01-01", "2024-02-01")];
        let w = window_to_period(eps, vec![], Some(&q1()), 7, Some(366));
        assert_eq!(w.long_episodes.len(), 1);
        assert_eq!(w.long_episodes[0].kind, IssueKind::EpisodeExceedsMaxDuration);
        assert_eq!(w.long_episodes[0].episode_id.as_deref(), Some("E1"));
    }

    #[test]
    fn client_partition_reports_in_period_only() {
        let eps = vec![ep("E1", "C1", "2024-01-01", "2024-03-31"), ep("E2", "C2", "2024-01-01", "2024-03-31")];
        let asmts = vec![
            asmt("C1", "1", "P", "2024-02-01"),
            asmt("C9", "1", "P", "2024-02-01"),
            asmt("C9", "2", "P", "2023-12-28"), // pre-period: in window, not reported
        ];
        let part = partition_clients(&eps, &asmts, Some(&q1()));
        assert_eq!(part.episodes.len(), 1);
        assert_eq!(part.assessments.len(), 1);
        assert_eq!(part.only_in_assessments.len(), 1);
        assert_eq!(part.only_in_assessments[0].assessment_id.as_deref(), Some("1"));
        assert_eq!(part.only_in_episodes.len(), 1);
        assert_eq!(part.only_in_episodes[0].client_key, "C2");
    }

    #[test]
    fn unknown_programs_filtered() {
        let eps = vec![ep("E1", "C1", "2024-01-01", "2024-03-31")];
        let asmts = vec![asmt("C1", "1", "P", "2024-02-01"), asmt("C1", "2", "BEGAPATH", "2024-02-01")];
        let (kept, issues) = filter_by_episode_programs(&eps, &asmts);
        assert_eq!(kept.len(), 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::ProgramNotRecognized);
        assert_eq!(issues[0].program.as_deref(), Some("BEGAPATH"));
    }
}
