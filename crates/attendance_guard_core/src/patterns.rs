//! Historical attendance pattern analysis.
//!
//! Looks for signs of bulk or scripted marking in a claimant's own history. Missing
//! or thin history never counts against anyone.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::assessment::{Assessment, ReasonCode};

pub const RAPID_LOOKBACK_DAYS: i64 = 7;
pub const RAPID_GAP_MINUTES: i64 = 5;
pub const RAPID_PENALTY: u32 = 25;

pub const CLUSTER_LOOKBACK_DAYS: i64 = 30;
pub const CLUSTER_MIN_RECORDS: usize = 10;
pub const CLUSTER_AVG_GAP_MINUTES: i64 = 5;
pub const CLUSTER_PENALTY: u32 = 30;

/// Scores the claimant's history in light of a new mark at `claim_time`.
///
/// Rapid succession considers the pending mark together with the last 7 days of
/// history. Clustering looks only at recorded history over 30 days.
pub fn analyze_patterns(claim_time: DateTime<Utc>, timestamps: &[DateTime<Utc>]) -> Assessment {
    score_history(claim_time, timestamps, Some(claim_time)).0
}

fn since(timestamps: &[DateTime<Utc>], cutoff: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    timestamps.iter().copied().filter(|t| *t >= cutoff).collect()
}

/// Returns the assessment and the number of records inside the clustering lookback.
fn score_history(
    now: DateTime<Utc>,
    timestamps: &[DateTime<Utc>],
    pending: Option<DateTime<Utc>>,
) -> (Assessment, usize) {
    let mut assessment = Assessment::new();

    let mut recent = since(timestamps, now - Duration::days(RAPID_LOOKBACK_DAYS));
    recent.extend(pending);
    if has_rapid_pair(&mut recent) {
        assessment.flag(
            ReasonCode::RapidSuccession,
            RAPID_PENALTY,
            "Multiple rapid attendance marks",
        );
    }

    let history = since(timestamps, now - Duration::days(CLUSTER_LOOKBACK_DAYS));
    let total_records = history.len();
    if is_clustered(history) {
        assessment.flag(
            ReasonCode::AttendanceClustering,
            CLUSTER_PENALTY,
            "Suspicious attendance clustering detected",
        );
    }

    (assessment, total_records)
}

/// Stops at the first pair closer than the rapid gap; one hit is enough.
fn has_rapid_pair(marks: &mut [DateTime<Utc>]) -> bool {
    marks.sort_unstable_by(|a, b| b.cmp(a));
    marks
        .windows(2)
        .any(|pair| pair[0] - pair[1] < Duration::minutes(RAPID_GAP_MINUTES))
}

fn average_gap(mut marks: Vec<DateTime<Utc>>) -> Option<Duration> {
    if marks.len() < 2 {
        return None;
    }
    marks.sort_unstable_by(|a, b| b.cmp(a));
    let total_ms: i64 = marks
        .windows(2)
        .map(|pair| (pair[0] - pair[1]).num_milliseconds())
        .sum();
    Some(Duration::milliseconds(total_ms / (marks.len() as i64 - 1)))
}

fn is_clustered(history: Vec<DateTime<Utc>>) -> bool {
    if history.len() < CLUSTER_MIN_RECORDS {
        return false;
    }
    average_gap(history).is_some_and(|gap| gap < Duration::minutes(CLUSTER_AVG_GAP_MINUTES))
}

/// Summary served to reviewers asking about one claimant's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub patterns: Vec<String>,
    pub risk_score: u32,
    pub total_records: usize,
}

/// History-only view of the pattern checks: no pending mark is added.
pub fn pattern_report(now: DateTime<Utc>, timestamps: &[DateTime<Utc>]) -> PatternReport {
    let (assessment, total_records) = score_history(now, timestamps, None);
    PatternReport {
        patterns: assessment.reasons().into_iter().map(String::from).collect(),
        risk_score: assessment.penalty(),
        total_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn empty_history_is_never_suspicious() {
        assert!(analyze_patterns(now(), &[]).is_clean());
        assert_eq!(pattern_report(now(), &[]).risk_score, 0);
    }

    #[test]
    fn second_mark_four_minutes_after_the_first_is_rapid() {
        let t = now();
        let result = analyze_patterns(t, &[t - Duration::minutes(4)]);
        assert_eq!(result.penalty(), RAPID_PENALTY);
        assert!(result.has(ReasonCode::RapidSuccession));
    }

    #[test]
    fn six_minutes_apart_is_fine() {
        let t = now();
        assert!(analyze_patterns(t, &[t - Duration::minutes(6)]).is_clean());
    }

    #[test]
    fn rapid_penalty_is_applied_once() {
        let t = now();
        let history: Vec<_> = (1..=4).map(|i| t - Duration::minutes(i)).collect();
        let result = analyze_patterns(t, &history);
        let rapid = result
            .findings()
            .iter()
            .filter(|f| f.code == ReasonCode::RapidSuccession)
            .count();
        assert_eq!(rapid, 1);
    }

    #[test]
    fn rapid_pairs_older_than_a_week_are_ignored() {
        let t = now();
        let old = t - Duration::days(8);
        let result = analyze_patterns(t, &[old, old - Duration::minutes(1)]);
        assert!(result.is_clean());
    }

    #[test]
    fn ten_marks_three_minutes_apart_cluster() {
        let t = now() - Duration::days(3);
        let history: Vec<_> = (0..10).map(|i| t - Duration::minutes(3 * i)).collect();

        let report = pattern_report(now(), &history);
        assert_eq!(report.total_records, 10);
        assert!(report.patterns.contains(&"Suspicious attendance clustering detected".to_string()));

        let result = analyze_patterns(now(), &history);
        assert!(result.has(ReasonCode::AttendanceClustering));
        assert!(result.has(ReasonCode::RapidSuccession));
        assert_eq!(result.penalty(), RAPID_PENALTY + CLUSTER_PENALTY);
    }

    #[test]
    fn nine_clustered_marks_are_below_the_sample_size() {
        let t = now() - Duration::days(10);
        let history: Vec<_> = (0..9).map(|i| t - Duration::minutes(3 * i)).collect();
        let result = analyze_patterns(now(), &history);
        assert!(!result.has(ReasonCode::AttendanceClustering));
    }

    #[test]
    fn daily_attendance_does_not_cluster() {
        let t = now() - Duration::hours(2);
        let history: Vec<_> = (0..20).map(|i| t - Duration::days(i)).collect();
        assert!(analyze_patterns(now(), &history).is_clean());
    }
}
