//! Scoring policy
//!
//! Tests are worth 70 points, lint 30. Each lint error costs 3 points and each
//! warning 1, up to the whole lint share.

use crate::core::model::{CheckSettings, LintFinding, TestOutcome, TestStats};

pub const TEST_WEIGHT: f64 = 70.0;
pub const LINT_WEIGHT: u32 = 30;
pub const ERROR_PENALTY: u32 = 3;
pub const WARNING_PENALTY: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    /// Final score, 0 to 100
    pub score: u32,
    pub test_stats: TestStats,
    pub passed_threshold: bool,
}

pub fn test_stats(tests: &[TestOutcome]) -> TestStats {
    let count = |pred: fn(&TestOutcome) -> bool| tests.iter().filter(|t| pred(t)).count() as u32;
    let passed = count(|t| t.passed);
    TestStats {
        total: tests.len() as u32,
        passed,
        failed: tests.len() as u32 - passed,
        timed_out: count(|t| t.timed_out),
        public_count: count(|t| t.is_public),
    }
}

pub fn lint_penalty(lint: &[LintFinding]) -> u32 {
    let errors = lint.iter().filter(|f| f.is_error()).count() as u32;
    let warnings = lint.len() as u32 - errors;
    (errors * ERROR_PENALTY + warnings * WARNING_PENALTY).min(LINT_WEIGHT)
}

/// Combine lint findings and test outcomes into a score
pub fn score(lint: &[LintFinding], tests: &[TestOutcome], settings: &CheckSettings) -> ScoreReport {
    let test_stats = test_stats(tests);

    let score = if tests.is_empty() {
        0
    } else {
        let test_score = f64::from(test_stats.passed) / f64::from(test_stats.total) * TEST_WEIGHT;
        let lint_score = LINT_WEIGHT.saturating_sub(lint_penalty(lint));
        let total = (test_score + f64::from(lint_score)).round() as u32;

        if !settings.allow_partial_score && test_stats.passed < test_stats.total {
            0
        } else {
            total.min(100)
        }
    };

    ScoreReport {
        score,
        test_stats,
        passed_threshold: f64::from(score) >= settings.passing_threshold_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Severity;

    fn outcome(passed: bool) -> TestOutcome {
        TestOutcome {
            passed,
            actual: String::new(),
            expected: String::new(),
            description: String::new(),
            input: String::new(),
            timed_out: false,
            is_public: true,
        }
    }

    fn finding(severity: Severity) -> LintFinding {
        LintFinding::new("rule", severity, "message", 1, 1)
    }

    #[test]
    fn test_perfect_score() {
        let report = score(&[], &[outcome(true), outcome(true)], &CheckSettings::default());
        assert_eq!(report.score, 100);
        assert!(report.passed_threshold);
        assert_eq!(report.test_stats.passed, 2);
        assert_eq!(report.test_stats.failed, 0);
    }

    #[test]
    fn test_empty_tests_score_zero() {
        let report = score(&[], &[], &CheckSettings::default());
        assert_eq!(report.score, 0);
        assert_eq!(report.test_stats, TestStats::default());
        assert!(!report.passed_threshold);
    }

    #[test]
    fn test_missing_entry_point_scores_27() {
        let lint = vec![finding(Severity::Error)];
        let tests = vec![outcome(false), outcome(false)];
        assert_eq!(score(&lint, &tests, &CheckSettings::default()).score, 27);
    }

    #[test]
    fn test_partial_and_rounding() {
        // 2/3 * 70 = 46.67, + 30 - 3 - 1 = 26 -> 72.67 -> 73
        let lint = vec![finding(Severity::Error), finding(Severity::Warning)];
        let tests = vec![outcome(true), outcome(true), outcome(false)];
        let report = score(&lint, &tests, &CheckSettings::default());
        assert_eq!(report.score, 73);
        assert!(!report.passed_threshold);
    }

    #[test]
    fn test_lint_penalty_is_capped() {
        let lint: Vec<LintFinding> = (0..20).map(|_| finding(Severity::Error)).collect();
        assert_eq!(lint_penalty(&lint), 30);
        assert_eq!(score(&lint, &[outcome(true)], &CheckSettings::default()).score, 70);
    }

    #[test]
    fn test_no_partial_score() {
        let settings = CheckSettings {
            allow_partial_score: false,
            ..Default::default()
        };
        let tests = vec![outcome(true), outcome(true), outcome(false)];
        assert_eq!(score(&[], &tests, &settings).score, 0);

        let all = vec![outcome(true), outcome(true)];
        assert_eq!(score(&[], &all, &settings).score, 100);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let settings = CheckSettings {
            passing_threshold_percent: 73.0,
            ..Default::default()
        };
        let lint = vec![finding(Severity::Error), finding(Severity::Warning)];
        let tests = vec![outcome(true), outcome(true), outcome(false)];
        assert!(score(&lint, &tests, &settings).passed_threshold);
    }

    #[test]
    fn test_stats_count_timeouts_and_public() {
        let mut timed_out = outcome(false);
        timed_out.timed_out = true;
        let mut hidden = outcome(true);
        hidden.is_public = false;

        let stats = test_stats(&[timed_out, hidden, outcome(true)]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.public_count, 2);
    }
}
