//! Checker service facade
//!
//! The single entry point of the core: resolves test cases and settings,
//! then runs analyzer, test runner and scorer in that order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyzer;
use crate::core::error::CheckError;
use crate::core::model::{
    CheckRequest, CheckResult, CheckSettings, SettingsOverrides, TestCase,
};
use crate::executor::Executor;
use crate::judger::TestRunner;
use crate::languages;
use crate::scorer;

/// Test cases and settings stored for an assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSpec {
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub settings: Option<SettingsOverrides>,
}

/// Looks up assignments referenced by id
#[async_trait]
pub trait AssignmentSource: Send + Sync {
    async fn fetch_assignment(&self, assignment_id: i64) -> anyhow::Result<AssignmentSpec>;
}

/// A request with test cases resolved and settings merged and validated
#[derive(Debug, Clone)]
pub struct PreparedCheck {
    pub code: String,
    pub language: String,
    pub test_cases: Vec<TestCase>,
    pub settings: CheckSettings,
}

pub struct Checker {
    runner: TestRunner,
    assignments: Option<Arc<dyn AssignmentSource>>,
}

impl Checker {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            runner: TestRunner::new(executor),
            assignments: None,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.runner = self.runner.with_max_parallel(max_parallel);
        self
    }

    pub fn with_assignment_source(mut self, source: Arc<dyn AssignmentSource>) -> Self {
        self.assignments = Some(source);
        self
    }

    /// Check a submission end to end
    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResult, CheckError> {
        let prepared = self.prepare(request).await?;
        Ok(self.run(prepared).await)
    }

    /// Resolve test cases, merge settings and validate everything that must
    /// hold before any code runs
    pub async fn prepare(&self, request: &CheckRequest) -> Result<PreparedCheck, CheckError> {
        let mut test_cases = request.test_cases.clone();
        let mut settings = CheckSettings::default();

        if test_cases.is_empty() {
            if let Some(assignment_id) = request.assignment_id {
                let source = self.assignments.as_ref().ok_or_else(|| {
                    CheckError::InvalidInput(format!(
                        "assignment {} cannot be resolved: no assignment source configured",
                        assignment_id
                    ))
                })?;
                let assignment = source
                    .fetch_assignment(assignment_id)
                    .await
                    .map_err(|e| CheckError::AssignmentLookup {
                        assignment_id,
                        message: format!("{:#}", e),
                    })?;

                test_cases = assignment.test_cases;
                if let Some(overrides) = &assignment.settings {
                    settings = settings.merged_with(overrides);
                }
            }
        }

        if let Some(overrides) = &request.settings {
            settings = settings.merged_with(overrides);
        }

        if test_cases.is_empty() {
            return Err(CheckError::InvalidInput(
                "at least one test case is required".to_string(),
            ));
        }
        settings.validate().map_err(CheckError::InvalidInput)?;

        let language = request.language().to_string();
        if languages::get_language_config(&language).is_none() {
            if settings.strict_mode {
                return Err(CheckError::InvalidInput(format!(
                    "unsupported language '{}'",
                    language
                )));
            }
            warn!("Unsupported language '{}', checking as JavaScript", language);
        }

        Ok(PreparedCheck {
            code: request.code.clone(),
            language,
            test_cases,
            settings,
        })
    }

    /// Run a prepared check; never fails, execution problems become outcomes
    pub async fn run(&self, prepared: PreparedCheck) -> CheckResult {
        let PreparedCheck {
            code,
            language,
            test_cases,
            settings,
        } = prepared;

        let lint = analyzer::analyze(&code, &language);
        let outcomes = self
            .runner
            .run(&code, &language, &test_cases, settings.timeout_ms)
            .await;
        let report = scorer::score(&lint, &outcomes, &settings);

        info!(
            language = %language,
            tests = outcomes.len(),
            passed = report.test_stats.passed,
            lint = lint.len(),
            score = report.score,
            "Check finished"
        );

        CheckResult {
            lint,
            tests: outcomes.into_iter().filter(|o| o.is_public).collect(),
            score: report.score,
            test_stats: report.test_stats,
            passed_threshold: report.passed_threshold,
            settings,
        }
    }
}
