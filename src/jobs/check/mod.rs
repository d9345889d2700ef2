//! Check jobs from the queue
//!
//! A check job is a [`CheckRequest`] plus the queue bookkeeping: which
//! submission it belongs to and, for attempt limiting, which student sent it.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::checker::Checker;
use crate::core::error::CheckError;
use crate::core::model::{CheckRequest, CheckResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckJob {
    pub submission_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    #[serde(flatten)]
    pub request: CheckRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckJobStatus {
    Completed,
    InvalidInput,
    AttemptsExceeded,
    SystemError,
}

/// Result stored and published for a check job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckJobResult {
    pub submission_id: i64,
    pub status: CheckJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CheckJobResult {
    pub fn completed(submission_id: i64, result: CheckResult) -> Self {
        Self {
            submission_id,
            status: CheckJobStatus::Completed,
            result: Some(result),
            error_message: None,
        }
    }

    pub fn failed(submission_id: i64, status: CheckJobStatus, message: impl Into<String>) -> Self {
        Self {
            submission_id,
            status,
            result: None,
            error_message: Some(message.into()),
        }
    }
}

/// Counts submission attempts per (assignment, student)
#[async_trait]
pub trait AttemptCounter: Send + Sync {
    /// Record one more attempt and return the new total
    async fn record_attempt(&self, assignment_id: i64, student_id: i64) -> Result<u64>;
}

/// Process a check job
pub async fn process_check_job(
    job: &CheckJob,
    checker: &Checker,
    attempts: &dyn AttemptCounter,
) -> CheckJobResult {
    let prepared = match checker.prepare(&job.request).await {
        Ok(prepared) => prepared,
        Err(e @ CheckError::InvalidInput(_)) => {
            warn!("Rejected check job {}: {}", job.submission_id, e);
            return CheckJobResult::failed(
                job.submission_id,
                CheckJobStatus::InvalidInput,
                e.to_string(),
            );
        }
        Err(e) => {
            error!("Failed to prepare check job {}: {}", job.submission_id, e);
            return CheckJobResult::failed(
                job.submission_id,
                CheckJobStatus::SystemError,
                e.to_string(),
            );
        }
    };

    if let (Some(max_attempts), Some(assignment_id), Some(student_id)) = (
        prepared.settings.max_attempts,
        job.request.assignment_id,
        job.student_id,
    ) {
        match attempts.record_attempt(assignment_id, student_id).await {
            Ok(count) if count > u64::from(max_attempts) => {
                info!(
                    "Attempt limit reached: submission_id={}, student_id={}, attempts={}/{}",
                    job.submission_id, student_id, count, max_attempts
                );
                return CheckJobResult::failed(
                    job.submission_id,
                    CheckJobStatus::AttemptsExceeded,
                    format!("Maximum attempts ({}) exceeded", max_attempts),
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to record attempt for {}: {:#}", job.submission_id, e);
                return CheckJobResult::failed(
                    job.submission_id,
                    CheckJobStatus::SystemError,
                    format!("Failed to record attempt: {}", e),
                );
            }
        }
    }

    let result = checker.run(prepared).await;
    info!(
        "Job summary: submission_id={}, score={}, passed={}/{}",
        job.submission_id, result.score, result.test_stats.passed, result.test_stats.total
    );
    CheckJobResult::completed(job.submission_id, result)
}
