pub mod check;

use crate::jobs::check::CheckJob;
use serde::{Deserialize, Serialize};

/// Worker job enum - represents different types of jobs the worker can process
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum WorkerJob {
    /// Check a student submission
    #[serde(rename = "check")]
    Check(CheckJob),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_check_job() {
        let data = r#"{
            "job_type": "check",
            "submission_id": 17,
            "student_id": 3,
            "code": "function main(n) { return n * 2; }",
            "language": "typescript",
            "testCases": [{"input": "5", "expected": "10", "description": "double"}],
            "settings": {"timeout": 1000},
            "assignmentId": 9
        }"#;
        let WorkerJob::Check(job) = serde_json::from_str::<WorkerJob>(data).unwrap();

        assert_eq!(job.submission_id, 17);
        assert_eq!(job.student_id, Some(3));
        assert_eq!(job.request.language(), "typescript");
        assert_eq!(job.request.test_cases.len(), 1);
        assert_eq!(job.request.assignment_id, Some(9));
        assert_eq!(job.request.settings.unwrap().timeout, Some(1000));
    }

    #[test]
    fn test_unknown_job_type_rejected() {
        let data = r#"{"job_type": "judge", "submission_id": 1}"#;
        assert!(serde_json::from_str::<WorkerJob>(data).is_err());
    }
}
