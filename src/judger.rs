//! Test runner
//!
//! Drives the executor over every test case of a check run. Each test case is
//! executed in its own task; results come back in input order no matter how
//! many run at once.

use std::any::Any;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error};

use crate::core::error::ExecutionFailure;
use crate::core::model::{TestCase, TestOutcome};
use crate::executor::Executor;

/// Actual-value prefix for failed executions
pub const ERROR_PREFIX: &str = "Error: ";

/// Runs test cases against one submission
#[derive(Clone)]
pub struct TestRunner {
    executor: Arc<dyn Executor>,
    max_parallel: usize,
}

impl TestRunner {
    /// Sequential runner
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            max_parallel: 1,
        }
    }

    /// Run up to `max_parallel` test cases at once (at least one)
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Execute every test case and return one outcome per case, in input order
    pub async fn run(
        &self,
        code: &str,
        language: &str,
        test_cases: &[TestCase],
        timeout_ms: u32,
    ) -> Vec<TestOutcome> {
        let code: Arc<str> = Arc::from(code);
        let language: Arc<str> = Arc::from(language);

        let runs = test_cases.iter().cloned().enumerate().map(|(index, tc)| {
            let executor = Arc::clone(&self.executor);
            let code = Arc::clone(&code);
            let language = Arc::clone(&language);
            async move {
                let input = tc.input.clone();
                let handle = tokio::spawn(async move {
                    executor.execute(&code, &language, &input, timeout_ms).await
                });

                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        let message = if e.is_panic() {
                            panic_message(e.into_panic())
                        } else {
                            e.to_string()
                        };
                        error!("Test case {} aborted: {}", index, message);
                        Err(ExecutionFailure::RuntimeError(message))
                    }
                };

                let outcome = outcome_from(&tc, result);
                debug!(
                    index,
                    passed = outcome.passed,
                    timed_out = outcome.timed_out,
                    "Test case finished"
                );
                outcome
            }
        });

        // `buffered` yields in submission order
        stream::iter(runs)
            .buffered(self.max_parallel)
            .collect()
            .await
    }
}

/// Exact comparison; the expected value is authored as the stringified result
pub fn compare_output(actual: &str, expected: &str) -> bool {
    actual == expected
}

fn outcome_from(tc: &TestCase, result: Result<String, ExecutionFailure>) -> TestOutcome {
    let (passed, actual, timed_out) = match result {
        Ok(actual) => (compare_output(&actual, &tc.expected), actual, false),
        Err(ExecutionFailure::RuntimeError(message)) => {
            (false, format!("{}{}", ERROR_PREFIX, message), false)
        }
        Err(ExecutionFailure::Timeout) => (false, format!("{}timeout", ERROR_PREFIX), true),
    };

    TestOutcome {
        passed,
        actual,
        expected: tc.expected.clone(),
        description: tc.description.clone(),
        input: tc.input.clone(),
        timed_out,
        is_public: tc.is_public(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "executor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Doubles numeric input; special inputs fail, hang or panic
    struct DoublingExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl DoublingExecutor {
        fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Executor for DoublingExecutor {
        async fn execute(
            &self,
            _code: &str,
            _language: &str,
            input: &str,
            _timeout_ms: u32,
        ) -> Result<String, ExecutionFailure> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            // Later inputs finish first to exercise ordering
            let n: u64 = input.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n * 5))).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            match input {
                "boom" => Err(ExecutionFailure::runtime("boom is not defined")),
                "loop" => Err(ExecutionFailure::Timeout),
                "panic" => panic!("executor exploded"),
                _ => Ok((n * 2).to_string()),
            }
        }
    }

    fn cases(inputs: &[(&str, &str)]) -> Vec<TestCase> {
        inputs
            .iter()
            .map(|(input, expected)| TestCase::new(*input, *expected))
            .collect()
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let runner = TestRunner::new(Arc::new(DoublingExecutor::new())).with_max_parallel(4);
        let test_cases = cases(&[("1", "2"), ("2", "4"), ("3", "7"), ("4", "8")]);

        let outcomes = runner.run("", "javascript", &test_cases, 1000).await;

        let inputs: Vec<&str> = outcomes.iter().map(|o| o.input.as_str()).collect();
        assert_eq!(inputs, vec!["1", "2", "3", "4"]);
        let passed: Vec<bool> = outcomes.iter().map(|o| o.passed).collect();
        assert_eq!(passed, vec![true, true, false, true]);
        assert_eq!(outcomes[2].actual, "6");
        assert_eq!(outcomes[2].expected, "7");
    }

    #[tokio::test]
    async fn test_failures_are_recorded_per_test() {
        let runner = TestRunner::new(Arc::new(DoublingExecutor::new()));
        let test_cases = cases(&[("boom", "x"), ("loop", "x"), ("5", "10")]);

        let outcomes = runner.run("", "javascript", &test_cases, 1000).await;

        assert_eq!(outcomes[0].actual, "Error: boom is not defined");
        assert!(!outcomes[0].passed);
        assert!(!outcomes[0].timed_out);

        assert_eq!(outcomes[1].actual, "Error: timeout");
        assert!(outcomes[1].timed_out);

        assert!(outcomes[2].passed);
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_outcome() {
        let runner = TestRunner::new(Arc::new(DoublingExecutor::new())).with_max_parallel(2);
        let test_cases = cases(&[("panic", "x"), ("1", "2")]);

        let outcomes = runner.run("", "javascript", &test_cases, 1000).await;

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].passed);
        assert_eq!(outcomes[0].actual, "Error: executor exploded");
        assert!(outcomes[1].passed);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let executor = Arc::new(DoublingExecutor::new());
        let runner = TestRunner::new(executor.clone()).with_max_parallel(2);
        let test_cases = cases(&[("1", "2"), ("1", "2"), ("1", "2"), ("1", "2"), ("1", "2")]);

        runner.run("", "javascript", &test_cases, 1000).await;
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);

        let sequential = Arc::new(DoublingExecutor::new());
        TestRunner::new(sequential.clone())
            .run("", "javascript", &test_cases, 1000)
            .await;
        assert_eq!(sequential.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_compare_output_is_exact() {
        assert!(compare_output("10", "10"));
        assert!(!compare_output("10\n", "10"));
        assert!(!compare_output(" 10", "10"));
        assert!(!compare_output("[1,2]", "[1, 2]"));
    }

    #[test]
    fn test_visibility_is_carried() {
        let hidden = TestCase::new("1", "2").with_public(false);
        let outcome = outcome_from(&hidden, Ok("2".to_string()));
        assert!(outcome.passed);
        assert!(!outcome.is_public);
    }

    #[test]
    fn test_with_max_parallel_floor() {
        let runner = TestRunner::new(Arc::new(DoublingExecutor::new())).with_max_parallel(0);
        assert_eq!(runner.max_parallel(), 1);
    }
}
