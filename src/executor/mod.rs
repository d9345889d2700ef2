//! Sandboxed executor
//!
//! Runs one submission against one input in a fresh runtime process and
//! returns the stringified result of `main`/`solution`, or a typed failure.

pub mod harness;
pub mod preprocess;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::error::ExecutionFailure;
use crate::core::model::DEFAULT_LANGUAGE;
use crate::languages::{self, LanguageConfig};
use crate::runner::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};

pub use harness::ALLOWED_GLOBALS;
pub use preprocess::erase_types;

/// Default memory ceiling for one run in MB
pub const DEFAULT_MEMORY_LIMIT_MB: u32 = 256;
/// Default cap on captured stdout in bytes
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const OUTPUT_LIMIT_MESSAGE: &str = "Output limit exceeded";
const MEMORY_LIMIT_MESSAGE: &str = "Memory limit exceeded";

/// Executes one (code, input) pair
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        language: &str,
        input: &str,
        timeout_ms: u32,
    ) -> Result<String, ExecutionFailure>;
}

/// Executor backed by a [`Runner`]; every call gets its own process
#[derive(Clone)]
pub struct SandboxedExecutor {
    runner: Arc<dyn Runner>,
    memory_mb: u32,
    max_output_bytes: usize,
}

impl SandboxedExecutor {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self {
            runner,
            memory_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_memory_limit(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    async fn run_script(
        &self,
        config: &LanguageConfig,
        code: &str,
        input: &str,
        timeout_ms: u32,
    ) -> Result<String, ExecutionFailure> {
        let source = if config.erase_types {
            erase_types(code)
        } else {
            code.to_string()
        };

        let harness = harness::build_script(&source, input)
            .map_err(|e| ExecutionFailure::runtime(format!("Failed to prepare execution: {}", e)))?;

        let memory_mb = config.calculate_memory_limit(self.memory_mb);
        let limits = RunLimits::new(config.calculate_time_limit(timeout_ms), memory_mb)
            .with_output_bytes(self.max_output_bytes);
        let command = CommandSpec::from_vec(&config.run_command_for(memory_mb));

        let outcome = self
            .runner
            .run(&command, &limits, Some(&harness.script))
            .await
            .map_err(|e| {
                warn!("Execution failed to start: {:#}", e);
                ExecutionFailure::runtime(format!("Execution failed: {}", e))
            })?;

        debug!(
            time_ms = outcome.time_ms,
            memory_kb = outcome.memory_kb,
            status = ?outcome.status,
            "Run finished"
        );

        interpret_outcome(&outcome, &harness.marker)
    }
}

/// Map a finished run to the executor's result
fn interpret_outcome(outcome: &RunOutcome, marker: &str) -> Result<String, ExecutionFailure> {
    match outcome.status {
        RunStatus::TimeLimitExceeded => return Err(ExecutionFailure::Timeout),
        RunStatus::OutputLimitExceeded => {
            return Err(ExecutionFailure::runtime(OUTPUT_LIMIT_MESSAGE))
        }
        RunStatus::MemoryLimitExceeded => {
            return Err(ExecutionFailure::runtime(MEMORY_LIMIT_MESSAGE))
        }
        _ => {}
    }

    if let Some(result) = harness::parse_result(&outcome.stdout, marker) {
        return result;
    }

    if outcome.stderr.contains("heap out of memory") {
        return Err(ExecutionFailure::runtime(MEMORY_LIMIT_MESSAGE));
    }
    if let Some(message) = harness::error_from_stderr(&outcome.stderr) {
        return Err(ExecutionFailure::runtime(message));
    }

    let message = match outcome.status {
        RunStatus::Signaled(sig) => format!("Process killed by signal {}", sig),
        RunStatus::SystemError => "Sandbox system error".to_string(),
        RunStatus::Exited(code) => format!("Process exited with code {} without a result", code),
        _ => "Process ended without a result".to_string(),
    };
    Err(ExecutionFailure::runtime(message))
}

#[async_trait]
impl Executor for SandboxedExecutor {
    async fn execute(
        &self,
        code: &str,
        language: &str,
        input: &str,
        timeout_ms: u32,
    ) -> Result<String, ExecutionFailure> {
        let config = languages::get_language_config(language)
            .or_else(|| languages::get_language_config(DEFAULT_LANGUAGE))
            .ok_or_else(|| ExecutionFailure::runtime("No runtime configured for JavaScript"))?;

        self.run_script(&config, code, input, timeout_ms).await
    }
}
