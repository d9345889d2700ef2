//! Runner module - Execution abstraction layer
//!
//! This module provides a unified interface for running an untrusted program
//! in a disposable process:
//! - `ProcessRunner`: hardened direct child process (rlimits, empty environment,
//!   own session, user/network/PID namespaces, process-group kill on timeout)
//! - `SandboxedRunner`: IOI isolate box with cgroups
//!
//! The runner module does NOT:
//! - Know about languages, harness scripts or result envelopes
//! - Compare outputs or decide test outcomes

pub mod process;
pub mod sandboxed;

use anyhow::Result;
use async_trait::async_trait;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        let args: Vec<String> = iter.cloned().collect();
        Self { program, args }
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }
}

/// Resource limits for execution
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock limit in milliseconds
    pub time_ms: u32,
    /// Memory limit in MB
    pub memory_mb: u32,
    /// Maximum bytes kept from stdout
    pub output_bytes: usize,
}

impl RunLimits {
    pub fn new(time_ms: u32, memory_mb: u32) -> Self {
        Self {
            time_ms,
            memory_mb,
            ..Default::default()
        }
    }

    pub fn with_output_bytes(mut self, output_bytes: usize) -> Self {
        self.output_bytes = output_bytes;
        self
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            time_ms: 1000,
            memory_mb: 256,
            output_bytes: 1024 * 1024,
        }
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Wall-clock limit exceeded; the process group was killed
    TimeLimitExceeded,
    /// Memory limit exceeded
    MemoryLimitExceeded,
    /// Program wrote more than the output cap
    OutputLimitExceeded,
    /// Killed by signal
    Signaled(i32),
    /// System/internal error
    SystemError,
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program
#[derive(Debug)]
pub struct RunOutcome {
    /// Wall time used in milliseconds
    pub time_ms: u32,
    /// Memory used in KB (0 when not measured)
    pub memory_kb: u32,
    /// Stdout content, capped at the output limit
    pub stdout: String,
    /// Stderr content, capped
    pub stderr: String,
    /// Execution status
    pub status: RunStatus,
}

impl RunOutcome {
    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome>;
}

/// Bytes of stderr kept for error reporting
pub const STDERR_LIMIT_BYTES: usize = 4096;

// Re-exports
pub use process::{Isolation, ProcessRunner};
pub use sandboxed::SandboxedRunner;
