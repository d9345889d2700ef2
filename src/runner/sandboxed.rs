//! Sandboxed runner implementation using isolate
//!
//! Executes untrusted code in a fresh isolate box per run, with cgroup memory
//! limits and isolate's own network and filesystem namespaces.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
use crate::sandbox::{
    ensure_cgroups_available, next_box_id, IoSpec, IsolateBox, IsolateStatus, Limits,
};

const STDIN_FILE: &str = "stdin.txt";

/// Runner that executes code in an isolate sandbox
#[derive(Debug, Default)]
pub struct SandboxedRunner;

impl SandboxedRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command in a new box
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin_content: Option<&str>,
    ) -> Result<RunOutcome> {
        ensure_cgroups_available().await?;

        let isolate_box = IsolateBox::new(next_box_id(), true).await?;
        let outcome = run_in_box(&isolate_box, cmd, limits, stdin_content).await;

        if let Err(e) = isolate_box.cleanup().await {
            warn!("Failed to clean up isolate box: {}", e);
        }

        outcome
    }
}

async fn run_in_box(
    isolate_box: &IsolateBox,
    cmd: &CommandSpec,
    limits: &RunLimits,
    stdin_content: Option<&str>,
) -> Result<RunOutcome> {
    let mut io = IoSpec::new();
    if let Some(content) = stdin_content {
        isolate_box.write_file(STDIN_FILE, content).await?;
        io = io.with_stdin(STDIN_FILE);
    }

    // V8 reserves heap beyond --max-old-space-size; leave headroom for it
    let memory_mb = limits.memory_mb.saturating_add(limits.memory_mb / 2);
    let sandbox_limits = Limits {
        time_ms: limits.time_ms,
        wall_time_ms: limits.time_ms,
        memory_mb,
        output_bytes: limits.output_bytes,
        fsize_kb: u32::try_from(limits.output_bytes / 1024 + 1).unwrap_or(u32::MAX),
        ..Default::default()
    };

    let outcome = isolate_box
        .run(&cmd.to_vec(), &sandbox_limits, &io)
        .await?;

    let memory_limit_kb = memory_mb.saturating_mul(1024);
    let status = match outcome.meta.status {
        _ if outcome.stdout_truncated => RunStatus::OutputLimitExceeded,
        IsolateStatus::TimeOut => RunStatus::TimeLimitExceeded,
        _ if outcome.meta.memory_kb > memory_limit_kb => RunStatus::MemoryLimitExceeded,
        IsolateStatus::Ok => RunStatus::Exited(0),
        IsolateStatus::RuntimeError => RunStatus::Exited(outcome.meta.exit_code),
        IsolateStatus::Signal(sig) => RunStatus::Signaled(sig),
        IsolateStatus::InternalError => RunStatus::SystemError,
    };

    Ok(RunOutcome {
        time_ms: outcome.meta.wall_time_ms,
        memory_kb: outcome.meta.memory_kb,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        status,
    })
}

#[async_trait]
impl Runner for SandboxedRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        self.execute(cmd, limits, stdin).await
    }
}
