//! Process runner implementation
//!
//! Runs untrusted code as a direct child process. Every run gets:
//! - an empty working directory that is removed afterwards
//! - an empty environment (only a fixed `PATH`)
//! - its own session, so the whole process group can be killed
//! - rlimits: no file writes, no core dumps, few descriptors, CPU backstop
//! - new user, network and PID namespaces; the program runs as PID 1 of its
//!   own namespace, so it cannot see or signal the worker

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sched::{unshare, CloneFlags};
use nix::sys::prctl::set_pdeathsig;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{self, killpg, raise, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner, STDERR_LIMIT_BYTES};

/// PATH seen by the child process
const CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Maximum open file descriptors for the child
const MAX_OPEN_FILES: u64 = 64;

/// Namespace isolation policy for child processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Isolation {
    /// Refuse to run when the namespaces cannot be created
    #[default]
    Required,
    /// Unshare the namespaces when possible, run without them otherwise.
    /// Without a network namespace the child has full network access.
    BestEffort,
}

impl std::str::FromStr for Isolation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "required" => Ok(Isolation::Required),
            "best-effort" | "best_effort" => Ok(Isolation::BestEffort),
            other => bail!("Unknown isolation '{}', expected required or best-effort", other),
        }
    }
}

/// Runner that executes code as a hardened child process
pub struct ProcessRunner {
    isolation: Isolation,
}

impl ProcessRunner {
    pub fn new(isolation: Isolation) -> Self {
        Self { isolation }
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Whether this host lets an unprivileged process create the user,
    /// network and PID namespaces every run is placed in
    pub async fn namespaces_available() -> bool {
        let probe = ProcessRunner::new(Isolation::Required);
        match probe
            .execute(&CommandSpec::new("true"), &RunLimits::new(5000, 64), None)
            .await
        {
            Ok(outcome) => outcome.is_success(),
            Err(e) => {
                debug!("Namespace probe failed: {:#}", e);
                false
            }
        }
    }

    /// Run a program with a wall-clock limit and capped output
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin_content: Option<&str>,
    ) -> Result<RunOutcome> {
        let program = resolve_program(&cmd.program)
            .with_context(|| format!("Program not found: {}", cmd.program))?;
        let work_dir = tempfile::tempdir().context("Failed to create run directory")?;

        debug!("Running {:?} with args: {:?}", program, cmd.args);

        let mut command = Command::new(&program);
        command
            .args(&cmd.args)
            .current_dir(work_dir.path())
            .env_clear()
            .env("PATH", CHILD_PATH)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let cpu_secs = u64::from(limits.time_ms / 1000 + 2);
        let isolation = self.isolation;
        // SAFETY: the closure runs between fork and exec and only makes
        // async-signal-safe syscalls without allocating.
        unsafe {
            command.pre_exec(move || {
                nix::unistd::setsid()?;
                setrlimit(Resource::RLIMIT_CPU, cpu_secs, cpu_secs + 1)?;
                setrlimit(Resource::RLIMIT_FSIZE, 0, 0)?;
                setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
                setrlimit(Resource::RLIMIT_NOFILE, MAX_OPEN_FILES, MAX_OPEN_FILES)?;
                match unshare(
                    CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWPID,
                ) {
                    Ok(()) => enter_pid_namespace(),
                    Err(e) if isolation == Isolation::Required => Err(e.into()),
                    Err(_) => Ok(()),
                }
            });
        }

        let start = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", program))?;
        let pid = child.id();

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let feed = async move {
            if let Some(mut pipe) = stdin_pipe {
                if let Some(input) = stdin_content {
                    // The child may exit before reading everything
                    let _ = pipe.write_all(input.as_bytes()).await;
                }
                let _ = pipe.shutdown().await;
            }
        };

        let waited = tokio::time::timeout(Duration::from_millis(u64::from(limits.time_ms)), async {
            let (_, stdout, stderr, status) = tokio::join!(
                feed,
                read_capped(stdout_pipe, limits.output_bytes),
                read_capped(stderr_pipe, STDERR_LIMIT_BYTES),
                child.wait()
            );
            (stdout, stderr, status)
        })
        .await;

        let (stdout, stderr, exit_status) = match waited {
            Ok(result) => result,
            Err(_) => {
                // The leader is not reaped yet, so its pgid cannot be reused
                if let Some(pid) = pid {
                    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                        debug!("killpg({}) failed: {}", pid, e);
                    }
                }
                if let Err(e) = child.kill().await {
                    warn!("Failed to reap timed out process: {}", e);
                }
                return Ok(RunOutcome {
                    time_ms: elapsed_ms(start),
                    memory_kb: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                    status: RunStatus::TimeLimitExceeded,
                });
            }
        };

        let (stdout, stdout_truncated) = stdout.context("Failed to read stdout")?;
        let (stderr, _) = stderr.context("Failed to read stderr")?;
        let exit_status = exit_status.context("Failed to wait for process")?;

        let status = if stdout_truncated {
            RunStatus::OutputLimitExceeded
        } else if let Some(code) = exit_status.code() {
            RunStatus::Exited(code)
        } else if let Some(signal) = exit_status.signal() {
            if signal == Signal::SIGXCPU as i32 {
                RunStatus::TimeLimitExceeded
            } else {
                RunStatus::Signaled(signal)
            }
        } else {
            RunStatus::SystemError
        };

        Ok(RunOutcome {
            time_ms: elapsed_ms(start),
            memory_kb: 0, // Not measured for process execution
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status,
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Isolation::default())
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        self.execute(cmd, limits, stdin).await
    }
}

/// Fork once more after `unshare(CLONE_NEWPID)`: only children of the caller
/// enter the new PID namespace. The forked child returns and goes on to exec
/// as PID 1 there; the original process waits and exits the same way, so the
/// spawned process still reports the program's status.
fn enter_pid_namespace() -> std::io::Result<()> {
    // SAFETY: called from the pre_exec hook, where only this thread exists
    match unsafe { fork() }? {
        ForkResult::Child => {
            set_pdeathsig(Signal::SIGKILL)?;
            Ok(())
        }
        ForkResult::Parent { child } => {
            let code = loop {
                match waitpid(child, None) {
                    Err(Errno::EINTR) => continue,
                    Ok(WaitStatus::Exited(_, code)) => break code,
                    Ok(WaitStatus::Signaled(_, sig, _)) => {
                        // SAFETY: restoring the default action installs no handler
                        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
                        let _ = raise(sig);
                        break 128 + sig as i32;
                    }
                    _ => break 127,
                }
            };
            // SAFETY: leaves without running the forked worker's exit handlers
            unsafe { nix::libc::_exit(code) }
        }
    }
}

fn elapsed_ms(start: Instant) -> u32 {
    u32::try_from(start.elapsed().as_millis()).unwrap_or(u32::MAX)
}

/// Read a pipe to EOF, keeping at most `cap` bytes.
///
/// Excess output is drained and dropped so the writer never blocks on a full
/// pipe. Returns the kept bytes and whether anything was dropped.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok((kept, truncated))
}

/// Resolve a program name against the worker's PATH.
///
/// The child runs with an empty environment, so lookup happens here.
fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH").unwrap_or_else(|| CHILD_PATH.into());
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}


#[cfg(test)]
mod isolation_tests {
    use super::*;

    #[test]
    fn test_isolation_parsing_and_default() {
        assert_eq!(Isolation::default(), Isolation::Required);
        assert_eq!(ProcessRunner::default().isolation(), Isolation::Required);
        assert_eq!("required".parse::<Isolation>().unwrap(), Isolation::Required);
        assert_eq!("Best-Effort".parse::<Isolation>().unwrap(), Isolation::BestEffort);
        assert!("none".parse::<Isolation>().is_err());
    }

    #[tokio::test]
    async fn test_child_cannot_signal_the_worker() {
        if !ProcessRunner::namespaces_available().await {
            eprintln!("skipping: unprivileged namespaces are not available");
            return;
        }
        let script = format!(
            "printf '%s ' $$; kill -0 {} 2>/dev/null && echo reachable || echo isolated",
            std::process::id()
        );
        let outcome = ProcessRunner::default()
            .execute(
                &CommandSpec::new("sh").with_args(["-c", script.as_str()]),
                &RunLimits::new(5000, 64),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert_eq!(outcome.stdout.trim(), "1 isolated");
    }

    #[tokio::test]
    async fn test_status_survives_the_namespace_fork() {
        if !ProcessRunner::namespaces_available().await {
            eprintln!("skipping: unprivileged namespaces are not available");
            return;
        }
        let runner = ProcessRunner::default();
        let outcome = runner
            .execute(
                &CommandSpec::new("sh").with_args(["-c", "exit 5"]),
                &RunLimits::new(5000, 64),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Exited(5));

        let started = Instant::now();
        let outcome = runner
            .execute(
                &CommandSpec::new("sh").with_args(["-c", "sleep 30"]),
                &RunLimits::new(200, 64),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::TimeLimitExceeded);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
