//! Isolate box management
//!
//! Low-level wrapper around the isolate sandbox.
//! Manages box initialization, cleanup, and command execution.

use anyhow::{Context, Result};
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use super::meta::{parse_meta, IsolateMeta};

/// Cached cgroup availability
static USE_CGROUPS: OnceLock<bool> = OnceLock::new();

/// Check if isolate cgroups are available
pub async fn is_cgroups_available() -> bool {
    if let Some(value) = USE_CGROUPS.get() {
        return *value;
    }

    // Try to initialize a test box with cgroups
    let test_result = Command::new("isolate")
        .args(["--box-id", "9999", "--cg", "--init"])
        .output()
        .await;

    // Cleanup
    let _ = Command::new("isolate")
        .args(["--box-id", "9999", "--cleanup"])
        .output()
        .await;

    let available = match test_result {
        Ok(r) => r.status.success(),
        Err(_) => false,
    };

    let _ = USE_CGROUPS.set(available);
    available
}

/// Ensure cgroups are available; return an error otherwise
pub async fn ensure_cgroups_available() -> Result<()> {
    if is_cgroups_available().await {
        Ok(())
    } else {
        anyhow::bail!("Isolate cgroup support is required but not available. Install isolate with cgroup support and ensure cgroups are enabled.")
    }
}

/// I/O specification for sandbox execution
#[derive(Debug, Clone)]
pub struct IoSpec {
    /// File name inside the box used as stdin
    pub stdin_file: Option<String>,
    /// File name for stdout inside the box
    pub stdout_file: String,
    /// File name for stderr inside the box
    pub stderr_file: String,
}

impl IoSpec {
    pub fn new() -> Self {
        Self {
            stdin_file: None,
            stdout_file: "stdout.txt".to_string(),
            stderr_file: "stderr.txt".to_string(),
        }
    }

    pub fn with_stdin(mut self, name: impl Into<String>) -> Self {
        self.stdin_file = Some(name.into());
        self
    }
}

impl Default for IoSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource limits for sandbox execution
#[derive(Debug, Clone)]
pub struct Limits {
    /// CPU time limit in milliseconds
    pub time_ms: u32,
    /// Wall-clock limit in milliseconds
    pub wall_time_ms: u32,
    /// Memory limit in MB
    pub memory_mb: u32,
    /// Maximum number of processes (threads count for V8)
    pub processes: u32,
    /// Maximum open files
    pub open_files: u32,
    /// Maximum file size in KB
    pub fsize_kb: u32,
    /// Maximum bytes read back from stdout
    pub output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            time_ms: 1000,
            wall_time_ms: 1000,
            memory_mb: 256,
            processes: 64,
            open_files: 64,
            fsize_kb: 1024,
            output_bytes: 1024 * 1024,
        }
    }
}

/// Raw outcome from sandbox execution (no verdict interpretation)
#[derive(Debug)]
pub struct SandboxOutcome {
    /// Parsed meta file contents
    pub meta: IsolateMeta,
    /// Stdout content, capped
    pub stdout: String,
    /// Whether stdout exceeded the cap
    pub stdout_truncated: bool,
    /// Stderr content, capped
    pub stderr: String,
}

/// Isolate box manager
pub struct IsolateBox {
    box_id: u32,
    box_path: String,
    use_cgroups: bool,
}

impl IsolateBox {
    /// Create and initialize a new isolate box
    pub async fn new(box_id: u32, use_cgroups: bool) -> Result<Self> {
        // Clean up any existing box
        let _ = Command::new("isolate")
            .args(["--box-id", &box_id.to_string(), "--cleanup"])
            .output()
            .await;

        let box_id_str = box_id.to_string();
        let mut args = vec!["--box-id", &box_id_str];
        if use_cgroups {
            args.push("--cg");
        }
        args.push("--init");

        let output = Command::new("isolate")
            .args(&args)
            .output()
            .await
            .context("Failed to run isolate --init")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to initialize isolate box: {}", stderr);
        }

        let box_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(
            "Initialized isolate box {} at {} (cgroups: {})",
            box_id, box_path, use_cgroups
        );

        Ok(Self {
            box_id,
            box_path,
            use_cgroups,
        })
    }

    /// Get the path to the box/box subdirectory (working directory for programs)
    pub fn work_dir(&self) -> String {
        format!("{}/box", self.box_path)
    }

    /// Write a file into the box's working directory
    pub async fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let dest = format!("{}/{}", self.work_dir(), name);
        fs::write(&dest, content)
            .await
            .with_context(|| format!("Failed to write {}", dest))
    }

    /// Run a command in the isolate box
    pub async fn run(
        &self,
        command: &[String],
        limits: &Limits,
        io: &IoSpec,
    ) -> Result<SandboxOutcome> {
        let meta_file = format!("/tmp/isolate_meta_{}.txt", self.box_id);
        let stdout_path = format!("{}/{}", self.work_dir(), io.stdout_file);
        let stderr_path = format!("{}/{}", self.work_dir(), io.stderr_file);

        let time_limit_secs = (limits.time_ms as f64) / 1000.0;
        let wall_time_secs = (limits.wall_time_ms as f64) / 1000.0;
        let memory_limit_kb = limits.memory_mb * 1024;

        let mut args = vec!["--box-id".to_string(), self.box_id.to_string()];

        // Add cgroup options if available
        if self.use_cgroups {
            args.push("--cg".to_string());
            args.push(format!("--cg-mem={}", memory_limit_kb));
        }

        args.extend([
            format!("--time={}", time_limit_secs),
            format!("--wall-time={}", wall_time_secs),
            format!("--meta={}", meta_file),
            format!("--stdout={}", io.stdout_file),
            format!("--stderr={}", io.stderr_file),
            format!("--processes={}", limits.processes),
            format!("--open-files={}", limits.open_files),
            format!("--fsize={}", limits.fsize_kb),
            // Runtime needs the system libraries only
            "--dir=/usr".to_string(),
            "--dir=/lib".to_string(),
            "--dir=/lib64".to_string(),
            "--dir=/etc:noexec".to_string(),
            "--env=PATH=/usr/local/bin:/usr/bin:/bin".to_string(),
            "--env=HOME=/box".to_string(),
        ]);

        if let Some(stdin_file) = &io.stdin_file {
            args.push(format!("--stdin={}", stdin_file));
        }

        args.push("--run".to_string());
        args.push("--".to_string());

        // Prepend /usr/bin/ to the command if it's not an absolute path
        let mut cmd_iter = command.iter();
        if let Some(cmd) = cmd_iter.next() {
            if cmd.starts_with('/') || cmd.starts_with("./") {
                args.push(cmd.clone());
            } else {
                args.push(format!("/usr/bin/{}", cmd));
            }
            args.extend(cmd_iter.cloned());
        }

        debug!("Running isolate with args: {:?}", args);

        let _output = Command::new("isolate")
            .args(&args)
            .output()
            .await
            .context("Failed to run isolate")?;

        // Parse meta file
        let meta_content = fs::read_to_string(&meta_file).await.unwrap_or_default();
        let meta = parse_meta(&meta_content);
        let _ = fs::remove_file(&meta_file).await;

        let (stdout, stdout_truncated) = read_prefix(&stdout_path, limits.output_bytes).await;
        let (stderr, _) = read_prefix(&stderr_path, crate::runner::STDERR_LIMIT_BYTES).await;

        Ok(SandboxOutcome {
            meta,
            stdout,
            stdout_truncated,
            stderr,
        })
    }

    /// Cleanup the isolate box
    pub async fn cleanup(self) -> Result<()> {
        Command::new("isolate")
            .args(["--box-id", &self.box_id.to_string(), "--cleanup"])
            .output()
            .await?;
        debug!("Cleaned up isolate box {}", self.box_id);
        Ok(())
    }
}

/// Read at most `cap` bytes of a file; missing files read as empty
async fn read_prefix(path: &str, cap: usize) -> (String, bool) {
    let Ok(file) = fs::File::open(path).await else {
        return (String::new(), false);
    };
    let mut buf = Vec::new();
    if file.take(cap as u64 + 1).read_to_end(&mut buf).await.is_err() {
        return (String::new(), false);
    }
    let truncated = buf.len() > cap;
    buf.truncate(cap);
    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}
