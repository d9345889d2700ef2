//! Worker configuration from environment variables

use anyhow::{bail, Context, Result};

use crate::executor::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MEMORY_LIMIT_MB};
use crate::runner::Isolation;

/// Execution backend for submitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBackend {
    /// Hardened child process
    Process,
    /// IOI isolate box (requires cgroups)
    Isolate,
}

impl std::str::FromStr for SandboxBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "process" => Ok(SandboxBackend::Process),
            "isolate" => Ok(SandboxBackend::Isolate),
            other => bail!("Unknown sandbox backend '{}', expected process or isolate", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub sandbox: SandboxBackend,
    pub memory_limit_mb: u32,
    pub max_parallel_tests: usize,
    pub max_concurrent_jobs: usize,
    pub max_output_bytes: usize,
    pub isolation: Isolation,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".into(),
            sandbox: SandboxBackend::Process,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_parallel_tests: 1,
            max_concurrent_jobs: 4,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            isolation: Isolation::Required,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let parse = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {}: {}", key, value)),
                None => Ok(default),
            }
        };

        let sandbox = match lookup("CHECKER_SANDBOX") {
            Some(value) => value.parse()?,
            None => defaults.sandbox,
        };
        let isolation = match lookup("CHECKER_ISOLATION") {
            Some(value) => value.parse()?,
            None => defaults.isolation,
        };
        let memory_limit_mb = u32::try_from(parse(
            "CHECKER_MEMORY_LIMIT_MB",
            defaults.memory_limit_mb as usize,
        )?)
        .context("CHECKER_MEMORY_LIMIT_MB out of range")?;

        let config = Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            sandbox,
            memory_limit_mb,
            max_parallel_tests: parse("CHECKER_MAX_PARALLEL_TESTS", defaults.max_parallel_tests)?,
            max_concurrent_jobs: parse(
                "CHECKER_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            )?,
            max_output_bytes: parse("CHECKER_MAX_OUTPUT_KB", defaults.max_output_bytes / 1024)?
                .saturating_mul(1024),
            isolation,
        };

        if config.memory_limit_mb == 0 {
            bail!("CHECKER_MEMORY_LIMIT_MB must be greater than 0");
        }
        if config.max_parallel_tests == 0 || config.max_concurrent_jobs == 0 {
            bail!("CHECKER_MAX_PARALLEL_TESTS and CHECKER_MAX_CONCURRENT_JOBS must be at least 1");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.sandbox, SandboxBackend::Process);
        assert_eq!(config.memory_limit_mb, 256);
        assert_eq!(config.max_parallel_tests, 1);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.max_output_bytes, 1024 * 1024);
        assert_eq!(config.isolation, Isolation::Required);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("CHECKER_SANDBOX", "isolate"),
            ("CHECKER_MEMORY_LIMIT_MB", "512"),
            ("CHECKER_MAX_PARALLEL_TESTS", "4"),
            ("CHECKER_MAX_OUTPUT_KB", "64"),
            ("CHECKER_ISOLATION", "best-effort"),
            ("REDIS_URL", "redis://redis:6379"),
        ])
        .unwrap();
        assert_eq!(config.sandbox, SandboxBackend::Isolate);
        assert_eq!(config.memory_limit_mb, 512);
        assert_eq!(config.max_parallel_tests, 4);
        assert_eq!(config.max_output_bytes, 64 * 1024);
        assert_eq!(config.isolation, Isolation::BestEffort);
        assert_eq!(config.redis_url, "redis://redis:6379");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("CHECKER_SANDBOX", "docker")]).is_err());
        assert!(load(&[("CHECKER_MEMORY_LIMIT_MB", "lots")]).is_err());
        assert!(load(&[("CHECKER_MAX_CONCURRENT_JOBS", "0")]).is_err());
        assert!(load(&[("CHECKER_ISOLATION", "off")]).is_err());
    }
}
