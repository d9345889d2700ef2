use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use checker::config::{SandboxBackend, WorkerConfig};
use checker::jobs::check::process_check_job;
use checker::jobs::WorkerJob;
use checker::redis_manager::RedisManager;
use checker::runner::{Isolation, ProcessRunner, Runner, SandboxedRunner};
use checker::storage::StorageClient;
use checker::{languages, sandbox, Checker, SandboxedExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("checker=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env()?;

    languages::init_languages()?;
    info!(
        "Loaded language configurations: {}",
        languages::get_supported_languages().join(", ")
    );

    info!("Starting Checker Worker...");

    let mut redis = RedisManager::with_url(&config.redis_url).await?;

    // Initialize sandbox configuration with dynamic worker_id
    sandbox::init_config(redis.worker_id())?;
    info!("Sandbox config: worker_id={}", sandbox::get_config().worker_id);

    let runner: Arc<dyn Runner> = match config.sandbox {
        SandboxBackend::Isolate => {
            // Ensure we have cgroup support; fail fast otherwise
            sandbox::ensure_cgroups_available().await?;
            info!("Confirmed isolate cgroup support is available");
            Arc::new(SandboxedRunner::new())
        }
        SandboxBackend::Process => {
            if !ProcessRunner::namespaces_available().await {
                match config.isolation {
                    Isolation::Required => bail!(
                        "Cannot create user/network/PID namespaces for submitted code; \
                         set CHECKER_ISOLATION=best-effort to run without them"
                    ),
                    Isolation::BestEffort => warn!(
                        "Namespaces unavailable: submitted code runs with network access \
                         and can see worker processes"
                    ),
                }
            }
            info!("Using process runner (isolation: {:?})", config.isolation);
            Arc::new(ProcessRunner::new(config.isolation))
        }
    };

    let executor = SandboxedExecutor::new(runner)
        .with_memory_limit(config.memory_limit_mb)
        .with_max_output_bytes(config.max_output_bytes);

    let storage = StorageClient::from_env().await?;
    info!("Connected to MinIO storage");

    let checker = Arc::new(
        Checker::new(Arc::new(executor))
            .with_max_parallel(config.max_parallel_tests)
            .with_assignment_source(Arc::new(storage)),
    );

    let job_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
    info!(
        "Waiting for jobs (max {} concurrent, {} parallel tests each)...",
        config.max_concurrent_jobs, config.max_parallel_tests
    );

    loop {
        let permit = Arc::clone(&job_slots).acquire_owned().await?;
        let job = redis.pop_job().await?;

        let checker = Arc::clone(&checker);
        let mut store = redis.result_store();

        tokio::spawn(async move {
            let _permit = permit;
            match job {
                WorkerJob::Check(job) => {
                    info!(
                        "Received check job: submission_id={}, language={}, tests={}",
                        job.submission_id,
                        job.request.language(),
                        job.request.test_cases.len()
                    );

                    let result = process_check_job(&job, &checker, &store).await;
                    if let Err(e) = store.store_check_result(&result).await {
                        error!(
                            "Failed to store check result for {}: {:#}",
                            job.submission_id, e
                        );
                    } else {
                        info!(
                            "Stored check result: submission_id={}, status={:?}",
                            job.submission_id, result.status
                        );
                    }
                }
            }
        });
    }
}
