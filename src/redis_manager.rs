//! Redis Manager - Centralized Redis connection and operations
//!
//! This module handles all Redis-related operations including:
//! - Worker ID allocation and lease management
//! - Job queue operations (BLPOP)
//! - Result storage and publishing
//! - Attempt counting per assignment and student

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::jobs::check::{AttemptCounter, CheckJobResult};
use crate::jobs::WorkerJob;

/// Redis key constants
pub mod keys {
    /// Worker lease key prefix for distributed worker ID allocation
    pub const WORKER_LEASE_PREFIX: &str = "checker:worker:lease:";

    /// Check job queue key
    pub const CHECK_QUEUE: &str = "checker:queue";

    /// Check result key prefix (for polling)
    pub const CHECK_RESULT_PREFIX: &str = "checker:result:";

    /// Check result channel (for pub/sub)
    pub const CHECK_RESULT_CHANNEL: &str = "checker:results";

    /// Attempt counter key prefix, followed by `{assignment_id}:{student_id}`
    pub const ATTEMPTS_PREFIX: &str = "checker:attempts:";

    pub fn result_key(submission_id: i64) -> String {
        format!("{}{}", CHECK_RESULT_PREFIX, submission_id)
    }

    pub fn attempts_key(assignment_id: i64, student_id: i64) -> String {
        format!("{}{}:{}", ATTEMPTS_PREFIX, assignment_id, student_id)
    }
}

/// Configuration constants
const MAX_WORKERS: u32 = 10;
const WORKER_LEASE_TTL_SECS: u64 = 120;
const RESULT_EXPIRY_SECS: u64 = 3600; // 1 hour

/// Centralized Redis manager for all Redis operations
pub struct RedisManager {
    worker_id: u32,
    client: redis::Client,
    conn: MultiplexedConnection,
    lease_handle: JoinHandle<()>,
}

impl RedisManager {
    /// Create a new RedisManager with the given Redis URL.
    ///
    /// This will:
    /// 1. Connect to Redis
    /// 2. Allocate a unique worker ID (0 to MAX_WORKERS-1)
    /// 3. Start a background task to keep the worker lease alive
    pub async fn with_url(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);

        let worker_id = allocate_worker_id(&client).await?;
        info!(
            "Allocated worker_id={} (lease {}s)",
            worker_id, WORKER_LEASE_TTL_SECS
        );

        let lease_handle = spawn_lease_heartbeat(client.clone(), worker_id);

        Ok(Self {
            worker_id,
            client,
            conn,
            lease_handle,
        })
    }

    /// Get the allocated worker ID
    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    /// A handle for storing results and counting attempts from job tasks
    pub fn result_store(&self) -> ResultStore {
        ResultStore {
            client: self.client.clone(),
            conn: self.conn.clone(),
        }
    }

    /// Block and wait for the next job from the queue.
    ///
    /// This uses BLPOP to efficiently wait for jobs without polling.
    /// Automatically reconnects on connection failure.
    pub async fn pop_job(&mut self) -> Result<WorkerJob> {
        loop {
            let result: Option<(String, String)> =
                match self.conn.blpop(keys::CHECK_QUEUE, 0.0).await {
                    Ok(res) => res,
                    Err(e) => {
                        warn!("Redis BLPOP failed: {}. Reconnecting...", e);
                        self.conn = get_connection_with_retry(&self.client).await?;
                        continue;
                    }
                };

            if let Some((_, job_data)) = result {
                match serde_json::from_str::<WorkerJob>(&job_data) {
                    Ok(job) => return Ok(job),
                    Err(e) => {
                        warn!("Failed to parse job data: {}. Data: {}", e, job_data);
                        continue;
                    }
                }
            }
        }
    }
}

impl Drop for RedisManager {
    fn drop(&mut self) {
        self.lease_handle.abort();
    }
}

/// Result storage and attempt counting, cloned into every job task
#[derive(Clone)]
pub struct ResultStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl ResultStore {
    /// Store a check result in Redis.
    ///
    /// The result is stored with a 1-hour expiration and also published
    /// to a channel for real-time subscribers.
    pub async fn store_check_result(&mut self, result: &CheckJobResult) -> Result<()> {
        let key = keys::result_key(result.submission_id);
        let json = serde_json::to_string(result)?;

        // Try to store, reconnect on failure
        if let Err(e) = self
            .conn
            .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store result: {}. Reconnecting...", e);
            self.reconnect().await?;
            self.conn
                .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
                .await?;
        }

        // Publish to channel (ignore errors as there may be no subscribers)
        let _ = self
            .conn
            .publish::<_, _, ()>(keys::CHECK_RESULT_CHANNEL, &json)
            .await;

        Ok(())
    }

    /// Reconnect to Redis
    async fn reconnect(&mut self) -> Result<()> {
        self.conn = get_connection_with_retry(&self.client).await?;
        Ok(())
    }
}

#[async_trait]
impl AttemptCounter for ResultStore {
    async fn record_attempt(&self, assignment_id: i64, student_id: i64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn
            .incr(keys::attempts_key(assignment_id, student_id), 1u64)
            .await
            .context("Failed to increment attempt counter")?;
        Ok(count)
    }
}

/// Get a Redis connection with retry logic
async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in 3 seconds...",
                    e
                );
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
        }
    }
}

/// Allocate a unique worker ID using Redis SET NX with expiration
async fn allocate_worker_id(client: &redis::Client) -> Result<u32> {
    loop {
        let mut conn = get_connection_with_retry(client).await?;

        for worker_id in 0..MAX_WORKERS {
            let key = format!("{}{}", keys::WORKER_LEASE_PREFIX, worker_id);
            let claimed: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg("claimed")
                .arg("NX")
                .arg("EX")
                .arg(WORKER_LEASE_TTL_SECS as usize)
                .query_async(&mut conn)
                .await?;

            if claimed.is_some() {
                return Ok(worker_id);
            }
        }

        warn!(
            "No free worker_id (0-{}). Retrying in 1 second...",
            MAX_WORKERS - 1
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Spawn a background task to keep the worker lease alive
fn spawn_lease_heartbeat(client: redis::Client, worker_id: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(WORKER_LEASE_TTL_SECS / 2);
        let key = format!("{}{}", keys::WORKER_LEASE_PREFIX, worker_id);

        loop {
            tokio::time::sleep(interval).await;

            match get_connection_with_retry(&client).await {
                Ok(mut conn) => {
                    if let Err(e) = conn
                        .expire::<_, ()>(&key, WORKER_LEASE_TTL_SECS as i64)
                        .await
                    {
                        warn!("Failed to refresh worker lease {}: {}", worker_id, e);
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to refresh worker lease {} (connection): {}",
                        worker_id, e
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::result_key(12), "checker:result:12");
        assert_eq!(keys::attempts_key(3, 44), "checker:attempts:3:44");
        assert_eq!(keys::CHECK_QUEUE, "checker:queue");
        assert_eq!(keys::CHECK_RESULT_CHANNEL, "checker:results");
    }
}
