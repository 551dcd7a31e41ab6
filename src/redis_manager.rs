//! Redis Manager - queue, result and worker lease plumbing
//!
//! - Worker ID allocation and lease management
//! - Job queue operations (BLPOP)
//! - Result storage and publishing

use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::jobs::{JobResult, WorkerJob};

/// Redis key constants
pub mod keys {
    /// Worker lease key prefix for distributed worker ID allocation
    pub const WORKER_LEASE_PREFIX: &str = "arena:worker:lease:";

    /// Job queue key
    pub const QUEUE: &str = "arena:queue";

    /// Result key prefix (for polling)
    pub const RESULT_PREFIX: &str = "arena:result:";

    /// Result channel (for pub/sub)
    pub const RESULT_CHANNEL: &str = "arena:results";
}

const MAX_WORKERS: u32 = 10;
const WORKER_LEASE_TTL_SECS: u64 = 120;
const RESULT_EXPIRY_SECS: u64 = 3600;

pub fn result_key(request_id: &str) -> String {
    format!("{}{}", keys::RESULT_PREFIX, request_id)
}

pub fn lease_key(worker_id: u32) -> String {
    format!("{}{}", keys::WORKER_LEASE_PREFIX, worker_id)
}

/// A raw queue entry that is not a job we know is logged and dropped.
pub fn decode_job(raw: &str) -> Option<WorkerJob> {
    match serde_json::from_str::<WorkerJob>(raw) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("Failed to parse job data: {}. Data: {}", e, raw);
            None
        }
    }
}

pub struct RedisManager {
    worker_id: u32,
    client: redis::Client,
    conn: MultiplexedConnection,
    lease_handle: JoinHandle<()>,
}

impl RedisManager {
    /// Connect, claim a free worker id and keep its lease alive.
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

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    /// Block until the next decodable job arrives. Reconnects on failure.
    pub async fn pop_job(&mut self) -> Result<WorkerJob> {
        loop {
            let popped: Option<(String, String)> =
                match self.conn.blpop(keys::QUEUE, 0.0).await {
                    Ok(res) => res,
                    Err(e) => {
                        warn!("Redis BLPOP failed: {}. Reconnecting...", e);
                        self.reconnect().await?;
                        continue;
                    }
                };

            if let Some(job) = popped.and_then(|(_, raw)| decode_job(&raw)) {
                return Ok(job);
            }
        }
    }

    /// Store a result for polling (1 hour) and publish it for subscribers.
    pub async fn store_result(&mut self, result: &JobResult) -> Result<()> {
        let json = serde_json::to_string(result).context("Failed to encode job result")?;
        let key = result_key(&result.request_id);

        if let Err(e) = self
            .conn
            .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store result: {}. Reconnecting...", e);
            self.reconnect().await?;
            self.conn
                .set_ex::<_, _, ()>(&key, &json, RESULT_EXPIRY_SECS)
                .await
                .with_context(|| format!("Failed to store result {}", key))?;
        }

        // there may be no subscribers
        let _ = self
            .conn
            .publish::<_, _, ()>(keys::RESULT_CHANNEL, &json)
            .await;

        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.conn = get_connection_with_retry(&self.client).await?;
        Ok(())
    }
}

impl Drop for RedisManager {
    fn drop(&mut self) {
        self.lease_handle.abort();
    }
}

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

/// Claim the first free worker id with SET NX EX.
async fn allocate_worker_id(client: &redis::Client) -> Result<u32> {
    loop {
        let mut conn = get_connection_with_retry(client).await?;

        for worker_id in 0..MAX_WORKERS {
            let claimed: Option<String> = redis::cmd("SET")
                .arg(lease_key(worker_id))
                .arg("claimed")
                .arg("NX")
                .arg("EX")
                .arg(WORKER_LEASE_TTL_SECS as usize)
                .query_async(&mut conn)
                .await
                .context("Failed to claim worker lease")?;

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

fn spawn_lease_heartbeat(client: redis::Client, worker_id: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(WORKER_LEASE_TTL_SECS / 2);

        loop {
            tokio::time::sleep(interval).await;

            match get_connection_with_retry(&client).await {
                Ok(mut conn) => {
                    if let Err(e) = redis::cmd("EXPIRE")
                        .arg(lease_key(worker_id))
                        .arg(WORKER_LEASE_TTL_SECS as usize)
                        .query_async::<()>(&mut conn)
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
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(result_key("abc"), "arena:result:abc");
        assert_eq!(lease_key(3), "arena:worker:lease:3");
    }

    #[test]
    fn test_decode_job() {
        let job = decode_job(r#"{"job_type":"evaluate_badges","request_id":"b1","game_session_id":4}"#);
        assert!(matches!(job, Some(WorkerJob::EvaluateBadges(ref j)) if j.game_session_id == 4));
        assert!(decode_job("not json").is_none());
        assert!(decode_job(r#"{"job_type":"unknown","request_id":"x"}"#).is_none());
    }
}
