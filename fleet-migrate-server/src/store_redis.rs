//! Redis-backed `StateStore`: the production implementation of C3. Job
//! records live at `migration:job:<job_id>` as JSON with the TTL renewed on
//! every write; a sorted set `migration:jobs:index` (score = `started_at` as
//! unix millis) makes `ListJobs` a cheap `ZREVRANGE` instead of a `SCAN`.
//!
//! `update_tenant_result` takes a short-lived distributed lock
//! (`SET key NX PX` + a retry loop with exponential backoff and jitter, the
//! same shape `waypoint-core`'s connection retry uses for a different kind
//! of transient contention) around its read-modify-write, since multiple
//! Tenant Workers across multiple processes call it concurrently for the
//! same job (spec §5's concurrency note).

use std::time::Duration;

use async_trait::async_trait;
use fleet_migrate_core::error::{OrchestratorError, Result};
use fleet_migrate_core::model::{Job, Status, TenantResult};
use fleet_migrate_core::store::{apply_tenant_result, job_key, not_found, StateStore};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const INDEX_KEY: &str = "migration:jobs:index";
const LOCK_RETRIES: u32 = 50;

pub struct RedisStateStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| OrchestratorError::store(format!("invalid redis url: {}", e)))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| OrchestratorError::store(format!("failed to connect to redis: {}", e)))?;
        Ok(RedisStateStore { conn, ttl_secs })
    }

    fn serialize(job: &Job) -> Result<String> {
        serde_json::to_string(job).map_err(|e| OrchestratorError::store(e.to_string()))
    }

    fn deserialize(raw: &str) -> Result<Job> {
        serde_json::from_str(raw).map_err(|e| OrchestratorError::store(e.to_string()))
    }

    async fn write_job(&self, job: &Job) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = job_key(&job.job_id);
        let payload = Self::serialize(job)?;
        let () = conn
            .set_ex(&key, payload, self.ttl_secs)
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;
        let score = job.started_at.timestamp_millis() as f64;
        let _: i64 = conn
            .zadd(INDEX_KEY, &job.job_id, score)
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;
        Ok(())
    }

    /// Acquires `migration:lock:<job_id>` with `SET NX PX`, retrying with
    /// exponential backoff and jitter up to `LOCK_RETRIES` times. Returns a
    /// guard whose drop releases the lock.
    async fn acquire_lock(&self, job_id: &str) -> Result<LockGuard<'_>> {
        let lock_key = format!("migration:lock:{}", job_id);
        let mut conn = self.conn.clone();
        let token: String = format!("{:016x}", fastrand::u64(..));

        for attempt in 0..LOCK_RETRIES {
            let acquired: bool = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(5_000)
                .query_async::<_, Option<String>>(&mut conn)
                .await
                .map_err(|e| OrchestratorError::store(e.to_string()))?
                .is_some();
            if acquired {
                return Ok(LockGuard {
                    store: self,
                    lock_key,
                    token,
                });
            }
            let base_delay_ms = std::cmp::min(1u64 << attempt, 200);
            let jitter_ms = fastrand::u64(0..50);
            tokio::time::sleep(Duration::from_millis(base_delay_ms + jitter_ms)).await;
        }

        Err(OrchestratorError::store(format!(
            "could not acquire lock for job '{}' after {} attempts",
            job_id, LOCK_RETRIES
        )))
    }

    async fn release_lock(&self, lock_key: &str, token: &str) {
        // Only release if we still hold it (token matches) — a compare-and-delete
        // guards against releasing a lock some other holder has since acquired
        // after our own lease expired.
        let mut conn = self.conn.clone();
        let script = redis::Script::new(
            r"
            if redis.call('get', KEYS[1]) == ARGV[1] then
                return redis.call('del', KEYS[1])
            else
                return 0
            end
            ",
        );
        let _: std::result::Result<i64, _> = script.key(lock_key).arg(token).invoke_async(&mut conn).await;
    }
}

struct LockGuard<'a> {
    store: &'a RedisStateStore,
    lock_key: String,
    token: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let store = self.store;
        let lock_key = self.lock_key.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            store.release_lock(&lock_key, &token).await;
        });
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn create_job(&self, job: Job) -> Result<()> {
        self.write_job(&job).await
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(job_key(job_id))
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;
        raw.map(|r| Self::deserialize(&r)).transpose()
    }

    async fn update_job_status(&self, job_id: &str, status: Status) -> Result<()> {
        let _guard = self.acquire_lock(job_id).await?;
        let mut job = self.get_job(job_id).await?.ok_or_else(|| not_found(job_id))?;
        job.status = status;
        self.write_job(&job).await
    }

    async fn update_tenant_result(&self, job_id: &str, result: TenantResult) -> Result<()> {
        let _guard = self.acquire_lock(job_id).await?;
        let mut job = self.get_job(job_id).await?.ok_or_else(|| not_found(job_id))?;
        apply_tenant_result(&mut job, result)?;
        self.write_job(&job).await
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(INDEX_KEY, 0, limit.saturating_sub(1) as isize)
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.get_job(&id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(job_key(job_id))
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;
        let _: i64 = conn
            .zrem(INDEX_KEY, job_id)
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;
        Ok(removed > 0)
    }
}
