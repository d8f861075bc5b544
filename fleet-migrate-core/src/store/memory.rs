//! In-memory `StateStore` used by tests and as a reference implementation.
//! Uses a per-`job_id` `tokio::sync::Mutex` to serialize
//! `update_tenant_result`, the same shape the teacher uses a PostgreSQL
//! advisory lock for around a different kind of concurrent access.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{Job, Status, TenantResult};
use crate::store::{apply_tenant_result, not_found, StateStore};

#[derive(Default)]
pub struct InMemoryStateStore {
    jobs: DashMap<String, Job>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_job(&self, job: Job) -> Result<()> {
        self.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.get(job_id).map(|r| r.clone()))
    }

    async fn update_job_status(&self, job_id: &str, status: Status) -> Result<()> {
        let mut job = self.jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        job.status = status;
        Ok(())
    }

    async fn update_tenant_result(&self, job_id: &str, result: TenantResult) -> Result<()> {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        let mut job = self.jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        apply_tenant_result(&mut job, result)
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|r| r.value().clone()).collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn delete_job(&self, job_id: &str) -> Result<bool> {
        Ok(self.jobs.remove(job_id).is_some())
    }
}
