//! In-memory store implementation
//!
//! Reference backend used in development and tests. A single `RwLock` over
//! the record maps makes every conditional update atomic, which is exactly
//! the arbiter role a relational backend plays with guarded updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpupool_core::{
    CostInterval, GpuResource, GpuStatus, Job, JobStatus, Organization, PoolError, PoolResult,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{CasOutcome, GpuPatch, JobPatch, PoolStore};

#[derive(Default)]
struct Inner {
    organizations: HashMap<Uuid, Organization>,
    gpus: HashMap<Uuid, GpuResource>,
    jobs: HashMap<Uuid, Job>,
    intervals: HashMap<Uuid, CostInterval>,
}

/// In-memory [`PoolStore`] backend
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn insert_organization(&self, org: Organization) -> PoolResult<()> {
        let mut inner = self.inner.write().await;
        inner.organizations.insert(org.id, org);
        Ok(())
    }

    async fn get_organization(&self, id: Uuid) -> PoolResult<Option<Organization>> {
        let inner = self.inner.read().await;
        Ok(inner.organizations.get(&id).cloned())
    }

    async fn insert_gpu(&self, gpu: GpuResource) -> PoolResult<()> {
        let mut inner = self.inner.write().await;
        inner.gpus.insert(gpu.id, gpu);
        Ok(())
    }

    async fn get_gpu(&self, id: Uuid) -> PoolResult<Option<GpuResource>> {
        let inner = self.inner.read().await;
        Ok(inner.gpus.get(&id).cloned())
    }

    async fn list_gpus(&self, organization_id: Uuid) -> PoolResult<Vec<GpuResource>> {
        let inner = self.inner.read().await;
        let mut gpus: Vec<GpuResource> = inner
            .gpus
            .values()
            .filter(|g| g.organization_id == organization_id)
            .cloned()
            .collect();
        gpus.sort_by_key(|g| g.id);
        Ok(gpus)
    }

    async fn update_gpu_if_status(
        &self,
        id: Uuid,
        expected: GpuStatus,
        patch: GpuPatch,
    ) -> PoolResult<CasOutcome<GpuResource>> {
        let mut inner = self.inner.write().await;
        let gpu = inner
            .gpus
            .get_mut(&id)
            .ok_or_else(|| PoolError::ResourceNotFound(id.to_string()))?;

        if gpu.status != expected {
            return Ok(CasOutcome::Conflict);
        }

        let mut updated = gpu.clone();
        patch.apply(&mut updated);
        if updated.memory_allocated_mb > updated.memory_total_mb {
            return Err(PoolError::Validation(format!(
                "memory_allocated_mb {} exceeds memory_total_mb {} on resource {}",
                updated.memory_allocated_mb, updated.memory_total_mb, id
            )));
        }

        *gpu = updated.clone();
        Ok(CasOutcome::Applied(updated))
    }

    async fn record_gpu_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> PoolResult<()> {
        let mut inner = self.inner.write().await;
        let gpu = inner
            .gpus
            .get_mut(&id)
            .ok_or_else(|| PoolError::ResourceNotFound(id.to_string()))?;
        gpu.last_active = Some(at);
        Ok(())
    }

    async fn count_gpus_by_status(&self) -> PoolResult<HashMap<GpuStatus, usize>> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for gpu in inner.gpus.values() {
            *counts.entry(gpu.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_job(&self, job: Job) -> PoolResult<()> {
        let mut inner = self.inner.write().await;
        inner.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> PoolResult<Option<Job>> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn list_jobs(
        &self,
        organization_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> PoolResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.organization_id == organization_id)
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn list_queued_jobs(&self, limit: usize) -> PoolResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn update_job_if_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        patch: JobPatch,
    ) -> PoolResult<CasOutcome<Job>> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| PoolError::JobNotFound(id.to_string()))?;

        if job.status != expected {
            return Ok(CasOutcome::Conflict);
        }

        patch.apply(job);
        Ok(CasOutcome::Applied(job.clone()))
    }

    async fn count_jobs_by_status(&self) -> PoolResult<HashMap<JobStatus, usize>> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for job in inner.jobs.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_interval(&self, interval: CostInterval) -> PoolResult<()> {
        let mut inner = self.inner.write().await;
        if inner.intervals.values().any(|i| i.job_id == interval.job_id) {
            return Err(PoolError::Internal(format!(
                "cost interval already exists for job {}",
                interval.job_id
            )));
        }
        inner.intervals.insert(interval.id, interval);
        Ok(())
    }

    async fn get_open_interval(&self, job_id: Uuid) -> PoolResult<Option<CostInterval>> {
        let inner = self.inner.read().await;
        Ok(inner
            .intervals
            .values()
            .find(|i| i.job_id == job_id && i.is_open())
            .cloned())
    }

    async fn close_interval_if_open(
        &self,
        job_id: Uuid,
        end_time: DateTime<Utc>,
        total_cost: f64,
    ) -> PoolResult<CasOutcome<CostInterval>> {
        let mut inner = self.inner.write().await;
        let interval = inner
            .intervals
            .values_mut()
            .find(|i| i.job_id == job_id && i.is_open());

        match interval {
            Some(interval) => {
                interval.end_time = Some(end_time);
                interval.total_cost = Some(total_cost);
                Ok(CasOutcome::Applied(interval.clone()))
            }
            None => Ok(CasOutcome::Conflict),
        }
    }

    async fn list_intervals(&self, organization_id: Uuid) -> PoolResult<Vec<CostInterval>> {
        let inner = self.inner.read().await;
        let mut intervals: Vec<CostInterval> = inner
            .intervals
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        intervals.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(intervals)
    }
}
