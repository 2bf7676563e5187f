//! Store trait and conditional-update primitives
//!
//! The store is the single arbiter of concurrent state changes. Every
//! mutation of a shared record goes through a compare-and-swap method that
//! checks the expected status and applies a patch in one atomic step; there
//! is no read-then-write path. Backends must make each CAS atomic at their
//! own boundary (a guarded `UPDATE ... WHERE status = ?` or equivalent).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpupool_core::{
    CostInterval, GpuResource, GpuStatus, Job, JobStatus, Organization, PoolResult,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of a conditional update
#[derive(Debug, Clone)]
pub enum CasOutcome<T> {
    /// The precondition held and the patch was applied; carries the new record
    Applied(T),
    /// The precondition no longer held; nothing was written
    Conflict,
}

impl<T> CasOutcome<T> {
    /// The updated record, if the update applied
    pub fn applied(self) -> Option<T> {
        match self {
            CasOutcome::Applied(value) => Some(value),
            CasOutcome::Conflict => None,
        }
    }

    /// Whether the update applied
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied(_))
    }
}

/// Field changes applied to a [`GpuResource`] under a status precondition
#[derive(Debug, Clone, Default)]
pub struct GpuPatch {
    pub status: Option<GpuStatus>,
    pub memory_allocated_mb: Option<u64>,
    /// `Some(None)` clears the job reference
    pub active_job_id: Option<Option<Uuid>>,
    pub last_active: Option<DateTime<Utc>>,
}

impl GpuPatch {
    /// Patch for `available -> busy`: ties the resource to `job_id` and
    /// charges the job's memory against it
    pub fn reserve(job_id: Uuid, memory_mb: u64) -> Self {
        Self {
            status: Some(GpuStatus::Busy),
            memory_allocated_mb: Some(memory_mb),
            active_job_id: Some(Some(job_id)),
            last_active: None,
        }
    }

    /// Patch for `busy -> available`: clears the job reference and the
    /// memory charge
    pub fn release() -> Self {
        Self {
            status: Some(GpuStatus::Available),
            memory_allocated_mb: Some(0),
            active_job_id: Some(None),
            last_active: None,
        }
    }

    /// Apply the patch to a record
    pub fn apply(&self, gpu: &mut GpuResource) {
        if let Some(status) = self.status {
            gpu.status = status;
        }
        if let Some(memory) = self.memory_allocated_mb {
            gpu.memory_allocated_mb = memory;
        }
        if let Some(job_id) = self.active_job_id {
            gpu.active_job_id = job_id;
        }
        if let Some(at) = self.last_active {
            gpu.last_active = Some(at);
        }
    }
}

/// Field changes applied to a [`Job`] under a status precondition
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub gpu_id: Option<Option<Uuid>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<Option<String>>,
}

impl JobPatch {
    /// Patch for `queued -> running`
    pub fn start(gpu_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            gpu_id: Some(Some(gpu_id)),
            started_at: Some(started_at),
            completed_at: None,
            error_message: None,
        }
    }

    /// Patch for a terminal transition; `gpu_id` is left as-is for audit
    pub fn finish(
        status: JobStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            status: Some(status),
            gpu_id: None,
            started_at: None,
            completed_at: Some(completed_at),
            error_message: Some(error_message),
        }
    }

    /// Apply the patch to a record
    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(gpu_id) = self.gpu_id {
            job.gpu_id = gpu_id;
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(ref message) = self.error_message {
            job.error_message = message.clone();
        }
    }
}

/// Durable store of organizations, GPU resources, jobs, and cost intervals
#[async_trait]
pub trait PoolStore: Send + Sync {
    // Organizations

    /// Insert a new organization
    async fn insert_organization(&self, org: Organization) -> PoolResult<()>;

    /// Fetch an organization by id
    async fn get_organization(&self, id: Uuid) -> PoolResult<Option<Organization>>;

    // GPU resources

    /// Insert a new GPU resource
    async fn insert_gpu(&self, gpu: GpuResource) -> PoolResult<()>;

    /// Fetch a GPU resource by id
    async fn get_gpu(&self, id: Uuid) -> PoolResult<Option<GpuResource>>;

    /// All GPU resources owned by an organization
    async fn list_gpus(&self, organization_id: Uuid) -> PoolResult<Vec<GpuResource>>;

    /// Atomically patch a GPU resource if its status still matches `expected`
    async fn update_gpu_if_status(
        &self,
        id: Uuid,
        expected: GpuStatus,
        patch: GpuPatch,
    ) -> PoolResult<CasOutcome<GpuResource>>;

    /// Record a telemetry heartbeat; does not touch scheduling state
    async fn record_gpu_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> PoolResult<()>;

    /// GPU counts keyed by status
    async fn count_gpus_by_status(&self) -> PoolResult<HashMap<GpuStatus, usize>>;

    // Jobs

    /// Insert a new job
    async fn insert_job(&self, job: Job) -> PoolResult<()>;

    /// Fetch a job by id
    async fn get_job(&self, id: Uuid) -> PoolResult<Option<Job>>;

    /// Jobs for an organization, optionally filtered by status, newest first
    async fn list_jobs(
        &self,
        organization_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> PoolResult<Vec<Job>>;

    /// Queued jobs across all organizations, ordered by priority descending
    /// then creation time ascending
    async fn list_queued_jobs(&self, limit: usize) -> PoolResult<Vec<Job>>;

    /// Atomically patch a job if its status still matches `expected`
    async fn update_job_if_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        patch: JobPatch,
    ) -> PoolResult<CasOutcome<Job>>;

    /// Job counts keyed by status
    async fn count_jobs_by_status(&self) -> PoolResult<HashMap<JobStatus, usize>>;

    // Cost intervals

    /// Insert a new interval; fails if the job already has one
    async fn insert_interval(&self, interval: CostInterval) -> PoolResult<()>;

    /// The open interval for a job, if one exists
    async fn get_open_interval(&self, job_id: Uuid) -> PoolResult<Option<CostInterval>>;

    /// Atomically close a job's interval if it is still open
    async fn close_interval_if_open(
        &self,
        job_id: Uuid,
        end_time: DateTime<Utc>,
        total_cost: f64,
    ) -> PoolResult<CasOutcome<CostInterval>>;

    /// All intervals for an organization, oldest first
    async fn list_intervals(&self, organization_id: Uuid) -> PoolResult<Vec<CostInterval>>;
}
