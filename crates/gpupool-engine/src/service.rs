//! Submission, query, and cancellation facade
//!
//! The surface the API layer talks to. Validation happens here, before
//! anything reaches the store; allocation itself stays with the scheduler
//! workers, which this facade kicks whenever new work or capacity arrives.

use gpupool_core::{
    CostInterval, GpuResource, GpuStatus, Job, JobStatus, Organization, PoolError, PoolResult,
};
use gpupool_store::PoolStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use crate::lifecycle::LifecycleOrchestrator;

/// New job submission
#[derive(Debug, Clone, Deserialize)]
pub struct NewJobRequest {
    /// Resolved tenant id (authentication happens upstream)
    pub organization_id: Uuid,
    /// Work descriptor
    pub model: String,
    /// Memory the job needs, in MiB
    pub memory_required_mb: u64,
    /// Required hardware type, if any
    #[serde(default)]
    pub gpu_type: Option<String>,
    /// Higher schedules first
    #[serde(default)]
    pub priority: i32,
}

/// Operator GPU provisioning request
#[derive(Debug, Clone, Deserialize)]
pub struct NewGpuRequest {
    pub organization_id: Uuid,
    pub gpu_type: String,
    pub memory_total_mb: u64,
    pub cost_per_hour: f64,
    #[serde(default)]
    pub is_spot: bool,
    #[serde(default)]
    pub termination_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Completion/failure signal from the compute collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Per-organization cost summary
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub organization_id: Uuid,
    /// Sum of closed interval totals
    pub total_cost: f64,
    /// Intervals still accruing
    pub open_intervals: usize,
    pub intervals: Vec<CostInterval>,
}

/// Engine counters for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub jobs: HashMap<JobStatus, usize>,
    pub gpus: HashMap<GpuStatus, usize>,
}

/// Facade over the engine for the API layer
#[derive(Clone)]
pub struct PoolService {
    store: Arc<dyn PoolStore>,
    lifecycle: Arc<LifecycleOrchestrator>,
    kick: Arc<Notify>,
}

impl PoolService {
    /// Create the facade
    pub fn new(
        store: Arc<dyn PoolStore>,
        lifecycle: Arc<LifecycleOrchestrator>,
        kick: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            kick,
        }
    }

    /// Register a new organization
    pub async fn create_organization(&self, name: String) -> PoolResult<Organization> {
        if name.trim().is_empty() {
            return Err(PoolError::Validation("organization name is empty".to_string()));
        }
        let org = Organization::new(name);
        self.store.insert_organization(org.clone()).await?;
        info!(organization_id = %org.id, name = %org.name, "Organization created");
        Ok(org)
    }

    /// Fetch an organization
    pub async fn get_organization(&self, id: Uuid) -> PoolResult<Organization> {
        self.store
            .get_organization(id)
            .await?
            .ok_or_else(|| PoolError::OrganizationNotFound(id.to_string()))
    }

    /// Provision a GPU resource into an organization's pool
    pub async fn register_gpu(&self, req: NewGpuRequest) -> PoolResult<GpuResource> {
        if req.gpu_type.trim().is_empty() {
            return Err(PoolError::Validation("gpu_type is empty".to_string()));
        }
        if req.memory_total_mb == 0 {
            return Err(PoolError::Validation(
                "memory_total_mb must be positive".to_string(),
            ));
        }
        if !(req.cost_per_hour.is_finite() && req.cost_per_hour >= 0.0) {
            return Err(PoolError::Validation(
                "cost_per_hour must be a non-negative number".to_string(),
            ));
        }
        self.get_organization(req.organization_id).await?;

        let mut gpu = GpuResource::new(
            req.organization_id,
            req.gpu_type,
            req.memory_total_mb,
            req.cost_per_hour,
        );
        gpu.is_spot = req.is_spot;
        gpu.termination_time = req.termination_time;
        self.store.insert_gpu(gpu.clone()).await?;
        info!(
            gpu_id = %gpu.id,
            organization_id = %gpu.organization_id,
            gpu_type = %gpu.gpu_type,
            "GPU resource registered"
        );
        // New capacity may unblock queued jobs
        self.kick.notify_one();
        Ok(gpu)
    }

    /// All GPU resources for an organization
    pub async fn list_gpus(&self, organization_id: Uuid) -> PoolResult<Vec<GpuResource>> {
        self.get_organization(organization_id).await?;
        self.store.list_gpus(organization_id).await
    }

    /// Telemetry heartbeat for a resource; touches `last_active` only
    pub async fn record_gpu_heartbeat(&self, gpu_id: Uuid) -> PoolResult<()> {
        self.store
            .record_gpu_heartbeat(gpu_id, chrono::Utc::now())
            .await
    }

    /// Validate and queue a job, then kick the scheduler
    pub async fn submit_job(&self, req: NewJobRequest) -> PoolResult<Job> {
        if req.model.trim().is_empty() {
            return Err(PoolError::Validation("model is empty".to_string()));
        }
        if req.memory_required_mb == 0 {
            return Err(PoolError::Validation(
                "memory_required_mb must be positive".to_string(),
            ));
        }
        if let Some(ref gpu_type) = req.gpu_type {
            if gpu_type.trim().is_empty() {
                return Err(PoolError::Validation("gpu_type is empty".to_string()));
            }
        }
        self.get_organization(req.organization_id).await?;

        let mut job = Job::new(
            req.organization_id,
            req.model,
            req.memory_required_mb,
            req.priority,
        );
        job.gpu_type = req.gpu_type;
        self.store.insert_job(job.clone()).await?;
        info!(
            job_id = %job.id,
            organization_id = %job.organization_id,
            memory_required_mb = job.memory_required_mb,
            priority = job.priority,
            "Job queued"
        );
        self.kick.notify_one();
        Ok(job)
    }

    /// Fetch a job
    pub async fn get_job(&self, id: Uuid) -> PoolResult<Job> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| PoolError::JobNotFound(id.to_string()))
    }

    /// Jobs for an organization, optionally filtered by status
    pub async fn list_jobs(
        &self,
        organization_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> PoolResult<Vec<Job>> {
        self.get_organization(organization_id).await?;
        self.store.list_jobs(organization_id, status, limit).await
    }

    /// Cancel a job by id
    pub async fn cancel_job(&self, id: Uuid) -> PoolResult<Job> {
        let job = self.lifecycle.cancel_job(id).await?;
        // The freed resource may fit another queued job
        self.kick.notify_one();
        Ok(job)
    }

    /// Apply the compute collaborator's completion/failure signal
    pub async fn report_execution(&self, id: Uuid, report: ExecutionReport) -> PoolResult<Job> {
        let job = if report.success {
            self.lifecycle.complete_job(id).await?
        } else {
            let message = report
                .error_message
                .unwrap_or_else(|| "execution failed".to_string());
            self.lifecycle.fail_job(id, message).await?
        };
        self.kick.notify_one();
        Ok(job)
    }

    /// Per-organization cost summary
    pub async fn usage(&self, organization_id: Uuid) -> PoolResult<UsageReport> {
        self.get_organization(organization_id).await?;
        let intervals = self.store.list_intervals(organization_id).await?;
        let total_cost = intervals.iter().filter_map(|i| i.total_cost).sum();
        let open_intervals = intervals.iter().filter(|i| i.is_open()).count();
        Ok(UsageReport {
            organization_id,
            total_cost,
            open_intervals,
            intervals,
        })
    }

    /// Engine counters
    pub async fn status(&self) -> PoolResult<EngineStatus> {
        Ok(EngineStatus {
            jobs: self.store.count_jobs_by_status().await?,
            gpus: self.store.count_gpus_by_status().await?,
        })
    }
}
