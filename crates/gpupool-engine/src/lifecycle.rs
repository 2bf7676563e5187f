//! Job status state machine
//!
//! Legal transitions: `queued -> running`, `queued -> cancelled`,
//! `running -> completed | failed | cancelled`. Every transition is a
//! conditional update on the job row, so when a cancel races an allocation
//! or a completion signal, whichever write reaches the store first wins and
//! the loser is rejected, logged, and discarded.

use chrono::Utc;
use gpupool_compute::ComputeBackend;
use gpupool_core::{GpuResource, Job, JobStatus, PoolError, PoolResult};
use gpupool_store::{CasOutcome, JobPatch, PoolStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::ResourceCatalog;
use crate::cost::CostTracker;

/// Drives job transitions and the resource release / cost close they imply
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    store: Arc<dyn PoolStore>,
    catalog: ResourceCatalog,
    cost: CostTracker,
    compute: Arc<dyn ComputeBackend>,
}

impl LifecycleOrchestrator {
    /// Create an orchestrator over the shared store handle
    pub fn new(
        store: Arc<dyn PoolStore>,
        catalog: ResourceCatalog,
        cost: CostTracker,
        compute: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            store,
            catalog,
            cost,
            compute,
        }
    }

    /// `queued -> running` after a successful reservation.
    ///
    /// Sets `gpu_id` and `started_at`, opens the cost interval with the
    /// resource's current price, and hands the job to the compute backend.
    /// If the job left the queue in the meantime (a cancel won the race) the
    /// reservation is rolled back and the loss is reported as
    /// [`PoolError::AllocationConflict`].
    pub async fn start_job(&self, job_id: Uuid, gpu: &GpuResource) -> PoolResult<Job> {
        let started_at = Utc::now();
        let outcome = self
            .store
            .update_job_if_status(job_id, JobStatus::Queued, JobPatch::start(gpu.id, started_at))
            .await?;

        let job = match outcome {
            CasOutcome::Applied(job) => job,
            CasOutcome::Conflict => {
                self.catalog.release(gpu.id).await?;
                return Err(PoolError::AllocationConflict(format!(
                    "job {} left the queue during allocation",
                    job_id
                )));
            }
        };

        info!(job_id = %job_id, gpu_id = %gpu.id, "Job started");
        self.cost
            .open(job.organization_id, job_id, gpu.id, gpu.cost_per_hour, started_at)
            .await?;

        if let Err(e) = self.compute.launch(&job, gpu).await {
            warn!(job_id = %job_id, error = %e, "Launch failed");
            return self.fail_job(job_id, format!("launch failed: {}", e)).await;
        }

        Ok(job)
    }

    /// `running -> completed` on the compute collaborator's success signal
    pub async fn complete_job(&self, job_id: Uuid) -> PoolResult<Job> {
        self.finish(job_id, JobStatus::Completed, None).await
    }

    /// `running -> failed` on a failure signal or a detected execution fault
    pub async fn fail_job(&self, job_id: Uuid, error_message: String) -> PoolResult<Job> {
        self.finish(job_id, JobStatus::Failed, Some(error_message))
            .await
    }

    /// `queued/running -> cancelled`.
    ///
    /// From `running` this behaves exactly like a failure for resource
    /// release and cost closing, plus a best-effort stop signal whose
    /// delivery failure never blocks the transition.
    pub async fn cancel_job(&self, job_id: Uuid) -> PoolResult<Job> {
        let cancelled_at = Utc::now();

        // Withdraw before allocation
        let queued_outcome = self
            .store
            .update_job_if_status(
                job_id,
                JobStatus::Queued,
                JobPatch::finish(JobStatus::Cancelled, cancelled_at, None),
            )
            .await?;
        if let CasOutcome::Applied(job) = queued_outcome {
            info!(job_id = %job_id, "Cancelled queued job");
            return Ok(job);
        }

        let outcome = self
            .store
            .update_job_if_status(
                job_id,
                JobStatus::Running,
                JobPatch::finish(JobStatus::Cancelled, cancelled_at, None),
            )
            .await?;

        match outcome {
            CasOutcome::Applied(job) => {
                if let Some(gpu_id) = job.gpu_id {
                    self.catalog.release(gpu_id).await?;
                }
                self.cost.close(job_id, cancelled_at).await?;
                if let Err(e) = self.compute.stop(&job).await {
                    warn!(job_id = %job_id, error = %e, "Stop signal delivery failed");
                }
                info!(job_id = %job_id, "Cancelled running job");
                Ok(job)
            }
            CasOutcome::Conflict => self.illegal(job_id, JobStatus::Cancelled).await,
        }
    }

    /// Terminal transition out of `running`, releasing the resource and
    /// closing the cost interval
    async fn finish(
        &self,
        job_id: Uuid,
        terminal: JobStatus,
        error_message: Option<String>,
    ) -> PoolResult<Job> {
        debug_assert!(JobStatus::Running.can_transition_to(terminal));
        let completed_at = Utc::now();

        let outcome = self
            .store
            .update_job_if_status(
                job_id,
                JobStatus::Running,
                JobPatch::finish(terminal, completed_at, error_message),
            )
            .await?;

        let job = match outcome {
            CasOutcome::Applied(job) => job,
            CasOutcome::Conflict => return self.illegal(job_id, terminal).await,
        };

        if let Some(gpu_id) = job.gpu_id {
            self.catalog.release(gpu_id).await?;
        }
        self.cost.close(job_id, completed_at).await?;
        info!(job_id = %job_id, status = %terminal, "Job finished");
        Ok(job)
    }

    /// Build the rejection for a transition whose precondition failed
    async fn illegal(&self, job_id: Uuid, to: JobStatus) -> PoolResult<Job> {
        let current = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PoolError::JobNotFound(job_id.to_string()))?;
        warn!(
            job_id = %job_id,
            from = %current.status,
            to = %to,
            "Rejected illegal transition"
        );
        Err(PoolError::IllegalTransition {
            job_id,
            from: current.status,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gpupool_compute::NoopBackend;
    use gpupool_core::GpuStatus;
    use gpupool_store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        catalog: ResourceCatalog,
        lifecycle: LifecycleOrchestrator,
    }

    fn harness_with_backend(compute: Arc<dyn ComputeBackend>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let handle: Arc<dyn PoolStore> = store.clone();
        let catalog = ResourceCatalog::new(handle.clone());
        let cost = CostTracker::new(handle.clone());
        let lifecycle = LifecycleOrchestrator::new(handle, catalog.clone(), cost, compute);
        Harness {
            store,
            catalog,
            lifecycle,
        }
    }

    fn harness() -> Harness {
        harness_with_backend(Arc::new(NoopBackend::new()))
    }

    async fn seeded_running_job(h: &Harness) -> (Job, GpuResource) {
        let org = Uuid::new_v4();
        let gpu = GpuResource::new(org, "t4".to_string(), 16384, 2.0);
        h.store.insert_gpu(gpu.clone()).await.unwrap();
        let job = Job::new(org, "phi-2".to_string(), 8000, 0);
        h.store.insert_job(job.clone()).await.unwrap();

        let reserved = h.catalog.reserve(gpu.id, job.id, 8000).await.unwrap();
        let running = h.lifecycle.start_job(job.id, &reserved).await.unwrap();
        (running, reserved)
    }

    #[tokio::test]
    async fn test_start_job_sets_running_and_opens_interval() {
        let h = harness();
        let (job, gpu) = seeded_running_job(&h).await;

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.gpu_id, Some(gpu.id));
        assert!(job.started_at.is_some());

        let interval = h.store.get_open_interval(job.id).await.unwrap().unwrap();
        assert_eq!(interval.gpu_id, gpu.id);
        assert_eq!(interval.cost_per_hour, 2.0);
    }

    #[tokio::test]
    async fn test_complete_releases_and_closes() {
        let h = harness();
        let (job, gpu) = seeded_running_job(&h).await;

        let completed = h.lifecycle.complete_job(job.id).await.unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert!(completed.completed_at.is_some());
        // gpu_id retained for audit
        assert_eq!(completed.gpu_id, Some(gpu.id));

        let gpu = h.store.get_gpu(gpu.id).await.unwrap().unwrap();
        assert_eq!(gpu.status, GpuStatus::Available);
        assert_eq!(gpu.active_job_id, None);

        assert!(h.store.get_open_interval(job.id).await.unwrap().is_none());
        let intervals = h.store.list_intervals(job.organization_id).await.unwrap();
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].total_cost.is_some());
    }

    #[tokio::test]
    async fn test_fail_records_error_message() {
        let h = harness();
        let (job, _gpu) = seeded_running_job(&h).await;

        let failed = h
            .lifecycle
            .fail_job(job.id, "cuda out of memory".to_string())
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("cuda out of memory"));
    }

    #[tokio::test]
    async fn test_cancel_queued_job_touches_nothing_else() {
        let h = harness();
        let org = Uuid::new_v4();
        let job = Job::new(org, "phi-2".to_string(), 8000, 0);
        h.store.insert_job(job.clone()).await.unwrap();

        let cancelled = h.lifecycle.cancel_job(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.gpu_id, None);
        assert!(cancelled.completed_at.is_some());
        assert!(h.store.list_intervals(org).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_running_job_releases_and_closes() {
        let h = harness();
        let (job, gpu) = seeded_running_job(&h).await;

        let cancelled = h.lifecycle.cancel_job(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let gpu = h.store.get_gpu(gpu.id).await.unwrap().unwrap();
        assert_eq!(gpu.status, GpuStatus::Available);
        assert!(h.store.get_open_interval(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_transitions_from_wrong_state_rejected() {
        let h = harness();
        let org = Uuid::new_v4();
        let job = Job::new(org, "phi-2".to_string(), 8000, 0);
        h.store.insert_job(job.clone()).await.unwrap();

        // Completing a queued job is illegal
        let result = h.lifecycle.complete_job(job.id).await;
        assert!(matches!(
            result,
            Err(PoolError::IllegalTransition {
                from: JobStatus::Queued,
                to: JobStatus::Completed,
                ..
            })
        ));

        // Cancelling twice: the second attempt finds a terminal job
        h.lifecycle.cancel_job(job.id).await.unwrap();
        let result = h.lifecycle.cancel_job(job.id).await;
        assert!(matches!(
            result,
            Err(PoolError::IllegalTransition {
                from: JobStatus::Cancelled,
                to: JobStatus::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_start_job_loses_to_cancel_and_rolls_back() {
        let h = harness();
        let org = Uuid::new_v4();
        let gpu = GpuResource::new(org, "t4".to_string(), 16384, 2.0);
        h.store.insert_gpu(gpu.clone()).await.unwrap();
        let job = Job::new(org, "phi-2".to_string(), 8000, 0);
        h.store.insert_job(job.clone()).await.unwrap();

        let reserved = h.catalog.reserve(gpu.id, job.id, 8000).await.unwrap();
        // Cancel reaches the store before the start transition
        h.lifecycle.cancel_job(job.id).await.unwrap();

        let result = h.lifecycle.start_job(job.id, &reserved).await;
        assert!(matches!(result, Err(PoolError::AllocationConflict(_))));

        // The reservation was rolled back; nothing accrues cost
        let gpu = h.store.get_gpu(gpu.id).await.unwrap().unwrap();
        assert_eq!(gpu.status, GpuStatus::Available);
        assert!(h.store.list_intervals(org).await.unwrap().is_empty());
    }

    struct RefusingBackend;

    #[async_trait]
    impl ComputeBackend for RefusingBackend {
        async fn launch(&self, _job: &Job, _gpu: &GpuResource) -> PoolResult<()> {
            Err(PoolError::Execution("backend rejected workload".to_string()))
        }

        async fn stop(&self, _job: &Job) -> PoolResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "refusing"
        }
    }

    #[tokio::test]
    async fn test_launch_fault_fails_job_and_releases() {
        let h = harness_with_backend(Arc::new(RefusingBackend));
        let org = Uuid::new_v4();
        let gpu = GpuResource::new(org, "t4".to_string(), 16384, 2.0);
        h.store.insert_gpu(gpu.clone()).await.unwrap();
        let job = Job::new(org, "phi-2".to_string(), 8000, 0);
        h.store.insert_job(job.clone()).await.unwrap();

        let reserved = h.catalog.reserve(gpu.id, job.id, 8000).await.unwrap();
        let finished = h.lifecycle.start_job(job.id, &reserved).await.unwrap();

        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished
            .error_message
            .as_deref()
            .unwrap()
            .contains("backend rejected workload"));

        let gpu = h.store.get_gpu(gpu.id).await.unwrap().unwrap();
        assert_eq!(gpu.status, GpuStatus::Available);
        // The interval opened and closed around the failed launch
        let intervals = h.store.list_intervals(org).await.unwrap();
        assert_eq!(intervals.len(), 1);
        assert!(!intervals[0].is_open());
    }
}
