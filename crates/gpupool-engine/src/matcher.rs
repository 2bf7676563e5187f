//! Candidate selection and atomic reservation
//!
//! For each queued job the matcher walks the catalog's best-fit candidate
//! list, attempting one conditional reservation at a time. A lost race moves
//! on to the next candidate; running out of candidates leaves the job queued
//! for a later pass. Neither is a fault.

use gpupool_core::{Job, PoolError, PoolResult};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::ResourceCatalog;
use crate::lifecycle::LifecycleOrchestrator;

/// Result of one placement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The job was reserved onto a resource and transitioned to running
    Allocated {
        /// Resource the job landed on
        gpu_id: Uuid,
    },
    /// No candidate could be taken; the job stays queued
    NoMatch,
}

/// Matches queued jobs onto available resources
#[derive(Clone)]
pub struct AllocationMatcher {
    catalog: ResourceCatalog,
    lifecycle: Arc<LifecycleOrchestrator>,
    /// Reservation attempts per job per pass, bounding tail latency under
    /// contention
    max_attempts: usize,
}

impl AllocationMatcher {
    /// Create a matcher
    pub fn new(
        catalog: ResourceCatalog,
        lifecycle: Arc<LifecycleOrchestrator>,
        max_attempts: usize,
    ) -> Self {
        Self {
            catalog,
            lifecycle,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Try to place one job.
    ///
    /// Candidates are attempted in catalog order. `ResourceUnavailable` from
    /// a reservation means another scheduler won that resource; the next
    /// candidate is tried without surfacing an error. An
    /// `AllocationConflict` from the start transition means the job itself
    /// was taken (cancelled or placed elsewhere); the attempt ends quietly.
    pub async fn try_place(&self, job: &Job) -> PoolResult<MatchOutcome> {
        let candidates = self
            .catalog
            .list_available(
                job.organization_id,
                job.memory_required_mb,
                job.gpu_type.as_deref(),
            )
            .await?;

        if candidates.is_empty() {
            debug!(job_id = %job.id, "No eligible resource; job stays queued");
            return Ok(MatchOutcome::NoMatch);
        }

        for candidate in candidates.into_iter().take(self.max_attempts) {
            let reserved = match self
                .catalog
                .reserve(candidate.id, job.id, job.memory_required_mb)
                .await
            {
                Ok(gpu) => gpu,
                Err(PoolError::ResourceUnavailable(_)) => {
                    debug!(
                        job_id = %job.id,
                        gpu_id = %candidate.id,
                        "Lost reservation race; trying next candidate"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            return match self.lifecycle.start_job(job.id, &reserved).await {
                Ok(_) => Ok(MatchOutcome::Allocated {
                    gpu_id: reserved.id,
                }),
                Err(e) if e.is_conflict() => {
                    debug!(job_id = %job.id, "Job left the queue mid-allocation");
                    Ok(MatchOutcome::NoMatch)
                }
                Err(e) => Err(e),
            };
        }

        debug!(job_id = %job.id, "Reservation attempts exhausted; job stays queued");
        Ok(MatchOutcome::NoMatch)
    }
}
