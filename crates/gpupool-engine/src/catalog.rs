//! Typed view over GPU resource records
//!
//! Listing is read-only and advisory: a result can be stale the moment it
//! returns. Reservation and release are single conditional updates at the
//! store boundary, so two schedulers racing for one resource cannot both win.

use chrono::Utc;
use gpupool_core::{GpuResource, GpuStatus, PoolError, PoolResult};
use gpupool_store::{CasOutcome, GpuPatch, PoolStore};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Catalog of GPU resources backed by the shared store
#[derive(Clone)]
pub struct ResourceCatalog {
    store: Arc<dyn PoolStore>,
}

impl ResourceCatalog {
    /// Create a catalog over a store handle
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }

    /// Available resources for an organization that fit `min_memory_mb` and
    /// the optional type filter.
    ///
    /// Ordered best-fit: ascending spare memory, ties broken by resource id.
    /// Spot resources past their termination time are excluded so no new work
    /// lands on capacity that is being reclaimed. The result is advisory;
    /// callers must treat every entry as a candidate, not a guarantee.
    pub async fn list_available(
        &self,
        organization_id: Uuid,
        min_memory_mb: u64,
        gpu_type: Option<&str>,
    ) -> PoolResult<Vec<GpuResource>> {
        let now = Utc::now();
        let mut gpus: Vec<GpuResource> = self
            .store
            .list_gpus(organization_id)
            .await?
            .into_iter()
            .filter(|g| g.is_schedulable(now))
            .filter(|g| g.spare_memory_mb() >= min_memory_mb)
            .filter(|g| gpu_type.map_or(true, |t| g.gpu_type == t))
            .collect();

        gpus.sort_by(|a, b| {
            a.spare_memory_mb()
                .cmp(&b.spare_memory_mb())
                .then(a.id.cmp(&b.id))
        });
        Ok(gpus)
    }

    /// Atomically reserve a resource for a job: `available -> busy`.
    ///
    /// Losing the race is a routine outcome, reported as
    /// [`PoolError::ResourceUnavailable`]; the caller moves on to the next
    /// candidate.
    pub async fn reserve(
        &self,
        resource_id: Uuid,
        job_id: Uuid,
        memory_mb: u64,
    ) -> PoolResult<GpuResource> {
        let outcome = self
            .store
            .update_gpu_if_status(
                resource_id,
                GpuStatus::Available,
                GpuPatch::reserve(job_id, memory_mb),
            )
            .await?;

        match outcome {
            CasOutcome::Applied(gpu) => {
                debug!(gpu_id = %resource_id, job_id = %job_id, "Reserved resource");
                Ok(gpu)
            }
            CasOutcome::Conflict => Err(PoolError::ResourceUnavailable(format!(
                "resource {} is no longer available",
                resource_id
            ))),
        }
    }

    /// Atomically release a resource: `busy -> available`.
    ///
    /// Idempotent: releasing a resource that is already available is a no-op.
    pub async fn release(&self, resource_id: Uuid) -> PoolResult<()> {
        let outcome = self
            .store
            .update_gpu_if_status(resource_id, GpuStatus::Busy, GpuPatch::release())
            .await?;

        match outcome {
            CasOutcome::Applied(_) => {
                debug!(gpu_id = %resource_id, "Released resource");
            }
            CasOutcome::Conflict => {
                debug!(gpu_id = %resource_id, "Release was a no-op");
            }
        }
        Ok(())
    }
}
