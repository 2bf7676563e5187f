//! Cost interval tracking
//!
//! One interval per job that ever ran. The price is snapshotted when the
//! interval opens; the total is computed exactly once at close and never
//! recomputed afterward.

use chrono::{DateTime, Utc};
use gpupool_core::{CostInterval, PoolError, PoolResult};
use gpupool_store::{CasOutcome, PoolStore};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Tracks the billed span of each allocation
#[derive(Clone)]
pub struct CostTracker {
    store: Arc<dyn PoolStore>,
}

impl CostTracker {
    /// Create a tracker over a store handle
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }

    /// Open an interval for a job entering `running`.
    ///
    /// The store rejects a second interval for the same job; hitting that is
    /// a consistency fault in the orchestrator, not a recoverable condition.
    pub async fn open(
        &self,
        organization_id: Uuid,
        job_id: Uuid,
        gpu_id: Uuid,
        cost_per_hour: f64,
        start_time: DateTime<Utc>,
    ) -> PoolResult<CostInterval> {
        let interval = CostInterval::open(organization_id, gpu_id, job_id, cost_per_hour, start_time);
        self.store.insert_interval(interval.clone()).await?;
        info!(
            job_id = %job_id,
            gpu_id = %gpu_id,
            cost_per_hour = cost_per_hour,
            "Opened cost interval"
        );
        Ok(interval)
    }

    /// Close the open interval for a job leaving `running`.
    ///
    /// Errors without side effect when no open interval exists.
    pub async fn close(&self, job_id: Uuid, end_time: DateTime<Utc>) -> PoolResult<CostInterval> {
        let open = self
            .store
            .get_open_interval(job_id)
            .await?
            .ok_or_else(|| {
                PoolError::Internal(format!("no open cost interval for job {}", job_id))
            })?;

        let total = total_cost(open.cost_per_hour, open.start_time, end_time);
        match self
            .store
            .close_interval_if_open(job_id, end_time, total)
            .await?
        {
            CasOutcome::Applied(interval) => {
                info!(
                    job_id = %job_id,
                    total_cost = total,
                    "Closed cost interval"
                );
                Ok(interval)
            }
            CasOutcome::Conflict => Err(PoolError::Internal(format!(
                "cost interval for job {} was closed concurrently",
                job_id
            ))),
        }
    }
}

/// `cost_per_hour x elapsed hours`, clamped at zero for a clock that ran
/// backwards
pub fn total_cost(cost_per_hour: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let elapsed_secs = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
    cost_per_hour * elapsed_secs / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gpupool_store::MemoryStore;

    #[test]
    fn test_total_cost() {
        let start = Utc::now();
        // 2.00/h for 1.5h => 3.00
        let total = total_cost(2.0, start, start + Duration::minutes(90));
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_cost_clamps_negative_elapsed() {
        let start = Utc::now();
        let total = total_cost(2.0, start, start - Duration::minutes(10));
        assert_eq!(total, 0.0);
    }

    #[tokio::test]
    async fn test_open_close_round() {
        let store = Arc::new(MemoryStore::new());
        let tracker = CostTracker::new(store.clone());
        let (org, job, gpu) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let start = Utc::now() - Duration::minutes(90);
        let interval = tracker.open(org, job, gpu, 2.0, start).await.unwrap();
        assert!(interval.is_open());

        let end = start + Duration::minutes(90);
        let closed = tracker.close(job, end).await.unwrap();
        assert_eq!(closed.end_time, Some(end));
        let total = closed.total_cost.unwrap();
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_second_open_is_consistency_fault() {
        let store = Arc::new(MemoryStore::new());
        let tracker = CostTracker::new(store);
        let (org, job, gpu) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        tracker.open(org, job, gpu, 2.0, Utc::now()).await.unwrap();
        let result = tracker.open(org, job, gpu, 2.0, Utc::now()).await;
        assert!(matches!(result, Err(PoolError::Internal(_))));
    }

    #[tokio::test]
    async fn test_close_without_open_interval() {
        let store = Arc::new(MemoryStore::new());
        let tracker = CostTracker::new(store);

        let result = tracker.close(Uuid::new_v4(), Utc::now()).await;
        assert!(matches!(result, Err(PoolError::Internal(_))));
    }
}
