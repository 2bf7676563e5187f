//! Bounded retry around transient store failures
//!
//! [`RetryingStore`] wraps any [`PoolStore`] and retries operations that fail
//! with a transient error, using exponential backoff and a per-operation
//! timeout. Logical outcomes (`CasOutcome::Conflict`, not-found, validation)
//! pass through untouched; a transient failure that survives every attempt
//! surfaces as `PoolError::Infrastructure`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpupool_core::{
    CostInterval, GpuResource, GpuStatus, Job, JobStatus, Organization, PoolError, PoolResult,
    StoreConfig,
};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::store::{CasOutcome, GpuPatch, JobPatch, PoolStore};

/// Retry schedule for transient store failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per operation, including the first
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub base_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from store configuration
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `call` with the policy's timeout and retry schedule.
///
/// `call` is re-invoked only after a transient failure; anything else is
/// returned to the caller on the first occurrence.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_timeout: Duration,
    op: &str,
    mut call: F,
) -> PoolResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PoolResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(op_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::TransientStore(format!(
                "{} timed out after {:?}",
                op, op_timeout
            ))),
        };

        match result {
            Err(e) if e.is_transient() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(PoolError::Infrastructure(format!(
                        "{} failed after {} attempts: {}",
                        op, attempt, e
                    )));
                }
                let delay = policy.delay(attempt);
                warn!(
                    op = op,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying transient store failure"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// [`PoolStore`] wrapper applying [`RetryPolicy`] to every operation
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
    op_timeout: Duration,
}

impl<S> RetryingStore<S> {
    /// Wrap a store with the given policy and per-operation timeout
    pub fn new(inner: S, policy: RetryPolicy, op_timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            op_timeout,
        }
    }

    /// Wrap a store using [`StoreConfig`] settings
    pub fn from_config(inner: S, config: &StoreConfig) -> Self {
        Self::new(inner, RetryPolicy::from_config(config), config.op_timeout())
    }
}

#[async_trait]
impl<S: PoolStore> PoolStore for RetryingStore<S> {
    async fn insert_organization(&self, org: Organization) -> PoolResult<()> {
        with_retry(&self.policy, self.op_timeout, "insert_organization", || {
            self.inner.insert_organization(org.clone())
        })
        .await
    }

    async fn get_organization(&self, id: Uuid) -> PoolResult<Option<Organization>> {
        with_retry(&self.policy, self.op_timeout, "get_organization", || {
            self.inner.get_organization(id)
        })
        .await
    }

    async fn insert_gpu(&self, gpu: GpuResource) -> PoolResult<()> {
        with_retry(&self.policy, self.op_timeout, "insert_gpu", || {
            self.inner.insert_gpu(gpu.clone())
        })
        .await
    }

    async fn get_gpu(&self, id: Uuid) -> PoolResult<Option<GpuResource>> {
        with_retry(&self.policy, self.op_timeout, "get_gpu", || {
            self.inner.get_gpu(id)
        })
        .await
    }

    async fn list_gpus(&self, organization_id: Uuid) -> PoolResult<Vec<GpuResource>> {
        with_retry(&self.policy, self.op_timeout, "list_gpus", || {
            self.inner.list_gpus(organization_id)
        })
        .await
    }

    async fn update_gpu_if_status(
        &self,
        id: Uuid,
        expected: GpuStatus,
        patch: GpuPatch,
    ) -> PoolResult<CasOutcome<GpuResource>> {
        with_retry(&self.policy, self.op_timeout, "update_gpu_if_status", || {
            self.inner.update_gpu_if_status(id, expected, patch.clone())
        })
        .await
    }

    async fn record_gpu_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> PoolResult<()> {
        with_retry(&self.policy, self.op_timeout, "record_gpu_heartbeat", || {
            self.inner.record_gpu_heartbeat(id, at)
        })
        .await
    }

    async fn count_gpus_by_status(&self) -> PoolResult<HashMap<GpuStatus, usize>> {
        with_retry(&self.policy, self.op_timeout, "count_gpus_by_status", || {
            self.inner.count_gpus_by_status()
        })
        .await
    }

    async fn insert_job(&self, job: Job) -> PoolResult<()> {
        with_retry(&self.policy, self.op_timeout, "insert_job", || {
            self.inner.insert_job(job.clone())
        })
        .await
    }

    async fn get_job(&self, id: Uuid) -> PoolResult<Option<Job>> {
        with_retry(&self.policy, self.op_timeout, "get_job", || {
            self.inner.get_job(id)
        })
        .await
    }

    async fn list_jobs(
        &self,
        organization_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> PoolResult<Vec<Job>> {
        with_retry(&self.policy, self.op_timeout, "list_jobs", || {
            self.inner.list_jobs(organization_id, status, limit)
        })
        .await
    }

    async fn list_queued_jobs(&self, limit: usize) -> PoolResult<Vec<Job>> {
        with_retry(&self.policy, self.op_timeout, "list_queued_jobs", || {
            self.inner.list_queued_jobs(limit)
        })
        .await
    }

    async fn update_job_if_status(
        &self,
        id: Uuid,
        expected: JobStatus,
        patch: JobPatch,
    ) -> PoolResult<CasOutcome<Job>> {
        with_retry(&self.policy, self.op_timeout, "update_job_if_status", || {
            self.inner.update_job_if_status(id, expected, patch.clone())
        })
        .await
    }

    async fn count_jobs_by_status(&self) -> PoolResult<HashMap<JobStatus, usize>> {
        with_retry(&self.policy, self.op_timeout, "count_jobs_by_status", || {
            self.inner.count_jobs_by_status()
        })
        .await
    }

    async fn insert_interval(&self, interval: CostInterval) -> PoolResult<()> {
        with_retry(&self.policy, self.op_timeout, "insert_interval", || {
            self.inner.insert_interval(interval.clone())
        })
        .await
    }

    async fn get_open_interval(&self, job_id: Uuid) -> PoolResult<Option<CostInterval>> {
        with_retry(&self.policy, self.op_timeout, "get_open_interval", || {
            self.inner.get_open_interval(job_id)
        })
        .await
    }

    async fn close_interval_if_open(
        &self,
        job_id: Uuid,
        end_time: DateTime<Utc>,
        total_cost: f64,
    ) -> PoolResult<CasOutcome<CostInterval>> {
        with_retry(&self.policy, self.op_timeout, "close_interval_if_open", || {
            self.inner.close_interval_if_open(job_id, end_time, total_cost)
        })
        .await
    }

    async fn list_intervals(&self, organization_id: Uuid) -> PoolResult<Vec<CostInterval>> {
        with_retry(&self.policy, self.op_timeout, "list_intervals", || {
            self.inner.list_intervals(organization_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        // Capped
        assert_eq!(policy.delay(3), Duration::from_millis(350));
        assert_eq!(policy.delay(4), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_to_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&test_policy(), Duration::from_secs(1), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PoolError::TransientStore("connection reset".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_to_infrastructure() {
        let calls = AtomicU32::new(0);
        let result: PoolResult<()> = with_retry(&test_policy(), Duration::from_secs(1), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PoolError::TransientStore("still down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(PoolError::Infrastructure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_logical_outcome_not_retried() {
        let calls = AtomicU32::new(0);
        let result: PoolResult<()> = with_retry(&test_policy(), Duration::from_secs(1), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PoolError::AllocationConflict("lost race".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(PoolError::AllocationConflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_treated_as_transient() {
        let calls = AtomicU32::new(0);
        let result: PoolResult<()> =
            with_retry(&test_policy(), Duration::from_millis(5), "op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
