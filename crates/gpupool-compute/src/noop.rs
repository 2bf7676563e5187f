//! Logging no-op backend
//!
//! Used in development and tests. Launch and stop only log; completion
//! signals come from whoever drives the API, exactly as they would from a
//! real backend.

use async_trait::async_trait;
use gpupool_core::{GpuResource, Job, PoolResult};
use tracing::info;

use crate::traits::ComputeBackend;

/// Backend that accepts every launch and stop without doing work
#[derive(Debug, Default)]
pub struct NoopBackend;

impl NoopBackend {
    /// Create a new no-op backend
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComputeBackend for NoopBackend {
    async fn launch(&self, job: &Job, gpu: &GpuResource) -> PoolResult<()> {
        info!(
            job_id = %job.id,
            gpu_id = %gpu.id,
            model = %job.model,
            "Launch accepted"
        );
        Ok(())
    }

    async fn stop(&self, job: &Job) -> PoolResult<()> {
        info!(job_id = %job.id, "Stop signal accepted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_noop_accepts_everything() {
        let backend = NoopBackend::new();
        let org = Uuid::new_v4();
        let job = Job::new(org, "phi-2".to_string(), 8000, 0);
        let gpu = GpuResource::new(org, "t4".to_string(), 16384, 0.5);

        assert!(backend.launch(&job, &gpu).await.is_ok());
        assert!(backend.stop(&job).await.is_ok());
        assert_eq!(backend.name(), "noop");
    }
}
