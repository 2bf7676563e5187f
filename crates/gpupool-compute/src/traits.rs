//! Compute backend trait definitions

use async_trait::async_trait;
use gpupool_core::{GpuResource, Job, PoolResult};

/// Backend that runs workloads on allocated resources
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Start executing a job on its allocated resource
    async fn launch(&self, job: &Job, gpu: &GpuResource) -> PoolResult<()>;

    /// Ask the backend to stop a job. Best-effort: callers must not let a
    /// delivery failure block a state transition.
    async fn stop(&self, job: &Job) -> PoolResult<()>;

    /// Get the backend name
    fn name(&self) -> &'static str;
}
