//! Error types for gpupool

use crate::model::JobStatus;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for gpupool
#[derive(Error, Debug)]
pub enum PoolError {
    /// Malformed job or resource spec, rejected before it reaches the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// No eligible resource at attempt time; the job stays queued
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Lost a conditional update race on a job record
    #[error("Allocation conflict: {0}")]
    AllocationConflict(String),

    /// Transient store or network fault, safe to retry
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Retries exhausted or other non-recoverable infrastructure fault
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// State-machine violation, rejected and never applied
    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Fault reported by the compute backend
    #[error("Execution error: {0}")]
    Execution(String),

    /// Organization not found
    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// GPU resource not found
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal consistency fault
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gpupool operations
pub type PoolResult<T> = Result<T, PoolError>;

impl PoolError {
    /// Whether the resilience wrapper may retry this error.
    ///
    /// Only infrastructure-level faults qualify; logical outcomes such as
    /// `ResourceUnavailable` or `AllocationConflict` are control flow and must
    /// reach the caller unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::TransientStore(_))
    }

    /// Whether this is a lost race that callers absorb locally.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PoolError::AllocationConflict(_) | PoolError::IllegalTransition { .. }
        )
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PoolError {
    fn from(err: toml::de::Error) -> Self {
        PoolError::Config(err.to_string())
    }
}
