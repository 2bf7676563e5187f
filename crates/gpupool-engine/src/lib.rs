//! gpupool-engine: GPU allocation and job-lifecycle engine
//!
//! This crate is the part of gpupool where correctness depends on concurrency
//! discipline. Multiple scheduler workers race for the same resources; every
//! cross-worker decision is settled by the store's conditional updates:
//! - [`ResourceCatalog`]: typed view over GPU records; atomic reserve/release
//! - [`AllocationMatcher`]: candidate iteration with bounded reservation attempts
//! - [`LifecycleOrchestrator`]: job status state machine
//! - [`CostTracker`]: one cost interval per allocation
//! - [`SchedulerWorker`]: periodic/triggered scheduling passes
//! - [`PoolService`]: submission/query/cancellation facade for the API layer

pub mod catalog;
pub mod cost;
pub mod lifecycle;
pub mod matcher;
pub mod service;
pub mod worker;

pub use catalog::ResourceCatalog;
pub use cost::CostTracker;
pub use lifecycle::LifecycleOrchestrator;
pub use matcher::{AllocationMatcher, MatchOutcome};
pub use service::{EngineStatus, ExecutionReport, NewGpuRequest, NewJobRequest, PoolService, UsageReport};
pub use worker::SchedulerWorker;
