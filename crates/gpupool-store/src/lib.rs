//! gpupool-store: Durable-store interface for gpupool
//!
//! This crate provides the store boundary the engine runs against:
//! - [`PoolStore`]: the async trait every backend implements; all record
//!   mutation goes through conditional compare-and-swap operations
//! - [`MemoryStore`]: in-memory reference implementation and test arbiter
//! - [`RetryingStore`]: bounded-retry wrapper for transient store failures

pub mod memory;
pub mod retry;
pub mod store;

pub use memory::MemoryStore;
pub use retry::{with_retry, RetryPolicy, RetryingStore};
pub use store::{CasOutcome, GpuPatch, JobPatch, PoolStore};
