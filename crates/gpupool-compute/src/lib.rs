//! gpupool-compute: Execution backend seam
//!
//! The engine hands allocated jobs to a compute backend and receives
//! completion/failure signals asynchronously through the API. This crate
//! defines that seam and a logging no-op backend for development.

pub mod noop;
pub mod traits;

pub use noop::NoopBackend;
pub use traits::ComputeBackend;
