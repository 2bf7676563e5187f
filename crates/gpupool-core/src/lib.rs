//! gpupool-core: Core types for the gpupool allocation engine
//!
//! This crate provides the fundamental types used throughout the gpupool system:
//! - Organization, GPU resource, job, and cost-interval records
//! - Job and resource status enums with the legal transition sets
//! - Configuration types
//! - Error taxonomy

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
