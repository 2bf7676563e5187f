//! gpupool-api: REST API server for gpupool
//!
//! This crate provides the REST surface for interacting with the engine:
//! - Job submission, query, and cancellation
//! - Compute completion callbacks
//! - Organization and GPU provisioning
//! - Usage and status reporting

pub mod rest;

pub use rest::create_router;
