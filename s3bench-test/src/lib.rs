//! Test utilities for the benchmark harness.
//!
//! This crate provides utilities to facilitate testing of the harness without a real
//! object-storage service. See the modules for all available utilities.

pub mod backend;
pub mod tracing;
