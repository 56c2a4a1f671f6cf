//! A write-then-read benchmark for object storage.
//!
//! A run writes a fixed number of equally sized objects through a pool of concurrent workers,
//! then reads every object back. Both phases share the same pipeline:
//!
//! - a [`KeySpace`](keys::KeySpace) producer feeds keys into a bounded queue,
//! - a fixed pool of workers drains the queue, each using its own
//!   [`WorkerHandle`](handle::WorkerHandle),
//! - [`PhaseStats`](stats::PhaseStats) accumulate counts, bytes and latency bounds lock-free.
//!
//! The [`Runner`](run::Runner) orchestrates setup and both phases and returns a
//! [`RunReport`](run::RunReport).
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod handle;
pub mod keys;
pub mod observability;
pub mod pool;
pub mod report;
pub mod run;
pub mod stats;

pub use crate::run::{RunReport, RunSettings, RunState, Runner};
