//! The worker pool that drains a [`KeyQueue`].
//!
//! [`run_pool`] spawns one task per worker handle. Worker `i` performs every operation with handle
//! `i`, pulling keys from the shared queue until it is closed and drained. Results go into a fresh
//! [`PhaseStats`]; each worker also keeps its own latency sketch, merged after the pool joins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use indicatif::ProgressBar;
use sketches_ddsketch::DDSketch;
use tokio::time::Instant;

use crate::handle::WorkerHandle;
use crate::keys::KeyQueue;
use crate::stats::{LatencySummary, PhaseStats, StatsSnapshot};

/// One of the two passes over the key space.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Every key is written with the shared payload.
    Write,
    /// Every key is read back.
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Write => f.write_str("write"),
            Phase::Read => f.write_str("read"),
        }
    }
}

/// The storage operation performed for every key of a phase.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Write the given payload. The buffer is shared, never copied.
    Write(Bytes),
    /// Read the object and discard its contents.
    Read,
}

impl Operation {
    /// The phase this operation belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            Operation::Write(_) => Phase::Write,
            Operation::Read => Phase::Read,
        }
    }
}

/// Results of a drained pool.
#[derive(Clone, Debug)]
pub struct PoolOutcome {
    /// Final counters and latency bounds.
    pub stats: StatsSnapshot,
    /// Latency percentiles over all successful operations.
    pub latencies: LatencySummary,
    /// Number of keys each worker processed, indexed by worker.
    pub per_worker: Vec<u64>,
    /// Wall-clock time from spawning the workers until the last one returned.
    pub elapsed: Duration,
}

/// What a single worker hands back when it exits.
struct WorkerTally {
    processed: u64,
    latencies: DDSketch,
}

/// Runs one worker per handle until `queue` is closed and drained.
///
/// Blocks until every worker has returned. Failed operations are counted but never retried and
/// never stop a worker. Only a panicking worker makes this return an error.
pub async fn run_pool(
    handles: &[Arc<WorkerHandle>],
    queue: KeyQueue,
    operation: Operation,
    progress: ProgressBar,
) -> Result<PoolOutcome> {
    let stats = Arc::new(PhaseStats::new());
    let start = Instant::now();

    let tasks: Vec<_> = handles
        .iter()
        .map(|handle| {
            tokio::spawn(work(
                Arc::clone(handle),
                queue.clone(),
                operation.clone(),
                Arc::clone(&stats),
                progress.clone(),
            ))
        })
        .collect();

    let finished = futures::future::join_all(tasks).await;
    let elapsed = start.elapsed();

    let mut latencies = DDSketch::default();
    let mut per_worker = Vec::with_capacity(finished.len());
    for (id, task) in finished.into_iter().enumerate() {
        let tally = task.with_context(|| format!("worker {id} panicked"))?;
        if let Err(err) = latencies.merge(&tally.latencies) {
            tracing::warn!(worker = id, "could not merge latency sketch: {err}");
        }
        per_worker.push(tally.processed);
    }

    Ok(PoolOutcome {
        stats: stats.snapshot(),
        latencies: LatencySummary::from_sketch(&latencies),
        per_worker,
        elapsed,
    })
}

#[tracing::instrument(level = "debug", skip_all, fields(worker = handle.id(), phase = %operation.phase()))]
async fn work(
    handle: Arc<WorkerHandle>,
    queue: KeyQueue,
    operation: Operation,
    stats: Arc<PhaseStats>,
    progress: ProgressBar,
) -> WorkerTally {
    let mut tally = WorkerTally {
        processed: 0,
        latencies: DDSketch::default(),
    };

    while let Some(key) = queue.next().await {
        let start = Instant::now();
        let result = match &operation {
            Operation::Write(payload) => handle.write(&key, payload.clone()).await,
            Operation::Read => handle.read(&key).await,
        };
        let elapsed = start.elapsed();

        match result {
            Ok(bytes) => {
                stats.record_success(bytes, elapsed);
                tally.latencies.add(elapsed.as_secs_f64());
            }
            Err(err) => {
                stats.record_failure();
                match operation {
                    // The handle already logged why the write failed.
                    Operation::Write(_) => tracing::debug!(key = %key, "write skipped"),
                    Operation::Read => {
                        tracing::info!(key = %key, error = &err as &dyn std::error::Error, "read error")
                    }
                }
            }
        }

        tally.processed += 1;
        progress.inc(1);
    }

    tracing::trace!(processed = tally.processed, "queue drained");
    tally
}
