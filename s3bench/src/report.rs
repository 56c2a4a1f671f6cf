//! Summaries of finished phases, as structured log events and as human readable output.

use std::fmt;
use std::time::Duration;

use bytesize::ByteSize;
use yansi::Paint;

use crate::pool::{Phase, PoolOutcome};

/// Everything known about a phase after its pool drained.
#[derive(Clone, Debug)]
pub struct PhaseReport {
    /// Which phase this is.
    pub phase: Phase,
    /// Number of workers.
    pub routines: usize,
    /// Size of each written object, only set for the write phase.
    pub payload_size: Option<u64>,
    /// Number of keys requested.
    pub total: usize,
    /// `true` if the phase was cut short by an interrupt.
    pub interrupted: bool,
    /// Counters, latencies and timing of the pool.
    pub outcome: PoolOutcome,
}

impl PhaseReport {
    /// Successful operations per second of wall-clock time.
    pub fn ops_per_sec(&self) -> f64 {
        per_second(self.outcome.stats.successes, self.outcome.elapsed)
    }

    /// Bytes moved per second of wall-clock time.
    pub fn bytes_per_sec(&self) -> f64 {
        per_second(self.outcome.stats.bytes, self.outcome.elapsed)
    }

    /// Emits the summary as a single structured `INFO` event.
    pub fn log(&self) {
        let stats = &self.outcome.stats;
        tracing::info!(
            phase = %self.phase,
            routines = self.routines,
            object_size = self.payload_size,
            total_objects = self.total,
            elapsed = ?self.outcome.elapsed,
            successes = stats.successes,
            failures = stats.failures,
            total_bytes = stats.bytes,
            min_latency = ?stats.min_latency,
            max_latency = ?stats.max_latency,
            interrupted = self.interrupted,
            "{} phase done",
            self.phase
        );
    }

    /// Prints the summary to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.outcome.stats;
        let title = match self.phase {
            Phase::Write => "## WRITE",
            Phase::Read => "## READ",
        };

        write!(
            f,
            "{} (routines: {}, objects: {}",
            title.bold(),
            self.routines.bold(),
            self.total.bold()
        )?;
        if let Some(size) = self.payload_size {
            write!(f, ", size: {}", ByteSize::b(size).bold())?;
        }
        writeln!(f, ")")?;

        write!(f, "  {} ops", stats.successes.bold().green())?;
        if stats.failures > 0 {
            write!(
                f,
                ", {}",
                format!("{} FAILURES", stats.failures).bold().red()
            )?;
        }
        if self.interrupted {
            write!(f, ", {}", "INTERRUPTED".bold().yellow())?;
        }
        writeln!(f, " in {:.2?}", self.outcome.elapsed)?;

        writeln!(
            f,
            "  {:.2} operations/s, {:.2}/s, {} total",
            self.ops_per_sec().bold(),
            ByteSize::b(self.bytes_per_sec() as u64).bold(),
            ByteSize::b(stats.bytes)
        )?;

        if stats.successes > 0 {
            let latencies = &self.outcome.latencies;
            write!(
                f,
                "  min: {}; avg: {}; p50: {}; p90: {}; p99: {}; max: {}",
                DurationFmt(stats.min_latency).bold(),
                DurationFmt(latencies.avg),
                DurationFmt(latencies.p50),
                DurationFmt(latencies.p90),
                DurationFmt(latencies.p99),
                DurationFmt(stats.max_latency).bold(),
            )?;
        }

        Ok(())
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Formats an optional duration with two decimals, or `-` when absent.
struct DurationFmt(Option<Duration>);

impl fmt::Display for DurationFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(duration) => write!(f, "{duration:.2?}"),
            None => f.write_str("-"),
        }
    }
}
