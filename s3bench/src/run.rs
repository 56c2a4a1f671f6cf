//! Orchestrates a full run: worker setup, the write phase, then the read phase.
//!
//! A run moves through the states
//! `Init → WriteActive → WriteDrained → ReadActive → ReadDrained → Done`. Failing to set up the
//! worker handles moves it straight to `Aborted`, as does an interrupt once the active phase has
//! drained. Phases never overlap: the read phase starts only after every write worker returned.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use indicatif::{ProgressBar, ProgressStyle};
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use s3bench_storage::Connector;
use tokio_util::sync::CancellationToken;

use crate::config::{self, Config};
use crate::handle::{Timeouts, WorkerHandle, connect_all};
use crate::keys::{KeySpace, spawn_producer};
use crate::pool::{Operation, Phase, run_pool};
use crate::report::PhaseReport;

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// Nothing has happened yet.
    Init,
    /// Objects are being written.
    WriteActive,
    /// All write workers returned.
    WriteDrained,
    /// Objects are being read back.
    ReadActive,
    /// All read workers returned.
    ReadDrained,
    /// Both phases completed.
    Done,
    /// The run stopped early, either during setup or because it was interrupted.
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The parameters of a single run, resolved from [`Config`].
#[derive(Clone, Debug)]
pub struct RunSettings {
    /// Number of objects.
    pub files: usize,
    /// Number of workers.
    pub routines: usize,
    /// Run name embedded in every key.
    pub name: String,
    /// First key segment.
    pub prefix: String,
    /// Size of each written object in bytes.
    pub payload_size: usize,
    /// Capacity of the key queue.
    pub queue_capacity: usize,
    /// Per-operation timeouts.
    pub timeouts: Timeouts,
}

impl RunSettings {
    /// Resolves settings from the configuration, picking a random run name if none is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let payload_size = usize::try_from(config.payload_size.as_u64())
            .context("payload size does not fit into memory")?;
        let name = if config.name.is_empty() {
            random_name()
        } else {
            config.name.clone()
        };

        Ok(Self {
            files: config.files,
            routines: config.routines,
            name,
            prefix: config.storage.prefix().to_owned(),
            payload_size,
            queue_capacity: config.queue_capacity,
            timeouts: Timeouts {
                write: config.write_timeout,
                read: config.read_timeout,
            },
        })
    }

    /// Creates settings with default sizes and timeouts for the given run.
    pub fn new(prefix: impl Into<String>, name: impl Into<String>, files: usize, routines: usize) -> Self {
        Self {
            files,
            routines,
            name: name.into(),
            prefix: prefix.into(),
            payload_size: 1024,
            queue_capacity: config::DEFAULT_QUEUE_CAPACITY,
            timeouts: Timeouts {
                write: config::DEFAULT_WRITE_TIMEOUT,
                read: None,
            },
        }
    }

    /// The informational share of objects per worker. Remainders are still processed.
    pub fn objects_per_worker(&self) -> usize {
        self.files / self.routines.max(1)
    }
}

/// A non-negative 31 bit random integer, used as run name when none is given.
fn random_name() -> String {
    (rand::random::<u32>() >> 1).to_string()
}

/// Generates the payload shared by every write of a run.
pub fn generate_payload(size: usize) -> Bytes {
    let rng = SmallRng::seed_from_u64(rand::random());
    rng.sample_iter(Alphanumeric).take(size).collect::<Vec<u8>>().into()
}

/// The results of a run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// The run name used in all keys.
    pub name: String,
    /// The final state.
    pub state: RunState,
    /// The write phase, if it ran.
    pub write: Option<PhaseReport>,
    /// The read phase, if it ran.
    pub read: Option<PhaseReport>,
}

/// Drives the phases of a run against a storage connector.
#[derive(Debug)]
pub struct Runner {
    settings: RunSettings,
    keys: Arc<KeySpace>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    progress: bool,
    state: RunState,
}

impl Runner {
    /// Creates a runner. No connections are opened until [`connect`](Self::connect) or
    /// [`run`](Self::run) is called.
    pub fn new(settings: RunSettings, connector: Arc<dyn Connector>) -> Self {
        let keys = Arc::new(KeySpace::new(
            settings.prefix.clone(),
            settings.name.clone(),
            settings.files,
        ));

        Self {
            settings,
            keys,
            connector,
            cancel: CancellationToken::new(),
            progress: false,
            state: RunState::Init,
        }
    }

    /// Stops producing keys once `cancel` fires. In-flight operations still complete.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Shows a progress bar on stderr while a phase is running.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// The resolved settings.
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// The keys operated on by both phases.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// The current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run state changed");
        self.state = next;
    }

    /// Opens one handle per worker, each with its own write and read session.
    pub async fn connect(&self) -> Result<Vec<Arc<WorkerHandle>>> {
        connect_all(
            self.settings.routines,
            self.connector.as_ref(),
            self.settings.timeouts,
        )
        .await
        .context("failed to initialize storage clients")
    }

    /// Runs `operation` over the whole key space with the given handles.
    ///
    /// Returns once the producer finished and every worker drained the queue.
    pub async fn run_phase(
        &self,
        handles: &[Arc<WorkerHandle>],
        operation: Operation,
    ) -> Result<PhaseReport> {
        let phase = operation.phase();
        let payload_size = match &operation {
            Operation::Write(payload) => Some(payload.len() as u64),
            Operation::Read => None,
        };

        let (queue, producer) = spawn_producer(
            Arc::clone(&self.keys),
            self.settings.queue_capacity,
            self.cancel.clone(),
        );

        let progress = self.progress_bar(phase)?;
        let outcome = run_pool(handles, queue, operation, progress.clone()).await;
        progress.finish_and_clear();
        let outcome = outcome?;

        let produced = producer.await.context("key producer panicked")?;

        Ok(PhaseReport {
            phase,
            routines: handles.len(),
            payload_size,
            total: self.settings.files,
            interrupted: produced < self.settings.files,
            outcome,
        })
    }

    fn progress_bar(&self, phase: Phase) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }

        let bar = ProgressBar::new(self.settings.files as u64)
            .with_message(format!("Running {phase} phase..."))
            .with_style(ProgressStyle::with_template(
                "{msg}\n{wide_bar} {pos}/{len} {elapsed}",
            )?);
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Ok(bar)
    }

    /// Executes the full run: setup, write phase, read phase.
    ///
    /// Setup failures are returned as errors. Failed operations are not errors and only show up
    /// in the phase reports.
    pub async fn run(mut self) -> Result<RunReport> {
        let settings = &self.settings;
        tracing::info!(
            routines = settings.routines,
            name = %settings.name,
            total = settings.files,
            count = settings.objects_per_worker(),
            "starting run"
        );

        let handles = match self.connect().await {
            Ok(handles) => handles,
            Err(err) => {
                self.transition(RunState::Aborted);
                return Err(err);
            }
        };

        let payload = generate_payload(self.settings.payload_size);
        let mut report = RunReport {
            name: self.settings.name.clone(),
            state: self.state,
            write: None,
            read: None,
        };

        self.transition(RunState::WriteActive);
        let write = self.run_phase(&handles, Operation::Write(payload)).await?;
        write.log();
        let interrupted = write.interrupted;
        report.write = Some(write);
        self.transition(RunState::WriteDrained);

        if interrupted {
            self.transition(RunState::Aborted);
            report.state = self.state;
            return Ok(report);
        }

        self.transition(RunState::ReadActive);
        let read = self.run_phase(&handles, Operation::Read).await?;
        read.log();
        let interrupted = read.interrupted;
        report.read = Some(read);
        self.transition(RunState::ReadDrained);

        self.transition(if interrupted {
            RunState::Aborted
        } else {
            RunState::Done
        });
        report.state = self.state;
        Ok(report)
    }
}
