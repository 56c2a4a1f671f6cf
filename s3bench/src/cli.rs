//! Command line entry point: argument parsing, runtime setup and interrupt handling.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use argh::FromArgs;
use s3bench_storage::{Connector, InMemoryBackend};
use tokio_util::sync::CancellationToken;
use yansi::Paint;

use crate::config::{Config, Overrides};
use crate::observability;
use crate::run::{RunSettings, RunState, Runner};

/// Exit code for a second Ctrl-C, as a shell reports death by `SIGINT`.
const INTERRUPT_EXIT_CODE: i32 = 130;

/// Writes a fixed number of objects concurrently, then reads them all back, and reports throughput
/// and latency for both phases.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// total number of objects (default: 1000)
    #[argh(option)]
    files: Option<usize>,

    /// number of concurrent workers (default: 1000)
    #[argh(option)]
    routines: Option<usize>,

    /// number of runtime worker threads, 0 keeps one per CPU core (default: 0)
    #[argh(option)]
    cores: Option<usize>,

    /// run name used in object keys, a random number if empty
    #[argh(option)]
    name: Option<String>,

    /// do not draw progress bars
    #[argh(switch)]
    no_progress: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            files: self.files,
            routines: self.routines,
            cores: self.cores,
            name: self.name.clone(),
        }
    }
}

/// Bootstrap the runtime and execute the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref())?.apply(args.overrides());
    config.validate()?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.thread_name("s3bench-rt").enable_all();
    if config.cores != 0 {
        builder.worker_threads(config.cores);
    }
    let runtime = builder.build()?;
    let _runtime_guard = runtime.enter();

    observability::initialize_tracing();
    tracing::debug!(?config);

    runtime.block_on(benchmark(config, !args.no_progress))
}

/// Cancels `cancel` on the first interrupt from `signal`.
///
/// Returns `true` once a second interrupt arrives, and `false` if the signal source fails.
async fn watch_interrupts<F, Fut>(cancel: CancellationToken, mut signal: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if signal().await.is_err() {
        return false;
    }
    tracing::warn!("interrupted, finishing queued keys (press Ctrl-C again to exit now)");
    cancel.cancel();

    if signal().await.is_err() {
        return false;
    }
    tracing::error!("interrupted twice, exiting without waiting for workers");
    true
}

async fn benchmark(config: Config, progress: bool) -> Result<()> {
    let settings = RunSettings::from_config(&config)?;
    let connector: Arc<dyn Connector> = match config.storage.s3_config() {
        Some(s3) => Arc::new(s3),
        None => Arc::new(InMemoryBackend::new()),
    };

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if watch_interrupts(cancel, tokio::signal::ctrl_c).await {
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
        }
    });

    println!(
        "{} {} (routines: {}, objects: {}, per worker: {})",
        "# Run".bold(),
        settings.name.bold().blue(),
        settings.routines.bold(),
        settings.files.bold(),
        settings.objects_per_worker()
    );

    let result = Runner::new(settings, connector)
        .with_cancellation(cancel)
        .with_progress(progress)
        .run()
        .await;
    interrupt.abort();
    let report = result?;

    for phase in [&report.write, &report.read].into_iter().flatten() {
        println!();
        phase.print();
    }

    if report.state == RunState::Aborted {
        bail!("run `{}` was interrupted", report.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn second_interrupt_requests_exit() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let signal = {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }
        };

        assert!(watch_interrupts(cancel.clone(), signal).await);
        assert!(cancel.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_interrupt_only_cancels() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let signal = {
            let calls = Arc::clone(&calls);
            move || {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if !first {
                        std::future::pending::<()>().await;
                    }
                    Ok(())
                }
            }
        };

        let watcher = tokio::spawn(watch_interrupts(cancel.clone(), signal));
        cancel.cancelled().await;
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;

        assert!(!watcher.is_finished());
        watcher.abort();
    }

    #[tokio::test]
    async fn failing_signal_source_never_cancels() {
        let cancel = CancellationToken::new();
        let signal = || async { Err(io::Error::other("no signal handler")) };

        assert!(!watch_interrupts(cancel.clone(), signal).await);
        assert!(!cancel.is_cancelled());
    }
}
