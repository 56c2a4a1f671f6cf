use tracing_subscriber::EnvFilter;

/// Crates whose logs are captured at full verbosity.
const HARNESS_CRATES: &[&str] = &["s3bench", "s3bench_storage", "s3bench_test"];

/// Initialize the logger for tests.
///
/// Output goes through the test writer, so it is only shown for failing tests. If `RUST_LOG` is
/// set it is used verbatim, otherwise the harness crates log at `TRACE` and everything else at
/// `ERROR`. Calling this more than once is fine.
///
/// # Example
///
/// ```
/// s3bench_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| harness_filter());

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

fn harness_filter() -> EnvFilter {
    HARNESS_CRATES
        .iter()
        .filter_map(|name| format!("{name}=TRACE").parse().ok())
        .fold(EnvFilter::new("ERROR"), EnvFilter::add_directive)
}
