//! Logging setup for the benchmark binary.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default directives used when `RUST_LOG` is unset or a bare level.
const DEFAULT_DIRECTIVES: &str = "INFO,\
    aws_config=WARN,\
    aws_smithy_runtime=WARN,\
    s3bench=TRACE,\
    s3bench_storage=TRACE";

/// Installs the global logger.
///
/// Logs go to stderr so that the report printed on stdout stays readable.
pub fn initialize_tracing() {
    let (max_level, directives) = parse_rust_log();
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(LevelFilter::from_level(max_level));

    tracing_subscriber::registry()
        .with(stderr)
        .with(directives)
        .init();
}

/// Resolves the log level and filter from `RUST_LOG`.
///
/// A bare level such as `debug` caps the default directives. Anything else is taken as a full
/// filter expression and logged up to `TRACE`.
pub fn parse_rust_log() -> (Level, EnvFilter) {
    let Ok(raw) = std::env::var(EnvFilter::DEFAULT_ENV) else {
        return (Level::INFO, EnvFilter::new(DEFAULT_DIRECTIVES));
    };

    match raw.parse::<Level>() {
        Ok(level) => (level, EnvFilter::new(DEFAULT_DIRECTIVES)),
        Err(_) => (Level::TRACE, EnvFilter::new(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_level_keeps_default_directives() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "debug");

            let (level, filter) = parse_rust_log();
            assert_eq!(level, Level::DEBUG);
            assert!(filter.to_string().to_lowercase().contains("s3bench=trace"));
            Ok(())
        });
    }

    #[test]
    fn directives_are_used_verbatim() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "s3bench_storage=warn");

            let (level, filter) = parse_rust_log();
            assert_eq!(level, Level::TRACE);
            assert_eq!(filter.to_string().to_lowercase(), "s3bench_storage=warn");
            Ok(())
        });
    }
}
