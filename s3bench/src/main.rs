//! Runs the object-storage benchmark from the command line.
//!
//! See `s3bench --help` for the available flags, and the [`config`](s3bench::config) module for
//! the YAML and environment configuration.

use anyhow::Result;

fn main() -> Result<()> {
    s3bench::cli::execute()
}
