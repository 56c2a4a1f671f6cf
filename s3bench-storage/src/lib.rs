//! The storage layer of the benchmark harness.
//!
//! This crate wraps the object-storage client behind the small [`Backend`] trait so that the
//! harness only ever sees `put_object(key, bytes)` and `get_object(key)`. Backends are created
//! through a [`Connector`], which allows the harness to open independent sessions per worker.
//!
//! Two implementations are provided:
//!
//! - [`S3Backend`] talks to Amazon S3 or an S3-compatible service via the AWS SDK.
//! - [`InMemoryBackend`] keeps objects in a `HashMap`, which is useful for dry runs and tests.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod error;

pub use backend::{Backend, BoxedBackend, Connector, InMemoryBackend, S3Backend, S3Config};
pub use error::{StorageError, StorageResult};
