use std::fmt::Debug;

use bytes::Bytes;

use crate::error::StorageResult;

mod in_memory;
mod s3;

pub use in_memory::InMemoryBackend;
pub use s3::{S3Backend, S3Config};

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// A single storage-client session.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores or overwrites the object at `key`.
    async fn put_object(&self, key: &str, payload: Bytes) -> StorageResult<()>;

    /// Retrieves the full contents of the object at `key`.
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if there is no such
    /// object. The response body is consumed completely before returning.
    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;
}

/// Opens new [`Backend`] sessions.
///
/// Every call to [`connect`](Self::connect) yields an independent session, so that workers never
/// share client state.
#[async_trait::async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// Creates a new session.
    async fn connect(&self) -> StorageResult<BoxedBackend>;
}
