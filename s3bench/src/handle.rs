//! Per-worker storage handles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use s3bench_storage::{BoxedBackend, Connector, StorageError, StorageResult};

/// Timeouts applied to individual storage operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Upper bound for a single write.
    pub write: Duration,
    /// Optional upper bound for a single read.
    pub read: Option<Duration>,
}

/// The storage state owned by one worker for the whole run.
///
/// Each handle holds two independent sessions, one for writes and one for reads, so that the two
/// phases never share connection pools.
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    writer: BoxedBackend,
    reader: BoxedBackend,
    timeouts: Timeouts,
}

impl WorkerHandle {
    /// Opens both sessions for worker `id`.
    pub async fn connect(id: usize, connector: &dyn Connector, timeouts: Timeouts) -> Result<Self> {
        let writer = connector
            .connect()
            .await
            .with_context(|| format!("failed to open write session for worker {id}"))?;
        let reader = connector
            .connect()
            .await
            .with_context(|| format!("failed to open read session for worker {id}"))?;

        Ok(Self {
            id,
            writer,
            reader,
            timeouts,
        })
    }

    /// The ordinal of the worker owning this handle.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Writes `payload` to `key`, returning the number of bytes written.
    ///
    /// Failures are logged here, distinguishing writes canceled by the timeout.
    pub async fn write(&self, key: &str, payload: Bytes) -> StorageResult<u64> {
        let len = payload.len() as u64;
        let result = bounded(
            Some(self.timeouts.write),
            self.writer.put_object(key, payload),
        )
        .await;

        match result {
            Ok(()) => Ok(len),
            Err(err) => {
                let error = &err as &dyn std::error::Error;
                if err.is_timeout() {
                    tracing::info!(key, error, "upload canceled due to timeout");
                } else {
                    tracing::info!(key, error, "failed to upload object");
                }
                Err(err)
            }
        }
    }

    /// Reads the object at `key`, returning the number of bytes received.
    pub async fn read(&self, key: &str) -> StorageResult<u64> {
        let bytes = bounded(self.timeouts.read, self.reader.get_object(key)).await?;
        Ok(bytes.len() as u64)
    }
}

async fn bounded<T>(
    timeout: Option<Duration>,
    operation: impl Future<Output = StorageResult<T>>,
) -> StorageResult<T> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| StorageError::Timeout(timeout))?,
        None => operation.await,
    }
}

/// Opens `count` worker handles one after another.
///
/// The first failure aborts setup and is returned.
pub async fn connect_all(
    count: usize,
    connector: &dyn Connector,
    timeouts: Timeouts,
) -> Result<Vec<Arc<WorkerHandle>>> {
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let handle = WorkerHandle::connect(id, connector, timeouts).await?;
        handles.push(Arc::new(handle));
    }
    tracing::debug!(count, "worker handles ready");
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use s3bench_storage::{Backend, InMemoryBackend};
    use s3bench_test::backend::{LimitedConnector, SlowBackend};

    use super::*;

    const TIMEOUTS: Timeouts = Timeouts {
        write: Duration::from_secs(1),
        read: None,
    };

    #[tokio::test]
    async fn write_then_read_counts_bytes() {
        let backend = InMemoryBackend::new();
        let handle = WorkerHandle::connect(3, &backend, TIMEOUTS).await.unwrap();
        assert_eq!(handle.id(), 3);

        let written = handle
            .write("k", Bytes::from_static(b"12345"))
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(handle.read("k").await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_times_out() {
        s3bench_test::tracing::init();
        let backend = SlowBackend::new(InMemoryBackend::new(), Duration::from_secs(5));
        let handle = WorkerHandle::connect(0, &backend, TIMEOUTS).await.unwrap();

        let err = handle.write("k", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout(t) if t == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn reads_are_unbounded_by_default() {
        let store = InMemoryBackend::new();
        store.put_object("k", Bytes::from_static(b"x")).await.unwrap();
        let backend = SlowBackend::new(store, Duration::from_secs(3600));
        let handle = WorkerHandle::connect(0, &backend, TIMEOUTS).await.unwrap();

        assert_eq!(handle.read("k").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_applies_when_set() {
        let backend = SlowBackend::new(InMemoryBackend::new(), Duration::from_secs(5));
        let timeouts = Timeouts {
            read: Some(Duration::from_secs(2)),
            ..TIMEOUTS
        };
        let handle = WorkerHandle::connect(0, &backend, timeouts).await.unwrap();

        let err = handle.read("k").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn setup_failure_is_fatal() {
        // Two workers need four sessions.
        let connector = LimitedConnector::new(InMemoryBackend::new(), 3);
        let err = connect_all(2, &connector, TIMEOUTS).await.unwrap_err();
        assert!(format!("{err:#}").contains("worker 1"));
    }

    #[tokio::test]
    async fn connects_requested_number_of_handles() {
        let handles = connect_all(4, &InMemoryBackend::new(), TIMEOUTS)
            .await
            .unwrap();
        let ids: Vec<_> = handles.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
