//! Backends that inject faults or record traffic, all built on top of [`InMemoryBackend`].
//!
//! Every type here is also a [`Connector`], handing out sessions that share one store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use s3bench_storage::{
    Backend, BoxedBackend, Connector, InMemoryBackend, StorageError, StorageResult,
};

/// Parses the trailing sequence index of a generated key, e.g. `42` for `prefix/run/00042`.
pub fn key_index(key: &str) -> Option<u64> {
    key.rsplit('/').next()?.parse().ok()
}

/// Fails every operation whose key index is a multiple of `every`.
///
/// Keys without a numeric index never fail.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    every: u64,
}

impl FailingBackend {
    /// Wraps `inner`, failing keys `0, every, 2 * every, ...`.
    pub fn new(inner: InMemoryBackend, every: u64) -> Self {
        assert!(every > 0, "`every` must be positive");
        Self { inner, every }
    }

    /// The number of keys out of `0..total` this backend rejects.
    pub fn failures_for(&self, total: u64) -> u64 {
        total.div_ceil(self.every)
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        match key_index(key) {
            Some(index) if index % self.every == 0 => Err(StorageError::sdk(
                "injected failure",
                std::io::Error::other(format!("rejecting {key}")),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StorageResult<()> {
        self.check(key)?;
        self.inner.put_object(key, payload).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.check(key)?;
        self.inner.get_object(key).await
    }
}

#[async_trait::async_trait]
impl Connector for FailingBackend {
    async fn connect(&self) -> StorageResult<BoxedBackend> {
        Ok(Box::new(self.clone()))
    }
}

/// Delays every operation by a fixed duration before delegating to the store.
#[derive(Debug, Clone)]
pub struct SlowBackend {
    inner: InMemoryBackend,
    delay: Duration,
}

impl SlowBackend {
    /// Wraps `inner`, sleeping `delay` before each operation.
    pub fn new(inner: InMemoryBackend, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait::async_trait]
impl Backend for SlowBackend {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_object(key, payload).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_object(key).await
    }
}

#[async_trait::async_trait]
impl Connector for SlowBackend {
    async fn connect(&self) -> StorageResult<BoxedBackend> {
        Ok(Box::new(self.clone()))
    }
}

/// The kind of operation seen by a [`RecordingConnector`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Op {
    /// A `put_object` call.
    Put,
    /// A `get_object` call.
    Get,
}

/// A single operation observed on a recorded session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Recorded {
    /// Sequential id of the session, in the order sessions were opened.
    pub session: usize,
    /// The operation kind.
    pub op: Op,
    /// The key passed to the backend.
    pub key: String,
}

#[derive(Debug, Default)]
struct RecorderState {
    sessions: AtomicUsize,
    log: Mutex<Vec<Recorded>>,
}

/// Hands out sessions that log every operation together with the session that served it.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    inner: InMemoryBackend,
    state: Arc<RecorderState>,
}

impl RecordingConnector {
    /// Records traffic against `inner`.
    pub fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            state: Arc::default(),
        }
    }

    /// The number of sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// All recorded operations, in completion order.
    pub fn log(&self) -> Vec<Recorded> {
        self.state.log.lock().unwrap().clone()
    }

    /// The number of operations of kind `op` served by each session.
    pub fn ops_by_session(&self, op: Op) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.state.log.lock().unwrap().iter() {
            if entry.op == op {
                *counts.entry(entry.session).or_default() += 1;
            }
        }
        counts
    }
}

#[async_trait::async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self) -> StorageResult<BoxedBackend> {
        let session = self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingBackend {
            session,
            inner: self.inner.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct RecordingBackend {
    session: usize,
    inner: InMemoryBackend,
    state: Arc<RecorderState>,
}

impl RecordingBackend {
    fn record(&self, op: Op, key: &str) {
        self.state.log.lock().unwrap().push(Recorded {
            session: self.session,
            op,
            key: key.to_owned(),
        });
    }
}

#[async_trait::async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StorageResult<()> {
        self.record(Op::Put, key);
        self.inner.put_object(key, payload).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.record(Op::Get, key);
        self.inner.get_object(key).await
    }
}

/// A connector that fails after handing out `limit` sessions.
#[derive(Debug, Clone)]
pub struct LimitedConnector {
    inner: InMemoryBackend,
    limit: usize,
    opened: Arc<AtomicUsize>,
}

impl LimitedConnector {
    /// Allows `limit` sessions to be opened, then rejects further attempts.
    pub fn new(inner: InMemoryBackend, limit: usize) -> Self {
        Self {
            inner,
            limit,
            opened: Arc::default(),
        }
    }
}

#[async_trait::async_trait]
impl Connector for LimitedConnector {
    async fn connect(&self) -> StorageResult<BoxedBackend> {
        if self.opened.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(StorageError::Config("session limit reached".to_owned()));
        }
        self.inner.connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_index() {
        assert_eq!(key_index("s3-test/run/00042"), Some(42));
        assert_eq!(key_index("s3-test/run/x"), None);
    }

    #[tokio::test]
    async fn failing_backend_rejects_multiples() {
        let backend = FailingBackend::new(InMemoryBackend::new(), 3);
        assert!(backend.put_object("p/r/00000", Bytes::new()).await.is_err());
        assert!(backend.put_object("p/r/00001", Bytes::new()).await.is_ok());
        assert!(backend.put_object("p/r/00003", Bytes::new()).await.is_err());
        assert_eq!(backend.failures_for(10), 4);
    }

    #[tokio::test]
    async fn recording_tracks_sessions() {
        let connector = RecordingConnector::new(InMemoryBackend::new());
        let first = connector.connect().await.unwrap();
        let second = connector.connect().await.unwrap();

        first.put_object("a", Bytes::new()).await.unwrap();
        second.get_object("a").await.unwrap();
        second.get_object("b").await.unwrap_err();

        assert_eq!(connector.sessions(), 2);
        assert_eq!(connector.ops_by_session(Op::Put), BTreeMap::from([(0, 1)]));
        assert_eq!(connector.ops_by_session(Op::Get), BTreeMap::from([(1, 2)]));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_delays() {
        let backend = SlowBackend::new(InMemoryBackend::new(), Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        backend.put_object("k", Bytes::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn limited_connector_rejects_extra_sessions() {
        let connector = LimitedConnector::new(InMemoryBackend::new(), 1);
        assert!(connector.connect().await.is_ok());
        assert!(connector.connect().await.is_err());
    }
}
