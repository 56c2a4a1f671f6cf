//! In-memory backend for dry runs and tests.
//!
//! This provides a [`Backend`] backed by a `HashMap`. The backend is [`Clone`] and every clone
//! shares the same store, so tests can hold a handle for direct inspection while the harness owns
//! boxed copies. It is also its own [`Connector`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{Backend, BoxedBackend, Connector};
use crate::error::{StorageError, StorageResult};

type Store = HashMap<String, Bytes>;

/// A [`Backend`] that keeps all objects in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl InMemoryBackend {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the stored bytes, if present.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.lock().get(key).cloned()
    }

    /// Returns `true` if the backend contains an object at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns all stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // Every access is a single map call, so a poisoned store is still consistent.
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StorageResult<()> {
        self.lock().insert(key.to_owned(), payload);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.get_stored(key)
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }
}

#[async_trait::async_trait]
impl Connector for InMemoryBackend {
    async fn connect(&self) -> StorageResult<BoxedBackend> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let backend = InMemoryBackend::new();
        backend
            .put_object("a/b/00000", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let bytes = backend.get_object("a/b/00000").await.unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert!(backend.contains("a/b/00000"));
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend.get_object("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(key) if key == "nope"));
    }

    #[tokio::test]
    async fn sessions_share_the_store() {
        let backend = InMemoryBackend::new();
        let session = backend.connect().await.unwrap();
        session
            .put_object("k", Bytes::from_static(b"v"))
            .await
            .unwrap();

        assert_eq!(backend.len(), 1);
        assert_eq!(backend.keys(), vec!["k".to_owned()]);
    }

    #[tokio::test]
    async fn put_overwrites() {
        let backend = InMemoryBackend::new();
        backend
            .put_object("k", Bytes::from_static(b"one"))
            .await
            .unwrap();
        backend
            .put_object("k", Bytes::from_static(b"two"))
            .await
            .unwrap();

        assert_eq!(backend.len(), 1);
        assert_eq!(&backend.get_stored("k").unwrap()[..], b"two");
    }
}
