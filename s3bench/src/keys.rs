//! Key generation and the bounded queue that feeds keys to the workers.
//!
//! A [`KeySpace`] describes the keys of a run: `{prefix}/{name}/{index}`, where the index is
//! zero-padded so that lexicographic order matches sequence order. [`spawn_producer`] pushes the
//! keys of a key space into a bounded channel and closes it after the last key. Workers pull from
//! the shared [`KeyQueue`] until it reports that the channel is closed and drained.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Minimum number of digits in the key index.
pub const MIN_INDEX_WIDTH: usize = 5;

/// The ordered set of object keys operated on during a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeySpace {
    prefix: String,
    name: String,
    total: usize,
    width: usize,
}

impl KeySpace {
    /// Creates the key space for `total` objects of the run `name`.
    pub fn new(prefix: impl Into<String>, name: impl Into<String>, total: usize) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
            total,
            width: index_width(total),
        }
    }

    /// The number of keys in this key space.
    pub fn len(&self) -> usize {
        self.total
    }

    /// Returns `true` if this key space contains no keys.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// The run name embedded in every key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key with the given sequence index.
    pub fn key(&self, index: usize) -> String {
        format!(
            "{}/{}/{:0width$}",
            self.prefix,
            self.name,
            index,
            width = self.width
        )
    }

    /// Iterates over all keys in increasing sequence order.
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.total).map(|index| self.key(index))
    }
}

/// Number of digits used for indices in a key space of `total` keys.
///
/// This is at least [`MIN_INDEX_WIDTH`], and grows when the largest index needs more digits.
pub fn index_width(total: usize) -> usize {
    let largest = total.saturating_sub(1);
    let digits = largest.checked_ilog10().map_or(1, |log| log as usize + 1);
    digits.max(MIN_INDEX_WIDTH)
}

/// The consuming end of the key channel, shared by all workers of a phase.
///
/// Cloning the queue hands out another consumer of the same channel. Every key is delivered to
/// exactly one consumer.
#[derive(Clone, Debug)]
pub struct KeyQueue(Arc<Mutex<mpsc::Receiver<String>>>);

impl KeyQueue {
    /// Waits for the next key.
    ///
    /// Returns `None` once the producer has finished and the channel is drained.
    pub async fn next(&self) -> Option<String> {
        self.0.lock().await.recv().await
    }
}

/// Spawns a task that feeds every key of `keys` into a channel of the given capacity.
///
/// The task closes the channel when all keys were sent or when `cancel` fires, and resolves to
/// the number of keys it sent. The producer waits while the channel is full.
pub fn spawn_producer(
    keys: Arc<KeySpace>,
    capacity: usize,
    cancel: CancellationToken,
) -> (KeyQueue, JoinHandle<usize>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let producer = tokio::spawn(async move {
        let mut sent = 0;
        for key in keys.iter() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(sent, "key producer canceled");
                    break;
                }
                result = tx.send(key) => {
                    if result.is_err() {
                        break;
                    }
                }
            }
            sent += 1;
        }
        sent
    });

    (KeyQueue(Arc::new(Mutex::new(rx))), producer)
}
