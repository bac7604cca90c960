//! Generation of the write requests that make up a workload.
//!
//! The [`WorkloadGenerator`] produces the whole workload up front and buffers it in a
//! [`JobQueue`] sized to hold every request, which workers then drain concurrently.

use std::borrow::Cow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use btwrite_store::ROW_KEY_SEPARATOR;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::keyspace::KeySpace;

/// A single counter increment to perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    /// Unix timestamp in seconds at which the request was created.
    pub timestamp: i64,
    /// The address whose counter is incremented.
    pub key: String,
}

impl WriteRequest {
    /// Returns the row key to write to.
    ///
    /// With `timestamped` set, the row key is `<key>#<timestamp>`, otherwise just the key.
    pub fn row_key(&self, timestamped: bool) -> Cow<'_, str> {
        if timestamped {
            Cow::Owned(format!("{}{ROW_KEY_SEPARATOR}{}", self.key, self.timestamp))
        } else {
            Cow::Borrowed(&self.key)
        }
    }
}

impl fmt::Display for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.key, self.timestamp)
    }
}

/// A bounded, multi-consumer queue of [`WriteRequest`]s.
///
/// The queue is filled completely before any worker starts and closed afterwards, so
/// [`pop`](Self::pop) returns `None` once all requests have been handed out.
#[derive(Debug)]
pub struct JobQueue {
    receiver: Mutex<mpsc::Receiver<WriteRequest>>,
    capacity: usize,
}

impl JobQueue {
    fn bounded(capacity: usize) -> (mpsc::Sender<WriteRequest>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            receiver: Mutex::new(receiver),
            capacity,
        };
        (sender, queue)
    }

    /// The number of requests this queue was sized for.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes the next request, or `None` if the queue is drained.
    pub async fn pop(&self) -> Option<WriteRequest> {
        self.receiver.lock().await.recv().await
    }

    /// Returns the number of requests still waiting in the queue.
    pub async fn remaining(&self) -> usize {
        self.receiver.lock().await.len()
    }
}

/// Produces [`WriteRequest`]s with keys sampled uniformly from a [`KeySpace`].
#[derive(Debug)]
pub struct WorkloadGenerator {
    keyspace: KeySpace,
    rng: SmallRng,
}

impl WorkloadGenerator {
    /// Creates a generator seeded with `seed`, or with a random seed if `None`.
    pub fn new(keyspace: KeySpace, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            keyspace,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Samples the next request, stamped with the current time.
    pub fn next_request(&mut self) -> WriteRequest {
        let key = self.keyspace.choose(&mut self.rng).to_string();
        WriteRequest {
            timestamp: unix_timestamp(),
            key,
        }
    }

    /// Generates `records` requests into a closed [`JobQueue`].
    ///
    /// The queue is sized to `records`, so this never waits for consumers.
    pub fn fill(mut self, records: usize) -> Result<JobQueue> {
        let (sender, queue) = JobQueue::bounded(records);
        for _ in 0..records {
            sender
                .try_send(self.next_request())
                .map_err(|_| Error::QueueFull { capacity: records })?;
        }

        Ok(queue)
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}
