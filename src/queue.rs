//! The durable FIFO of pending telemetry records.
//!
//! Backed by a Redis list: new records are appended to the tail, the
//! drain pops chunks off the head. Record payloads are independent JSON
//! documents, so one undecodable entry never poisons the rest of the
//! queue.
#[cfg(test)]
use std::collections::VecDeque;
use std::ops::ControlFlow;

use thiserror::Error;

use crate::telemetry::TelemetryRecord;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue store command failed: {0}")]
    Store(#[from] redis::RedisError),

    #[error("could not serialize telemetry record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How a drain pass over the queue ended.
#[derive(Debug, PartialEq)]
pub enum DrainOutcome<T> {
    /// The queue was observed empty after this many records.
    Drained(usize),
    /// The handler stopped the pass early.
    Stopped(T),
}

enum Store {
    Redis {
        connection: redis::Connection,
        /// LPOP learned a count argument in Redis 6.2; older servers get
        /// a single-pop loop instead.
        bulk_lpop: bool,
    },
    #[cfg(test)]
    InMemory(VecDeque<Vec<u8>>),
}

/// FIFO queue of serialized [`TelemetryRecord`]s under one list key.
///
/// Dequeueing assumes a single consumer per drain invocation; producers
/// appending new records concurrently are fine since all writes go to
/// the tail and all reads come off the head.
pub struct DeliveryQueue {
    store: Store,
    key: String,
}

impl DeliveryQueue {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let mut connection = client.get_connection()?;
        let bulk_lpop = supports_bulk_lpop(&mut connection);
        Ok(Self {
            store: Store::Redis {
                connection,
                bulk_lpop,
            },
            key: key.into(),
        })
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            store: Store::InMemory(VecDeque::new()),
            key: "usage_relay_pending_traces".to_string(),
        }
    }

    /// Appends records to the tail of the queue.
    ///
    /// Every record is serialized before the store is touched and the
    /// append is a single store command, so either all records are
    /// queued or none are.
    pub fn enqueue(&mut self, records: &[TelemetryRecord]) -> Result<(), QueueError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut payloads = Vec::with_capacity(records.len());
        for record in records {
            payloads.push(serde_json::to_vec(record)?);
        }

        match &mut self.store {
            Store::Redis { connection, .. } => {
                redis::cmd("RPUSH")
                    .arg(&self.key)
                    .arg(payloads)
                    .query::<i64>(connection)?;
            }
            #[cfg(test)]
            Store::InMemory(list) => list.extend(payloads),
        }
        Ok(())
    }

    /// Removes and returns up to `max_count` records from the head.
    ///
    /// Entries that no longer decode are dropped with a warning; they
    /// have already been removed from the store and could never be
    /// submitted anyway.
    pub fn dequeue_chunk(&mut self, max_count: usize) -> Result<Vec<TelemetryRecord>, QueueError> {
        let mut records = Vec::new();
        for payload in self.pop_raw(max_count)? {
            match serde_json::from_slice(&payload) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!("dropping undecodable queue entry: {err}");
                }
            }
        }
        Ok(records)
    }

    /// The number of pending records. Only an observability hint when
    /// producers are writing concurrently.
    pub fn len(&mut self) -> Result<usize, QueueError> {
        match &mut self.store {
            Store::Redis { connection, .. } => {
                Ok(redis::cmd("LLEN").arg(&self.key).query(connection)?)
            }
            #[cfg(test)]
            Store::InMemory(list) => Ok(list.len()),
        }
    }

    pub fn is_empty(&mut self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    /// Drives `handler` over the queue in chunks of at most `chunk_size`
    /// until the queue is observed empty or the handler breaks early.
    ///
    /// The chunk size bounds both memory use and the payload of each
    /// network submission. Only records present when the pass started
    /// are processed; anything appended afterwards waits for the next
    /// pass.
    pub fn process_in_chunks<T, F>(
        &mut self,
        chunk_size: usize,
        mut handler: F,
    ) -> Result<DrainOutcome<T>, QueueError>
    where
        F: FnMut(Vec<TelemetryRecord>) -> ControlFlow<T>,
    {
        let total = self.len()?;
        let mut processed = 0;

        while processed < total {
            let to_fetch = chunk_size.min(total - processed);
            if to_fetch == 0 {
                break;
            }
            let chunk = self.dequeue_chunk(to_fetch)?;
            if chunk.is_empty() {
                break;
            }
            processed += chunk.len();
            if let ControlFlow::Break(value) = handler(chunk) {
                return Ok(DrainOutcome::Stopped(value));
            }
        }

        Ok(DrainOutcome::Drained(processed))
    }

    fn pop_raw(&mut self, max_count: usize) -> Result<Vec<Vec<u8>>, QueueError> {
        match &mut self.store {
            Store::Redis {
                connection,
                bulk_lpop,
            } => {
                if *bulk_lpop {
                    let values: Option<Vec<Vec<u8>>> = redis::cmd("LPOP")
                        .arg(&self.key)
                        .arg(max_count)
                        .query(connection)?;
                    Ok(values.unwrap_or_default())
                } else {
                    let mut values = Vec::new();
                    while values.len() < max_count {
                        let value: Option<Vec<u8>> =
                            redis::cmd("LPOP").arg(&self.key).query(connection)?;
                        match value {
                            Some(payload) => values.push(payload),
                            None => break,
                        }
                    }
                    Ok(values)
                }
            }
            #[cfg(test)]
            Store::InMemory(list) => {
                let count = max_count.min(list.len());
                Ok(list.drain(..count).collect())
            }
        }
    }
}

fn supports_bulk_lpop(connection: &mut redis::Connection) -> bool {
    let info: redis::InfoDict = match redis::cmd("INFO").arg("server").query(connection) {
        Ok(info) => info,
        Err(_) => return false,
    };
    let version: String = match info.get("redis_version") {
        Some(version) => version,
        None => return false,
    };
    let mut parts = version.split('.').map(|part| part.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major > 6 || (major == 6 && minor >= 2)
}
