//! Change feed for table mutations.
//!
//! Every insert, update or delete is assigned a monotonically increasing
//! sequence number, kept in a bounded log for long-poll catch-up and fanned
//! out to in-process subscribers over a broadcast channel.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StoreError;
use crate::person::PersonId;

/// Kind of mutation that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub seq: u64,
    pub kind: ChangeKind,
    pub table: String,
    pub record_id: PersonId,
    /// Unix timestamp in milliseconds
    pub at_ms: u64,
}

/// Events returned for a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedBatch {
    pub events: Vec<ChangeEvent>,
    /// Sequence number to pass as `after` on the next poll
    pub cursor: u64,
    /// Events after the requested cursor were evicted from the log
    pub truncated: bool,
    /// Identifies the feed instance; sequence numbers restart when it changes
    #[serde(default)]
    pub epoch: String,
}

impl FeedBatch {
    /// Whether this batch tells the subscriber that something changed.
    pub fn has_changes(&self) -> bool {
        !self.events.is_empty() || self.truncated
    }
}

#[derive(Debug)]
struct FeedLog {
    events: VecDeque<ChangeEvent>,
    last_seq: u64,
}

/// Bounded, sequenced change feed.
#[derive(Debug)]
pub struct ChangeFeed {
    log: Mutex<FeedLog>,
    capacity: usize,
    sender: broadcast::Sender<ChangeEvent>,
    epoch: String,
}

impl ChangeFeed {
    /// Creates a feed retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            log: Mutex::new(FeedLog {
                events: VecDeque::with_capacity(capacity),
                last_seq: 0,
            }),
            capacity,
            sender,
            epoch: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Identifier of this feed instance. Cursors are only meaningful within one epoch.
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Current cursor with no events, for subscribers that are just starting.
    pub fn handshake(&self) -> Result<FeedBatch, StoreError> {
        Ok(FeedBatch {
            events: Vec::new(),
            cursor: self.head()?,
            truncated: false,
            epoch: self.epoch.clone(),
        })
    }

    /// Records a change and notifies subscribers.
    pub fn publish(
        &self,
        kind: ChangeKind,
        table: &str,
        record_id: PersonId,
    ) -> Result<ChangeEvent, StoreError> {
        let event = {
            let mut log = self.log.lock().map_err(|_| StoreError::LockPoisoned)?;
            log.last_seq += 1;
            let event = ChangeEvent {
                seq: log.last_seq,
                kind,
                table: table.to_string(),
                record_id,
                at_ms: now_ms(),
            };
            if log.events.len() == self.capacity {
                log.events.pop_front();
            }
            log.events.push_back(event.clone());
            event
        };

        tracing::debug!(
            "Change #{} {:?} on {} ({})",
            event.seq,
            event.kind,
            event.table,
            event.record_id
        );
        // No receivers is fine; long-poll readers use the log.
        let _ = self.sender.send(event.clone());
        Ok(event)
    }

    /// Sequence number of the latest event (0 before any change).
    pub fn head(&self) -> Result<u64, StoreError> {
        let log = self.log.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(log.last_seq)
    }

    /// Returns the retained events with `seq > after`.
    pub fn since(&self, after: u64) -> Result<FeedBatch, StoreError> {
        let log = self.log.lock().map_err(|_| StoreError::LockPoisoned)?;
        if after > log.last_seq {
            // Cursor handed out by an earlier process; everything may have changed.
            return Ok(FeedBatch {
                events: Vec::new(),
                cursor: log.last_seq,
                truncated: true,
                epoch: self.epoch.clone(),
            });
        }
        let oldest_retained = log.events.front().map(|e| e.seq);
        let truncated = match oldest_retained {
            Some(oldest) => after + 1 < oldest,
            None => after < log.last_seq,
        };
        let events = log
            .events
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect();
        Ok(FeedBatch {
            events,
            cursor: log.last_seq,
            truncated,
            epoch: self.epoch.clone(),
        })
    }

    /// Waits up to `wait` for events after `after`.
    ///
    /// Returns immediately if such events are already retained.
    pub async fn wait_since(&self, after: u64, wait: Duration) -> Result<FeedBatch, StoreError> {
        // Subscribe before checking the log so no publish slips between them.
        let mut rx = self.sender.subscribe();
        let batch = self.since(after)?;
        if batch.has_changes() {
            return Ok(batch);
        }

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(event)) if event.seq <= after => continue,
                // New event, lagged receiver, closed channel or deadline.
                _ => break,
            }
        }
        self.since(after)
    }

    /// Subscribes to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
