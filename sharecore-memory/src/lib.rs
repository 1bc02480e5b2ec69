//! In-memory adapters for the `ShareCore` engine.
//!
//! This crate provides in-memory implementations of the `LedgerStore`
//! and `NotificationSink` traits from the sharecore crate, useful for
//! testing and development scenarios where persistence is not required.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sharecore::errors::{LedgerError, LedgerResult};
use sharecore::ledger::{EntryFilter, LedgerEntry, LedgerStore, NewEntry};
use sharecore::notification::{DeliveryError, Notification, NotificationSink};
use sharecore::types::{EntryId, LedgerSequence, Timestamp};

/// Thread-safe in-memory ledger store for testing.
///
/// Entries live in a single append-only vector; sequences are assigned
/// under the write lock, so they are gap-free and strictly increasing
/// even under concurrent appends.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedgerStore {
    /// Create a new empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries appended so far.
    pub fn len(&self) -> usize {
        self.entries.read().expect("RwLock poisoned").len()
    }

    /// Returns whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn seal(entry: NewEntry, sequence: LedgerSequence) -> LedgerEntry {
        LedgerEntry {
            sequence,
            entry_id: EntryId::new(),
            entry_type: entry.entry_type,
            project_id: entry.project_id,
            actor_id: entry.actor_id,
            recorded_at: Timestamp::now(),
            metadata: entry.metadata,
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, entry: NewEntry) -> LedgerResult<LedgerSequence> {
        self.append_batch(vec![entry]).await
    }

    async fn append_batch(&self, entries: Vec<NewEntry>) -> LedgerResult<LedgerSequence> {
        if entries.is_empty() {
            return Err(LedgerError::AppendFailed(
                "cannot append an empty batch".to_string(),
            ));
        }
        let mut store = self.entries.write().expect("RwLock poisoned");
        let mut sequence = store
            .last()
            .map_or_else(LedgerSequence::initial, |e| e.sequence.next());
        let mut last = sequence;
        for entry in entries {
            last = sequence;
            store.push(Self::seal(entry, sequence));
            sequence = sequence.next();
        }
        Ok(last)
    }

    async fn read(&self, filter: &EntryFilter) -> LedgerResult<Vec<LedgerEntry>> {
        let store = self.entries.read().expect("RwLock poisoned");
        let mut matched: Vec<LedgerEntry> = store
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        if let Some(max) = filter.max_entries {
            matched.truncate(max);
        }
        Ok(matched)
    }

    async fn head(&self) -> LedgerResult<Option<LedgerSequence>> {
        let store = self.entries.read().expect("RwLock poisoned");
        Ok(store.last().map(|e| e.sequence))
    }
}

/// A sink that records every delivered notification, for assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    delivered: Arc<RwLock<Vec<Notification>>>,
}

impl RecordingSink {
    /// Create a new empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.read().expect("RwLock poisoned").clone()
    }

    /// Number of notifications delivered so far.
    pub fn count(&self) -> usize {
        self.delivered.read().expect("RwLock poisoned").len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: Notification) -> Result<(), DeliveryError> {
        self.delivered
            .write()
            .expect("RwLock poisoned")
            .push(notification);
        Ok(())
    }
}

/// A sink that fails every delivery, for exercising the engine's
/// delivery-failure tolerance.
#[derive(Clone, Copy, Default)]
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _notification: Notification) -> Result<(), DeliveryError> {
        Err(DeliveryError("sink is down".to_string()))
    }
}
