use crate::error::Result;
use crate::storage::{load_entries, Storage};
use crate::transport::Transport;
use crate::types::{new_submission_id, now_iso, strip_keys, DrainResult, PendingSubmission, Record};

/// Durable FIFO of submissions that could not be delivered yet.
///
/// Every mutation rewrites the whole serialized queue under one storage
/// key, so a failed write never leaves a half-updated blob behind.
pub struct OfflineQueue<S: Storage> {
    storage: S,
    key: String,
    entries: Vec<PendingSubmission>,
}

impl<S: Storage> OfflineQueue<S> {
    /// Load the queue stored under `key`. An unreadable blob is logged and
    /// the queue starts empty; an unreadable entry is logged and skipped.
    pub fn open(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let entries = load_entries(&storage, &key, "queue");

        OfflineQueue {
            storage,
            key,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PendingSubmission] {
        &self.entries
    }

    /// Copy of the queue as it stands, for a drain pass
    pub fn snapshot(&self) -> Vec<PendingSubmission> {
        self.entries.clone()
    }

    /// Append a record, stamped with the current time and a fresh id.
    /// A `timestamp` or `submittedBy` already present in the record is
    /// lifted into the entry's own fields; an `id` field is dropped, since
    /// it would shadow the entry id in the stored blob. Returns the entry id.
    pub fn enqueue(&mut self, mut record: Record) -> Result<String> {
        record.remove("timestamp");
        let submitted_by = record.remove("submittedBy").unwrap_or_default();
        for key in strip_keys(&mut record, &PendingSubmission::KEYS) {
            crate::console_warn!("[queue] dropping field '{}' that clashes with the entry key", key);
        }

        let entry = PendingSubmission {
            id: new_submission_id(),
            timestamp: now_iso(),
            submitted_by,
            fields: record,
        };
        let id = entry.id.clone();
        self.entries.push(entry);
        crate::console_log!("[queue] stored submission {} ({} pending)", id, self.len());

        self.persist()?;
        Ok(id)
    }

    /// Drop the given entries, keeping the rest in order.
    /// Returns how many were removed.
    pub fn remove(&mut self, ids: &[String]) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|entry| !ids.contains(&entry.id));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Try every queued record once, in order, and drop the delivered ones.
    /// Failures stay queued for the next pass; nothing here retries.
    pub async fn drain<T: Transport>(&mut self, transport: &mut T) -> DrainResult {
        let snapshot = self.snapshot();
        let delivered = deliver(&snapshot, transport).await;
        self.settle(snapshot.len(), &delivered)
    }

    /// Close a delivery pass over `attempted` entries: drop the delivered
    /// ones and tally the rest as failed.
    pub fn settle(&mut self, attempted: usize, delivered: &[String]) -> DrainResult {
        let failed = attempted.saturating_sub(delivered.len());
        let removed = match self.remove(delivered) {
            Ok(removed) => removed,
            Err(e) => {
                // In-memory queue is already trimmed; the next write catches storage up
                crate::console_warn!("[queue] could not persist drained queue: {}", e);
                delivered.len()
            }
        };

        DrainResult { removed, failed }
    }

    fn persist(&mut self) -> Result<()> {
        let blob = serde_json::to_string(&self.entries)?;
        self.storage.save(&self.key, &blob)
    }
}

/// Submit each entry in turn, one in flight at a time, and return the ids
/// the transport accepted.
pub async fn deliver<T: Transport>(entries: &[PendingSubmission], transport: &mut T) -> Vec<String> {
    let mut delivered = Vec::new();
    for entry in entries {
        match transport.submit(&entry.payload()).await {
            Ok(()) => delivered.push(entry.id.clone()),
            Err(e) => crate::console_warn!("[queue] sync error for {}: {}", entry.id, e),
        }
    }
    delivered
}
