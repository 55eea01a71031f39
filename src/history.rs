//! Append-only record of completed compactions.
//!
//! Recording history is best-effort telemetry: an append failure is logged
//! and the compaction still counts as successful. The ledger is never
//! mutated or pruned by this subsystem.

use std::sync::Mutex;

use thiserror::Error;
use ulid::Ulid;

use crate::segment::Generation;

/// One completed compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Unique id of the compaction.
    pub compaction_id: Ulid,
    /// Keyspace of the compacted table.
    pub keyspace: String,
    /// Name of the compacted table.
    pub table: String,
    /// Generations of the merged input segments.
    pub input_generations: Vec<Generation>,
    /// Total bytes read from the inputs.
    pub bytes_in: u64,
    /// Total bytes written to the outputs.
    pub bytes_out: u64,
    /// Task start, milliseconds since epoch.
    pub started_at: u64,
    /// Task completion, milliseconds since epoch.
    pub finished_at: u64,
}

/// Row shape surfaced to the query layer as a virtual table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    /// Keyspace of the compacted table.
    pub keyspace_name: String,
    /// Name of the compacted table.
    pub columnfamily_name: String,
    /// Completion time, milliseconds since epoch.
    pub compacted_at: u64,
    /// Total bytes read from the inputs.
    pub bytes_in: u64,
    /// Total bytes written to the outputs.
    pub bytes_out: u64,
}

impl From<&HistoryRecord> for HistoryRow {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            keyspace_name: record.keyspace.clone(),
            columnfamily_name: record.table.clone(),
            compacted_at: record.finished_at,
            bytes_in: record.bytes_in,
            bytes_out: record.bytes_out,
        }
    }
}

/// The underlying persistence layer was unavailable. Never rolls back or
/// retries the already-committed segment swap.
#[derive(Debug, Error)]
#[error("history sink unavailable: {0}")]
pub struct HistoryWriteError(
    /// Why the sink was unavailable.
    pub String,
);

/// Sink for completed-compaction records.
pub trait HistorySink: Send + Sync {
    /// Append one record.
    fn append(&self, record: HistoryRecord) -> Result<(), HistoryWriteError>;

    /// Records for one table, ordered by `started_at` ascending.
    fn query(&self, keyspace: &str, table: &str) -> Vec<HistoryRecord>;

    /// Virtual-table projection of [`HistorySink::query`].
    fn rows(&self, keyspace: &str, table: &str) -> Vec<HistoryRow> {
        self.query(keyspace, table)
            .iter()
            .map(HistoryRow::from)
            .collect()
    }
}

/// In-memory sink, the default for embedded use and tests.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl InMemoryHistory {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistorySink for InMemoryHistory {
    fn append(&self, record: HistoryRecord) -> Result<(), HistoryWriteError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| HistoryWriteError("ledger lock poisoned".into()))?;
        guard.push(record);
        Ok(())
    }

    fn query(&self, keyspace: &str, table: &str) -> Vec<HistoryRecord> {
        let Ok(guard) = self.records.lock() else {
            return Vec::new();
        };
        let mut matching: Vec<HistoryRecord> = guard
            .iter()
            .filter(|record| record.keyspace == keyspace && record.table == table)
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.started_at);
        matching
    }
}
