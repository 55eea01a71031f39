#![deny(missing_docs)]
//! Background sstable compaction for log-structured storage engines.
//!
//! Memtable flushes produce small, overlapping immutable segments; this
//! crate continuously merges them into fewer, larger segments while the
//! table stays fully readable and writable. The pieces:
//!
//! - [`segment`]: immutable segment descriptors and the per-table set with
//!   atomic, snapshot-based replacement.
//! - [`config`]: validation of the `WITH compaction = {...}` option map.
//! - [`strategy`]: pluggable candidate selection — size-tiered, leveled,
//!   and time-window.
//! - [`control`]: the per-table enable/disable state machine.
//! - [`executor`]: the merge execution seam.
//! - [`history`]: the append-only ledger of completed compactions.
//! - [`manager`]: the [`CompactionManager`] entry point wired to the flush
//!   pipeline, the DDL layer, and the admin surface.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use strata::{CompactionManager, Segment, TableId};
//!
//! # async fn example() -> Result<(), strata::TableError> {
//! let manager = CompactionManager::builder().worker_count(2).build();
//! let table = TableId::new("ks", "events");
//! let config: HashMap<String, String> = [
//!     ("strategy".to_string(), "SizeTiered".to_string()),
//!     ("min_threshold".to_string(), "2".to_string()),
//! ]
//! .into_iter()
//! .collect();
//! manager.on_create_table(table.clone(), &config).await?;
//!
//! let allocator = manager.generation_allocator(&table).await?;
//! manager
//!     .on_flush_complete(&table, Segment::new(allocator.allocate(), 1024, 0, 1_000))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod logging;
mod scheduler;

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod history;
pub mod manager;
pub mod segment;
pub mod strategy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CompactionConfig, InvalidConfig, StrategyKind};
pub use control::{ControlState, TableId};
pub use error::TableError;
pub use executor::{CompactionError, CompactionExecutor, CompactionJob, CompactionOutcome, SegmentMergeExecutor};
pub use history::{HistoryRecord, HistoryRow, HistorySink, HistoryWriteError, InMemoryHistory};
pub use manager::{CompactionManager, CompactionManagerBuilder, SweeperHandle};
pub use segment::{Generation, GenerationAllocator, Segment, SegmentSet};
pub use strategy::{BucketKey, CandidateSet, SelectionStrategy, StrategyImpl};
