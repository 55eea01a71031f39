//! Errors surfaced at the manager boundary.

use thiserror::Error;

use crate::{config::InvalidConfig, control::TableId, segment::SegmentSetError};

/// Failure of a DDL, flush, or admin entry point.
#[derive(Debug, Error)]
pub enum TableError {
    /// CREATE/ALTER carried an invalid compaction map; no state changed.
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),
    /// The table is not registered with this subsystem.
    #[error("unknown table {0}")]
    UnknownTable(TableId),
    /// CREATE for a table that already has a control state.
    #[error("table {0} already exists")]
    TableExists(TableId),
    /// The flush handed over a segment that conflicts with the visible set.
    #[error(transparent)]
    Segment(#[from] SegmentSetError),
}
