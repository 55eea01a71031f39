//! External interface of the compaction subsystem.
//!
//! [`CompactionManager`] is what the collaborators talk to: the DDL layer
//! routes CREATE/ALTER/DROP through it, the flush pipeline reports new
//! segments, the admin surface toggles auto-compaction, and the query layer
//! reads the history ledger. All collaborators (executor, history sink,
//! clock) are injected at construction so each test can build an isolated
//! instance.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_lock::RwLock;
use futures_util::future::{AbortHandle, Abortable};

use crate::{
    clock::{Clock, SystemClock},
    config::CompactionConfig,
    control::{TableId, TableState},
    error::TableError,
    executor::{CompactionExecutor, SegmentMergeExecutor},
    history::{HistoryRecord, HistoryRow, HistorySink, InMemoryHistory},
    logging::strata_log,
    scheduler::CompactionScheduler,
    segment::{GenerationAllocator, Segment, SegmentSet},
    strategy::SelectionStrategy,
};

/// Builder for [`CompactionManager`]; unset collaborators fall back to the
/// in-process defaults.
pub struct CompactionManagerBuilder {
    worker_count: usize,
    queue_depth: usize,
    executor: Option<Arc<dyn CompactionExecutor>>,
    history: Option<Arc<dyn HistorySink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for CompactionManagerBuilder {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_depth: 64,
            executor: None,
            history: None,
            clock: None,
        }
    }
}

impl CompactionManagerBuilder {
    /// Number of parallel merge workers.
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Capacity of the pending-task queue.
    pub fn queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Replace the merge executor.
    pub fn executor(mut self, executor: Arc<dyn CompactionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replace the history sink.
    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Replace the clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the manager, spawning its workers on the current tokio runtime.
    pub fn build(self) -> CompactionManager {
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(SegmentMergeExecutor::new()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = CompactionScheduler::new(
            self.worker_count,
            self.queue_depth,
            executor,
            Arc::clone(&history),
            Arc::clone(&clock),
        );
        CompactionManager {
            inner: Arc::new(ManagerInner {
                tables: RwLock::new(HashMap::new()),
                scheduler,
                history,
                clock,
            }),
        }
    }
}

struct ManagerInner {
    tables: RwLock<HashMap<TableId, Arc<TableState>>>,
    scheduler: CompactionScheduler,
    history: Arc<dyn HistorySink>,
    clock: Arc<dyn Clock>,
}

/// Entry point for DDL, flush, admin, and query collaborators. Cheap to
/// clone; clones share the same tables and worker pool.
#[derive(Clone)]
pub struct CompactionManager {
    inner: Arc<ManagerInner>,
}

impl CompactionManager {
    /// Start building a manager.
    pub fn builder() -> CompactionManagerBuilder {
        CompactionManagerBuilder::default()
    }

    /// CREATE TABLE: validate the raw compaction map and register the table.
    /// Validation failure rejects the DDL with no state change.
    pub async fn on_create_table(
        &self,
        table_id: TableId,
        raw_config: &HashMap<String, String>,
    ) -> Result<(), TableError> {
        let config = CompactionConfig::parse(raw_config)?;
        let mut tables = self.inner.tables.write().await;
        if tables.contains_key(&table_id) {
            return Err(TableError::TableExists(table_id));
        }
        strata_log!(
            log::Level::Info,
            "table_created",
            "table={table_id} strategy={:?} enabled={}",
            config.strategy_kind,
            config.enabled,
        );
        tables.insert(table_id.clone(), Arc::new(TableState::new(table_id, config)));
        Ok(())
    }

    /// ALTER TABLE: validate first, then replace the table's control state
    /// wholesale. A prior runtime toggle is discarded; the schema is the
    /// durable source of truth.
    pub async fn on_alter_table(
        &self,
        table_id: &TableId,
        raw_config: &HashMap<String, String>,
    ) -> Result<(), TableError> {
        let config = CompactionConfig::parse(raw_config)?;
        let table = self.table(table_id).await?;
        strata_log!(
            log::Level::Info,
            "table_altered",
            "table={table_id} strategy={:?} enabled={}",
            config.strategy_kind,
            config.enabled,
        );
        table.replace_control(config).await;
        self.trigger(&table).await;
        Ok(())
    }

    /// DROP TABLE: destroy the control state and segment set.
    pub async fn on_drop_table(&self, table_id: &TableId) -> Result<(), TableError> {
        let mut tables = self.inner.tables.write().await;
        tables
            .remove(table_id)
            .map(|_| ())
            .ok_or_else(|| TableError::UnknownTable(table_id.clone()))
    }

    /// Flush completion: add the new segment to the table's set and run
    /// selection for that table.
    pub async fn on_flush_complete(
        &self,
        table_id: &TableId,
        segment: Segment,
    ) -> Result<(), TableError> {
        let table = self.table(table_id).await?;
        table.insert_segment(segment).await?;
        self.trigger(&table).await;
        Ok(())
    }

    /// Admin: allow new task submission. Also kicks selection, so pending
    /// work starts without waiting for the next flush or sweep.
    pub async fn enable_auto_compaction(&self, table_id: &TableId) -> Result<(), TableError> {
        let table = self.table(table_id).await?;
        table.control().await.enable();
        strata_log!(log::Level::Info, "auto_compaction_enabled", "table={table_id}");
        self.trigger(&table).await;
        Ok(())
    }

    /// Admin: stop new task submission. A task already dispatched runs to
    /// completion.
    pub async fn disable_auto_compaction(&self, table_id: &TableId) -> Result<(), TableError> {
        let table = self.table(table_id).await?;
        table.control().await.disable();
        strata_log!(log::Level::Info, "auto_compaction_disabled", "table={table_id}");
        Ok(())
    }

    /// Admin: live enabled flag.
    pub async fn is_enabled(&self, table_id: &TableId) -> Result<bool, TableError> {
        Ok(self.table(table_id).await?.control().await.is_enabled())
    }

    /// Query layer: completed compactions for one table, oldest first.
    pub fn history(&self, keyspace: &str, table: &str) -> Vec<HistoryRecord> {
        self.inner.history.query(keyspace, table)
    }

    /// Query layer: history as virtual-table rows.
    pub fn history_rows(&self, keyspace: &str, table: &str) -> Vec<HistoryRow> {
        self.inner.history.rows(keyspace, table)
    }

    /// Read path: snapshot of the table's visible segment set.
    pub async fn segments(&self, table_id: &TableId) -> Result<Arc<SegmentSet>, TableError> {
        Ok(self.table(table_id).await?.segments().await)
    }

    /// Generation counter the flush pipeline allocates new segment ids from.
    pub async fn generation_allocator(
        &self,
        table_id: &TableId,
    ) -> Result<GenerationAllocator, TableError> {
        Ok(self.table(table_id).await?.allocator().clone())
    }

    /// Number of merge tasks currently running for a table.
    pub async fn active_tasks(&self, table_id: &TableId) -> Result<usize, TableError> {
        Ok(self.table(table_id).await?.active_tasks())
    }

    /// Run selection across every table. The periodic sweep funnels into the
    /// same per-table entry point as flush triggers.
    pub async fn sweep(&self) {
        let tables: Vec<Arc<TableState>> =
            self.inner.tables.read().await.values().cloned().collect();
        for table in tables {
            self.trigger(&table).await;
        }
    }

    /// Spawn the periodic sweep on the current tokio runtime. The loop is
    /// aborted when the returned handle is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let manager = self.clone();
        let (abort, registration) = AbortHandle::new_pair();
        let sweep_loop = Abortable::new(
            async move {
                loop {
                    tokio::time::sleep(interval).await;
                    manager.sweep().await;
                }
            },
            registration,
        );
        tokio::spawn(async move {
            let _ = sweep_loop.await;
        });
        SweeperHandle { abort }
    }

    async fn table(&self, table_id: &TableId) -> Result<Arc<TableState>, TableError> {
        self.inner
            .tables
            .read()
            .await
            .get(table_id)
            .cloned()
            .ok_or_else(|| TableError::UnknownTable(table_id.clone()))
    }

    /// Per-table selection entry point shared by flush, admin, and sweep
    /// triggers. Disabled tables and quiescent strategies are no-ops.
    async fn trigger(&self, table: &Arc<TableState>) {
        let control = table.control().await;
        if !control.is_enabled() {
            return;
        }
        let segments = table.segments().await.to_vec();
        let now = self.inner.clock.now_millis();
        if let Some(candidate) = control.strategy().select_candidate(&segments, now) {
            self.inner
                .scheduler
                .submit(Arc::clone(table), candidate)
                .await;
        }
    }
}

/// Handle to the periodic sweep loop; aborts the loop on drop.
pub struct SweeperHandle {
    abort: AbortHandle,
}

impl SweeperHandle {
    /// Stop the sweep loop.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
