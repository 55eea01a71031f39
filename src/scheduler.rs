//! Bounded background worker pool driving merge execution.
//!
//! Submission claims the candidate's `(table, bucket)` pair before queueing,
//! so at most one task runs per bucket while independent buckets and tables
//! compact concurrently. Workers execute the merge, apply the atomic
//! segment-set swap, and append a history record; failures leave the visible
//! set untouched and are retried on the next trigger.

use std::{collections::HashSet, sync::Arc};

use async_lock::RwLock;

use crate::{
    clock::Clock,
    control::{TableId, TableState, DEGRADED_FAILURE_THRESHOLD},
    executor::{CompactionError, CompactionExecutor, CompactionJob},
    history::{HistoryRecord, HistorySink},
    logging::strata_log,
    strategy::{BucketKey, CandidateSet},
};

/// Tracks which `(table, bucket)` pairs currently have an active task.
#[derive(Debug, Default)]
pub(crate) struct TaskStates {
    active: RwLock<HashSet<(TableId, BucketKey)>>,
}

impl TaskStates {
    /// Claim a bucket. Returns `false` when a task is already active for it.
    pub(crate) async fn try_claim(&self, table: &TableId, bucket: BucketKey) -> bool {
        let mut guard = self.active.write().await;
        guard.insert((table.clone(), bucket))
    }

    pub(crate) async fn release(&self, table: &TableId, bucket: BucketKey) {
        let mut guard = self.active.write().await;
        guard.remove(&(table.clone(), bucket));
    }

    #[cfg(test)]
    pub(crate) async fn is_claimed(&self, table: &TableId, bucket: BucketKey) -> bool {
        self.active.read().await.contains(&(table.clone(), bucket))
    }
}

struct MergeTask {
    table: Arc<TableState>,
    candidate: CandidateSet,
}

struct Shared {
    executor: Arc<dyn CompactionExecutor>,
    history: Arc<dyn HistorySink>,
    clock: Arc<dyn Clock>,
    states: TaskStates,
}

/// Worker pool with a bounded submission queue. Dropping the scheduler
/// closes the queue and lets the workers drain and exit.
pub(crate) struct CompactionScheduler {
    tx: flume::Sender<MergeTask>,
    shared: Arc<Shared>,
}

impl CompactionScheduler {
    /// Spawn `worker_count` workers on the current tokio runtime.
    pub(crate) fn new(
        worker_count: usize,
        queue_depth: usize,
        executor: Arc<dyn CompactionExecutor>,
        history: Arc<dyn HistorySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = flume::bounded::<MergeTask>(queue_depth.max(1));
        let shared = Arc::new(Shared {
            executor,
            history,
            clock,
            states: TaskStates::default(),
        });
        for _ in 0..worker_count.max(1) {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                while let Ok(task) = rx.recv_async().await {
                    run_merge(&shared, task).await;
                }
            });
        }
        Self { tx, shared }
    }

    /// Submit a candidate unless its bucket is busy or the queue is full.
    /// Both cases are no-ops: selection is idempotent and the next trigger
    /// re-submits.
    pub(crate) async fn submit(&self, table: Arc<TableState>, candidate: CandidateSet) -> bool {
        let bucket = candidate.bucket;
        if !self.shared.states.try_claim(table.id(), bucket).await {
            strata_log!(
                log::Level::Debug,
                "bucket_busy",
                "table={} bucket={bucket}",
                table.id(),
            );
            return false;
        }
        table.task_started();
        match self.tx.try_send(MergeTask {
            table: Arc::clone(&table),
            candidate,
        }) {
            Ok(()) => true,
            Err(_) => {
                strata_log!(
                    log::Level::Warn,
                    "queue_full",
                    "table={} bucket={bucket} dropping submission",
                    table.id(),
                );
                self.shared.states.release(table.id(), bucket).await;
                table.task_finished();
                false
            }
        }
    }
}

async fn run_merge(shared: &Shared, task: MergeTask) {
    let MergeTask { table, candidate } = task;
    let bucket = candidate.bucket;
    let input_generations = candidate.input_generations();
    let started_at = shared.clock.now_millis();

    let control = table.control().await;
    let job = CompactionJob {
        inputs: candidate.inputs,
        target_level: candidate.target_level,
        max_output_bytes: control.config().target_segment_size_bytes,
        allocator: table.allocator().clone(),
    };

    let result = match shared.executor.execute(job).await {
        Ok(outcome) => table
            .swap_segments(&input_generations, &outcome.outputs)
            .await
            .map(|()| outcome)
            .map_err(CompactionError::from),
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            let finished_at = shared.clock.now_millis();
            table.record_success();
            strata_log!(
                log::Level::Debug,
                "compaction_completed",
                "table={} bucket={bucket} inputs={} bytes_in={} bytes_out={}",
                table.id(),
                input_generations.len(),
                outcome.bytes_in,
                outcome.bytes_out,
            );
            let record = HistoryRecord {
                compaction_id: ulid::Ulid::new(),
                keyspace: table.id().keyspace().to_string(),
                table: table.id().table().to_string(),
                input_generations,
                bytes_in: outcome.bytes_in,
                bytes_out: outcome.bytes_out,
                started_at,
                finished_at,
            };
            if let Err(err) = shared.history.append(record) {
                strata_log!(
                    log::Level::Warn,
                    "history_append_failed",
                    "table={} err={err}",
                    table.id(),
                );
            }
        }
        Err(err) => {
            let failures = table.record_failure();
            strata_log!(
                log::Level::Error,
                "compaction_failed",
                "table={} bucket={bucket} err={err}",
                table.id(),
            );
            if failures == DEGRADED_FAILURE_THRESHOLD {
                strata_log!(
                    log::Level::Warn,
                    "compaction_degraded",
                    "table={} consecutive_failures={failures}",
                    table.id(),
                );
            }
        }
    }

    shared.states.release(table.id(), bucket).await;
    table.task_finished();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claims_are_exclusive_per_bucket() {
        let states = TaskStates::default();
        let table = TableId::new("ks", "tbl");
        assert!(states.try_claim(&table, BucketKey::Level(0)).await);
        assert!(!states.try_claim(&table, BucketKey::Level(0)).await);
        // Independent buckets and tables are not blocked.
        assert!(states.try_claim(&table, BucketKey::Level(1)).await);
        let other = TableId::new("ks", "other");
        assert!(states.try_claim(&other, BucketKey::Level(0)).await);

        states.release(&table, BucketKey::Level(0)).await;
        assert!(states.try_claim(&table, BucketKey::Level(0)).await);
    }

    #[tokio::test]
    async fn release_clears_claim() {
        let states = TaskStates::default();
        let table = TableId::new("ks", "tbl");
        states.try_claim(&table, BucketKey::Window(0)).await;
        assert!(states.is_claimed(&table, BucketKey::Window(0)).await);
        states.release(&table, BucketKey::Window(0)).await;
        assert!(!states.is_claimed(&table, BucketKey::Window(0)).await);
    }
}
