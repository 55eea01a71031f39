//! Per-table compaction control state.
//!
//! The enable/disable state machine is deliberately small: a runtime toggle
//! flips only the live `enabled` flag, while ALTER replaces the whole
//! [`ControlState`] (config, strategy, and the flag) — schema is the durable
//! source of truth, runtime toggles are ephemeral operational overrides.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
};

use async_lock::RwLock;

use crate::{
    config::CompactionConfig,
    segment::{Generation, GenerationAllocator, Segment, SegmentSet, SegmentSetError},
    strategy::StrategyImpl,
};

/// Identifies one table: keyspace plus table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    keyspace: String,
    table: String,
}

impl TableId {
    /// Build a table id.
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }

    /// Keyspace name.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}

/// Validated config, the live enabled flag, and the strategy derived from
/// the config. Replaced wholesale on every successful ALTER.
#[derive(Debug)]
pub struct ControlState {
    config: CompactionConfig,
    enabled: AtomicBool,
    strategy: StrategyImpl,
}

impl ControlState {
    /// Derive a fresh control state from a validated config.
    pub fn new(config: CompactionConfig) -> Self {
        let strategy = StrategyImpl::build(&config);
        let enabled = AtomicBool::new(config.enabled);
        Self {
            config,
            enabled,
            strategy,
        }
    }

    /// The config this state was built from. Runtime toggles never touch it.
    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// The live strategy instance.
    pub fn strategy(&self) -> &StrategyImpl {
        &self.strategy
    }

    /// Live enabled flag.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Runtime toggle: allow new task submission.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Runtime toggle: stop new task submission. Tasks already dispatched
    /// run to completion.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

/// Number of consecutive task failures after which a table is reported as
/// degraded.
pub(crate) const DEGRADED_FAILURE_THRESHOLD: u32 = 5;

/// Runtime shard for one table: control state, the visible segment set, the
/// generation counter, and task accounting. All mutations publish whole new
/// `Arc` values under the per-table locks, so selection and readers never
/// observe a half-updated state.
#[derive(Debug)]
pub struct TableState {
    id: TableId,
    control: RwLock<Arc<ControlState>>,
    segments: RwLock<Arc<SegmentSet>>,
    allocator: GenerationAllocator,
    active_tasks: AtomicUsize,
    consecutive_failures: AtomicU32,
}

impl TableState {
    /// Create the shard for a freshly created table.
    pub(crate) fn new(id: TableId, config: CompactionConfig) -> Self {
        Self {
            id,
            control: RwLock::new(Arc::new(ControlState::new(config))),
            segments: RwLock::new(Arc::new(SegmentSet::new())),
            allocator: GenerationAllocator::new(),
            active_tasks: AtomicUsize::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Table identity.
    pub fn id(&self) -> &TableId {
        &self.id
    }

    /// Generation counter shared by flushes and merge outputs.
    pub fn allocator(&self) -> &GenerationAllocator {
        &self.allocator
    }

    /// Snapshot of the current control state.
    pub async fn control(&self) -> Arc<ControlState> {
        Arc::clone(&*self.control.read().await)
    }

    /// ALTER: replace config, strategy, and enabled flag wholesale,
    /// discarding any prior runtime toggle.
    pub(crate) async fn replace_control(&self, config: CompactionConfig) {
        let mut guard = self.control.write().await;
        *guard = Arc::new(ControlState::new(config));
    }

    /// Snapshot of the visible segment set.
    pub async fn segments(&self) -> Arc<SegmentSet> {
        Arc::clone(&*self.segments.read().await)
    }

    /// Add a flush-produced segment.
    pub(crate) async fn insert_segment(&self, segment: Segment) -> Result<(), SegmentSetError> {
        let mut guard = self.segments.write().await;
        let next = guard.with_insert(segment)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Atomically replace merge inputs with outputs. On error the visible
    /// set is unchanged.
    pub(crate) async fn swap_segments(
        &self,
        inputs: &[Generation],
        outputs: &[Segment],
    ) -> Result<(), SegmentSetError> {
        let mut guard = self.segments.write().await;
        let next = guard.with_swap(inputs, outputs)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Number of merge tasks currently running for this table.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    pub(crate) fn task_started(&self) {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn task_finished(&self) {
        self.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }

    /// Record a task failure; returns the new consecutive-failure count.
    pub(crate) fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::segment::Generation;

    fn config(pairs: &[(&str, &str)]) -> CompactionConfig {
        let raw: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CompactionConfig::parse(&raw).unwrap()
    }

    #[test]
    fn runtime_toggle_leaves_config_untouched() {
        let state = ControlState::new(config(&[("strategy", "SizeTiered"), ("min_threshold", "2")]));
        assert!(state.is_enabled());
        state.disable();
        assert!(!state.is_enabled());
        assert!(state.config().enabled);
        assert_eq!(state.config().min_threshold, 2);
        state.enable();
        assert!(state.is_enabled());
    }

    #[tokio::test]
    async fn alter_discards_runtime_toggle() {
        let table = TableState::new(
            TableId::new("ks", "tbl"),
            config(&[("strategy", "SizeTiered")]),
        );
        table.control().await.disable();
        assert!(!table.control().await.is_enabled());

        // New config with `enabled` absent defaults the live flag back on.
        table
            .replace_control(config(&[("strategy", "Leveled")]))
            .await;
        let control = table.control().await;
        assert!(control.is_enabled());
        assert!(matches!(control.strategy(), StrategyImpl::Leveled(_)));
    }

    #[tokio::test]
    async fn swap_failure_leaves_segments_visible() {
        let table = TableState::new(
            TableId::new("ks", "tbl"),
            config(&[("strategy", "SizeTiered")]),
        );
        table
            .insert_segment(Segment::new(Generation::new(1), 10, 0, 1))
            .await
            .unwrap();
        let err = table
            .swap_segments(&[Generation::new(9)], &[])
            .await
            .unwrap_err();
        assert_eq!(err, SegmentSetError::MissingInput(Generation::new(9)));
        assert_eq!(table.segments().await.len(), 1);
    }
}
