//! Pluggable candidate-selection strategies.
//!
//! Every strategy is a pure function of the current segment set and its
//! config: repeated calls with unchanged input return the same answer, and
//! `None` is the quiescent steady state, not an error.

mod leveled;
mod size_tiered;
mod time_window;

use std::fmt;

pub use leveled::LeveledStrategy;
pub use size_tiered::SizeTieredStrategy;
pub use time_window::TimeWindowStrategy;

use crate::{
    config::{CompactionConfig, StrategyKind},
    segment::{Generation, Segment},
};

/// Identifies the bucket/level/window a candidate came from. At most one
/// task runs per `(table, bucket)` at a time; distinct buckets of the same
/// table may compact concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// Smallest input generation of a size-tiered bucket. Positional bucket
    /// indices shift as the set evolves; the oldest member pins the claim to
    /// the same logical bucket across selections.
    SizeTier(u64),
    /// Leveled source level.
    Level(u32),
    /// Time-window start, milliseconds since epoch.
    Window(u64),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeTier(generation) => write!(f, "tier-{generation}"),
            Self::Level(level) => write!(f, "level-{level}"),
            Self::Window(start) => write!(f, "window-{start}"),
        }
    }
}

/// A set of segments a strategy wants merged in one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    /// Segments to merge.
    pub inputs: Vec<Segment>,
    /// Bucket the inputs came from, for per-bucket concurrency control.
    pub bucket: BucketKey,
    /// Level the merged output lands in (`None` outside the leveled strategy).
    pub target_level: Option<u32>,
}

impl CandidateSet {
    /// Generations of the input segments.
    pub fn input_generations(&self) -> Vec<Generation> {
        self.inputs.iter().map(Segment::generation).collect()
    }

    /// Sum of input sizes.
    pub fn total_bytes(&self) -> u64 {
        self.inputs.iter().map(Segment::size_bytes).sum()
    }
}

/// Capability implemented by every selection algorithm.
pub trait SelectionStrategy {
    /// Examine the current segments and return the next candidate task, if
    /// any. `now_millis` feeds the time-window strategy's open-window
    /// exclusion; the others ignore it.
    fn select_candidate(&self, segments: &[Segment], now_millis: u64) -> Option<CandidateSet>;
}

/// Concrete strategy instance dispatching over the closed kind set.
#[derive(Debug, Clone)]
pub enum StrategyImpl {
    /// Size-tiered selection.
    SizeTiered(SizeTieredStrategy),
    /// Leveled selection.
    Leveled(LeveledStrategy),
    /// Time-window selection.
    TimeWindow(TimeWindowStrategy),
}

impl StrategyImpl {
    /// Build the strategy instance matching the validated config.
    pub fn build(config: &CompactionConfig) -> Self {
        match config.strategy_kind {
            StrategyKind::SizeTiered => Self::SizeTiered(SizeTieredStrategy::new(config)),
            StrategyKind::Leveled => Self::Leveled(LeveledStrategy::new(config)),
            StrategyKind::TimeWindow => Self::TimeWindow(TimeWindowStrategy::new(config)),
        }
    }
}

impl SelectionStrategy for StrategyImpl {
    fn select_candidate(&self, segments: &[Segment], now_millis: u64) -> Option<CandidateSet> {
        match self {
            Self::SizeTiered(strategy) => strategy.select_candidate(segments, now_millis),
            Self::Leveled(strategy) => strategy.select_candidate(segments, now_millis),
            Self::TimeWindow(strategy) => strategy.select_candidate(segments, now_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_for(kind: &str) -> CompactionConfig {
        let raw: HashMap<String, String> =
            [("strategy".to_string(), kind.to_string())].into_iter().collect();
        CompactionConfig::parse(&raw).unwrap()
    }

    #[test]
    fn build_maps_kind_to_instance() {
        assert!(matches!(
            StrategyImpl::build(&config_for("SizeTiered")),
            StrategyImpl::SizeTiered(_)
        ));
        assert!(matches!(
            StrategyImpl::build(&config_for("Leveled")),
            StrategyImpl::Leveled(_)
        ));
        assert!(matches!(
            StrategyImpl::build(&config_for("TimeWindow")),
            StrategyImpl::TimeWindow(_)
        ));
    }

    #[test]
    fn empty_segment_set_selects_nothing() {
        for kind in ["SizeTiered", "Leveled", "TimeWindow"] {
            let strategy = StrategyImpl::build(&config_for(kind));
            assert!(strategy.select_candidate(&[], 0).is_none(), "{kind}");
        }
    }
}
