//! Leveled selection: exponentially growing level targets, merges promote
//! one segment plus its next-level overlaps so disjointness is restored at
//! the target level.

use std::collections::BTreeMap;

use crate::{
    config::CompactionConfig,
    segment::Segment,
    strategy::{BucketKey, CandidateSet, SelectionStrategy},
};

/// Leveled strategy configuration snapshot.
#[derive(Debug, Clone)]
pub struct LeveledStrategy {
    min_threshold: usize,
    max_threshold: usize,
    target_segment_size_bytes: u64,
}

impl LeveledStrategy {
    /// Build from a validated config.
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            min_threshold: config.min_threshold,
            max_threshold: config.max_threshold,
            target_segment_size_bytes: config.target_segment_size_bytes,
        }
    }

    /// Target capacity of level `level`: `target_segment_size_bytes * 10^L`.
    fn level_target_bytes(&self, level: u32) -> u64 {
        let factor = 10u64.saturating_pow(level);
        self.target_segment_size_bytes.saturating_mul(factor)
    }

    fn plan_level0(&self, levels: &BTreeMap<u32, Vec<&Segment>>) -> Option<CandidateSet> {
        let level0 = levels.get(&0)?;
        let total: u64 = level0.iter().map(|s| s.size_bytes()).sum();
        // L0 holds raw flush output with overlapping contents, so it is also
        // eligible by count, not only by size.
        if level0.len() < self.min_threshold && total <= self.level_target_bytes(0) {
            return None;
        }
        let mut inputs: Vec<&Segment> = level0.clone();
        inputs.sort_by_key(|segment| segment.generation());
        inputs.truncate(self.max_threshold);
        let mut selected: Vec<Segment> = inputs.into_iter().cloned().collect();
        self.pull_in_overlaps(&mut selected, levels.get(&1));
        Some(CandidateSet {
            inputs: selected,
            bucket: BucketKey::Level(0),
            target_level: Some(1),
        })
    }

    /// Extend the selection with every next-level segment whose write-time
    /// range overlaps the chosen inputs.
    fn pull_in_overlaps(&self, selected: &mut Vec<Segment>, next_level: Option<&Vec<&Segment>>) {
        let Some(next_level) = next_level else {
            return;
        };
        let chosen: Vec<Segment> = selected.clone();
        for segment in next_level.iter().copied() {
            if chosen.iter().any(|input| input.overlaps_write_time(segment)) {
                selected.push(segment.clone());
            }
        }
    }
}

impl SelectionStrategy for LeveledStrategy {
    fn select_candidate(&self, segments: &[Segment], _now_millis: u64) -> Option<CandidateSet> {
        let mut levels: BTreeMap<u32, Vec<&Segment>> = BTreeMap::new();
        for segment in segments {
            levels
                .entry(segment.level().unwrap_or(0))
                .or_default()
                .push(segment);
        }

        if let Some(candidate) = self.plan_level0(&levels) {
            return Some(candidate);
        }

        for (&level, members) in levels.iter().filter(|(level, _)| **level > 0) {
            let total: u64 = members.iter().map(|s| s.size_bytes()).sum();
            if total <= self.level_target_bytes(level) {
                continue;
            }
            // Seed with the oldest segment of the overflowing level.
            let seed = members
                .iter()
                .min_by_key(|segment| segment.generation())
                .copied()?;
            let mut selected = vec![seed.clone()];
            self.pull_in_overlaps(&mut selected, levels.get(&(level + 1)));
            return Some(CandidateSet {
                inputs: selected,
                bucket: BucketKey::Level(level),
                target_level: Some(level + 1),
            });
        }
        None
    }
}
