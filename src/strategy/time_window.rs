//! Time-window selection: segments bucket into fixed windows by newest
//! write time; only the oldest full, closed window compacts per invocation.

use std::collections::BTreeMap;

use crate::{
    config::CompactionConfig,
    segment::Segment,
    strategy::{BucketKey, CandidateSet, SelectionStrategy},
};

/// Time-window strategy configuration snapshot.
#[derive(Debug, Clone)]
pub struct TimeWindowStrategy {
    min_threshold: usize,
    window_millis: u64,
}

impl TimeWindowStrategy {
    /// Build from a validated config.
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            min_threshold: config.min_threshold,
            window_millis: config.window_duration_millis.max(1),
        }
    }

    fn window_start(&self, timestamp: u64) -> u64 {
        timestamp - timestamp % self.window_millis
    }
}

impl SelectionStrategy for TimeWindowStrategy {
    fn select_candidate(&self, segments: &[Segment], now_millis: u64) -> Option<CandidateSet> {
        let mut windows: BTreeMap<u64, Vec<&Segment>> = BTreeMap::new();
        for segment in segments {
            windows
                .entry(self.window_start(segment.max_write_time()))
                .or_default()
                .push(segment);
        }

        // The window containing `now` is still receiving writes; merging it
        // would redo the same work on every flush. Skip it (and anything
        // newer, which only appears under clock skew).
        let current_window = self.window_start(now_millis);
        let (start, members) = windows
            .into_iter()
            .filter(|(start, _)| *start < current_window)
            .find(|(_, members)| members.len() >= self.min_threshold)?;

        // Closed windows hold immutable data, so the whole window merges in
        // one task, deliberately unbounded by max_threshold.
        Some(CandidateSet {
            inputs: members.into_iter().cloned().collect(),
            bucket: BucketKey::Window(start),
            target_level: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Generation;

    const WINDOW: u64 = 1_000;

    fn strategy(min: usize) -> TimeWindowStrategy {
        TimeWindowStrategy {
            min_threshold: min,
            window_millis: WINDOW,
        }
    }

    fn segment(generation: u64, max_time: u64) -> Segment {
        Segment::new(Generation::new(generation), 100, max_time.saturating_sub(5), max_time)
    }

    #[test]
    fn open_window_is_never_selected() {
        let now = 5_500;
        let segments = vec![segment(1, 5_100), segment(2, 5_200)];
        assert!(strategy(2).select_candidate(&segments, now).is_none());
    }

    #[test]
    fn oldest_closed_window_wins() {
        let now = 9_500;
        let segments = vec![
            segment(1, 1_100),
            segment(2, 1_200),
            segment(3, 4_100),
            segment(4, 4_200),
        ];
        let candidate = strategy(2).select_candidate(&segments, now).unwrap();
        assert_eq!(candidate.bucket, BucketKey::Window(1_000));
        assert_eq!(candidate.inputs.len(), 2);
    }

    #[test]
    fn underpopulated_window_is_skipped() {
        let now = 9_500;
        let segments = vec![
            segment(1, 1_100), // lone segment in the oldest window
            segment(2, 4_100),
            segment(3, 4_200),
        ];
        let candidate = strategy(2).select_candidate(&segments, now).unwrap();
        assert_eq!(candidate.bucket, BucketKey::Window(4_000));
    }

    #[test]
    fn whole_window_selected_unbounded() {
        let now = 9_500;
        let segments: Vec<Segment> = (0..40).map(|i| segment(i, 1_010 + i)).collect();
        let candidate = strategy(2).select_candidate(&segments, now).unwrap();
        assert_eq!(candidate.inputs.len(), 40);
    }

    #[test]
    fn selection_is_idempotent() {
        let now = 9_500;
        let segments = vec![segment(1, 1_100), segment(2, 1_200)];
        let strategy = strategy(2);
        assert_eq!(
            strategy.select_candidate(&segments, now),
            strategy.select_candidate(&segments, now)
        );
    }
}
