//! Size-tiered selection: bucket segments of similar size, merge full buckets.

use crate::{
    config::CompactionConfig,
    segment::Segment,
    strategy::{BucketKey, CandidateSet, SelectionStrategy},
};

/// Size-tiered strategy configuration snapshot.
#[derive(Debug, Clone)]
pub struct SizeTieredStrategy {
    min_threshold: usize,
    max_threshold: usize,
}

impl SizeTieredStrategy {
    /// Build from a validated config.
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            min_threshold: config.min_threshold,
            max_threshold: config.max_threshold,
        }
    }

    /// Partition segments into buckets of similar size: walking segments in
    /// ascending size order, a segment joins the current bucket while its
    /// size stays within `[0.5x, 1.5x]` of the bucket's running average.
    fn buckets<'a>(&self, segments: &'a [Segment]) -> Vec<Vec<&'a Segment>> {
        let mut ordered: Vec<&Segment> = segments.iter().collect();
        ordered.sort_by_key(|segment| (segment.size_bytes(), segment.generation()));

        let mut buckets: Vec<Vec<&Segment>> = Vec::new();
        let mut current: Vec<&Segment> = Vec::new();
        let mut total: u64 = 0;
        for segment in ordered {
            if !current.is_empty() {
                let average = total as f64 / current.len() as f64;
                let size = segment.size_bytes() as f64;
                if size < average * 0.5 || size > average * 1.5 {
                    buckets.push(std::mem::take(&mut current));
                    total = 0;
                }
            }
            total += segment.size_bytes();
            current.push(segment);
        }
        if !current.is_empty() {
            buckets.push(current);
        }
        buckets
    }
}

impl SelectionStrategy for SizeTieredStrategy {
    fn select_candidate(&self, segments: &[Segment], _now_millis: u64) -> Option<CandidateSet> {
        let buckets = self.buckets(segments);
        // Among qualifying buckets prefer the one with the largest total
        // size, which amortizes merge I/O best.
        let bucket = buckets
            .iter()
            .filter(|bucket| bucket.len() >= self.min_threshold)
            .max_by_key(|bucket| bucket.iter().map(|s| s.size_bytes()).sum::<u64>())?;

        let mut inputs: Vec<&Segment> = bucket.clone();
        if inputs.len() > self.max_threshold {
            // Cap merge cost, keeping the largest members.
            inputs.sort_by_key(|segment| std::cmp::Reverse(segment.size_bytes()));
            inputs.truncate(self.max_threshold);
        }
        let key = inputs
            .iter()
            .map(|segment| segment.generation().get())
            .min()?;
        Some(CandidateSet {
            inputs: inputs.into_iter().cloned().collect(),
            bucket: BucketKey::SizeTier(key),
            target_level: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Generation;

    fn strategy(min: usize, max: usize) -> SizeTieredStrategy {
        SizeTieredStrategy {
            min_threshold: min,
            max_threshold: max,
        }
    }

    fn segment(generation: u64, size: u64) -> Segment {
        Segment::new(Generation::new(generation), size, 0, 10)
    }

    #[test]
    fn similar_sizes_form_a_candidate() {
        let segments = vec![segment(1, 100), segment(2, 110)];
        let candidate = strategy(2, 32).select_candidate(&segments, 0).unwrap();
        assert_eq!(candidate.inputs.len(), 2);
        assert_eq!(candidate.total_bytes(), 210);
    }

    #[test]
    fn dissimilar_sizes_select_nothing() {
        let segments = vec![segment(1, 100), segment(2, 10_000)];
        assert!(strategy(2, 32).select_candidate(&segments, 0).is_none());
    }

    #[test]
    fn below_min_threshold_selects_nothing() {
        let segments = vec![segment(1, 100), segment(2, 100)];
        assert!(strategy(3, 32).select_candidate(&segments, 0).is_none());
    }

    #[test]
    fn prefers_bucket_with_largest_total_size() {
        let segments = vec![
            segment(1, 100),
            segment(2, 100),
            segment(3, 10_000),
            segment(4, 10_000),
        ];
        let candidate = strategy(2, 32).select_candidate(&segments, 0).unwrap();
        assert_eq!(candidate.total_bytes(), 20_000);
    }

    #[test]
    fn max_threshold_caps_selection_keeping_largest() {
        let segments = vec![
            segment(1, 100),
            segment(2, 110),
            segment(3, 120),
            segment(4, 130),
        ];
        let candidate = strategy(2, 2).select_candidate(&segments, 0).unwrap();
        assert_eq!(candidate.inputs.len(), 2);
        let mut sizes: Vec<u64> = candidate.inputs.iter().map(Segment::size_bytes).collect();
        sizes.sort();
        assert_eq!(sizes, vec![120, 130]);
    }

    #[test]
    fn bucket_key_is_smallest_input_generation() {
        let segments = vec![segment(3, 100), segment(7, 110)];
        let candidate = strategy(2, 32).select_candidate(&segments, 0).unwrap();
        assert_eq!(candidate.bucket, BucketKey::SizeTier(3));

        // The key survives unrelated segments joining other buckets, unlike
        // a positional index.
        let segments = vec![segment(1, 10_000), segment(3, 100), segment(7, 110)];
        let candidate = strategy(2, 32).select_candidate(&segments, 0).unwrap();
        assert_eq!(candidate.bucket, BucketKey::SizeTier(3));
    }

    #[test]
    fn capped_selection_keys_on_oldest_kept_member() {
        let segments = vec![
            segment(1, 100),
            segment(2, 110),
            segment(3, 120),
            segment(4, 130),
        ];
        // The cap keeps generations 3 and 4, so the claim keys on 3.
        let candidate = strategy(2, 2).select_candidate(&segments, 0).unwrap();
        assert_eq!(candidate.bucket, BucketKey::SizeTier(3));
    }

    #[test]
    fn selection_is_idempotent() {
        let segments = vec![segment(1, 100), segment(2, 110), segment(3, 5_000)];
        let strategy = strategy(2, 32);
        let first = strategy.select_candidate(&segments, 0);
        let second = strategy.select_candidate(&segments, 0);
        assert_eq!(first, second);
    }
}
