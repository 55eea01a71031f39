//! Immutable segment descriptors and the per-table segment set.
//!
//! A [`Segment`] describes one on-disk sorted data file. Segments are never
//! mutated: a compaction supersedes its inputs by publishing a whole new
//! [`SegmentSet`] in which the inputs are absent and the outputs present.
//! Readers hold `Arc<SegmentSet>` snapshots, so a swap can never expose a
//! half-replaced view and in-flight readers keep pre-swap segments alive
//! until they drop their snapshot.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use thiserror::Error;

/// Monotonic, per-table identifier assigned to each segment at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Wrap a raw generation number.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw generation number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared counter handing out generations for one table.
///
/// Both the flush pipeline and the merge executor allocate from the same
/// counter so generations stay unique per table.
#[derive(Debug, Clone, Default)]
pub struct GenerationAllocator {
    next: Arc<AtomicU64>,
}

impl GenerationAllocator {
    /// Allocator starting at generation 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate the next generation.
    pub fn allocate(&self) -> Generation {
        Generation(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Immutable descriptor of an on-disk data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    generation: Generation,
    size_bytes: u64,
    min_write_time: u64,
    max_write_time: u64,
    level: Option<u32>,
}

impl Segment {
    /// Describe a flush-produced segment. Flush output carries no level tag;
    /// the leveled strategy reads that as level 0.
    pub fn new(generation: Generation, size_bytes: u64, min_write_time: u64, max_write_time: u64) -> Self {
        Self {
            generation,
            size_bytes,
            min_write_time: min_write_time.min(max_write_time),
            max_write_time,
            level: None,
        }
    }

    /// Tag the segment with a leveled-strategy level.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Generation id.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Size of the segment in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Oldest write timestamp contained in the segment (millis).
    pub fn min_write_time(&self) -> u64 {
        self.min_write_time
    }

    /// Newest write timestamp contained in the segment (millis).
    pub fn max_write_time(&self) -> u64 {
        self.max_write_time
    }

    /// Leveled-strategy level, if assigned.
    pub fn level(&self) -> Option<u32> {
        self.level
    }

    /// `true` when the write-time intervals of two segments intersect.
    pub(crate) fn overlaps_write_time(&self, other: &Segment) -> bool {
        self.min_write_time <= other.max_write_time && other.min_write_time <= self.max_write_time
    }
}

/// Errors raised by segment-set mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentSetError {
    /// A segment with the same generation is already present.
    #[error("segment generation {0} already present")]
    DuplicateGeneration(Generation),
    /// A swap input vanished before the swap was applied.
    #[error("swap input generation {0} not present")]
    MissingInput(Generation),
}

/// The visible set of segments owned by one table, ordered by generation.
///
/// Mutations are copy-on-write: each returns a fresh set to be published
/// wholesale under the table lock, leaving the original untouched on error.
#[derive(Debug, Clone, Default)]
pub struct SegmentSet {
    segments: BTreeMap<Generation, Segment>,
}

impl SegmentSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments in the set.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// `true` when the set holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `true` when a segment with `generation` is present.
    pub fn contains(&self, generation: Generation) -> bool {
        self.segments.contains_key(&generation)
    }

    /// Iterate segments in generation order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Segments cloned into a vector, generation order.
    pub fn to_vec(&self) -> Vec<Segment> {
        self.segments.values().cloned().collect()
    }

    /// Sum of all segment sizes.
    pub fn total_bytes(&self) -> u64 {
        self.segments.values().map(Segment::size_bytes).sum()
    }

    /// Copy of the set with `segment` added.
    pub fn with_insert(&self, segment: Segment) -> Result<SegmentSet, SegmentSetError> {
        if self.segments.contains_key(&segment.generation) {
            return Err(SegmentSetError::DuplicateGeneration(segment.generation));
        }
        let mut next = self.clone();
        next.segments.insert(segment.generation, segment);
        Ok(next)
    }

    /// Copy of the set with every `inputs` generation removed and `outputs`
    /// added. Fails without side effects if any input is absent or any
    /// output generation collides, so a raced swap can be abandoned cleanly.
    pub fn with_swap(
        &self,
        inputs: &[Generation],
        outputs: &[Segment],
    ) -> Result<SegmentSet, SegmentSetError> {
        let mut next = self.clone();
        for generation in inputs {
            if next.segments.remove(generation).is_none() {
                return Err(SegmentSetError::MissingInput(*generation));
            }
        }
        for output in outputs {
            if next.segments.contains_key(&output.generation) {
                return Err(SegmentSetError::DuplicateGeneration(output.generation));
            }
            next.segments.insert(output.generation, output.clone());
        }
        Ok(next)
    }
}
