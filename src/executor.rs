//! Merge execution seam.
//!
//! The scheduler hands a [`CompactionJob`] to a [`CompactionExecutor`] and
//! applies the returned outcome as an atomic segment-set swap. The default
//! [`SegmentMergeExecutor`] operates purely on descriptors — byte-level
//! sstable content is a collaborator concern, and a real file merger plugs
//! in behind the same trait.

use std::{future::Future, pin::Pin};

use crate::segment::{GenerationAllocator, Segment, SegmentSetError};

/// Task-level failure. Aborts the task, leaves the original segment set
/// untouched, and is retried on the next trigger.
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    /// I/O failure while reading, merging, or writing segments.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Executor invoked without any inputs to merge.
    #[error("compaction executor received no inputs")]
    NoInputs,
    /// The segment-set swap raced a concurrent mutation; the inputs are no
    /// longer all present.
    #[error(transparent)]
    Swap(#[from] SegmentSetError),
}

/// Execution context for a single selected candidate.
#[derive(Debug, Clone)]
pub struct CompactionJob {
    /// Segments to merge, in generation order.
    pub inputs: Vec<Segment>,
    /// Level the outputs land in (`None` outside the leveled strategy).
    pub target_level: Option<u32>,
    /// Split outputs so none exceeds this many bytes.
    pub max_output_bytes: u64,
    /// Generation counter for the table; outputs allocate from it.
    pub allocator: GenerationAllocator,
}

/// Outcome of a successful merge.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    /// Newly produced segments.
    pub outputs: Vec<Segment>,
    /// Total bytes read from the inputs.
    pub bytes_in: u64,
    /// Total bytes written to the outputs.
    pub bytes_out: u64,
}

/// Merges the input segments of one job into one or more output segments.
pub trait CompactionExecutor: Send + Sync {
    /// Execute a merge. Implementations block on segment I/O for the full
    /// duration of the task; there is no mid-merge cancellation.
    fn execute(
        &self,
        job: CompactionJob,
    ) -> Pin<Box<dyn Future<Output = Result<CompactionOutcome, CompactionError>> + Send + '_>>;
}

/// Default executor: conserves input bytes, splits outputs at the size
/// ceiling, and unions the inputs' write-time bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentMergeExecutor;

impl SegmentMergeExecutor {
    /// Build the default executor.
    pub fn new() -> Self {
        Self
    }
}

impl CompactionExecutor for SegmentMergeExecutor {
    fn execute(
        &self,
        job: CompactionJob,
    ) -> Pin<Box<dyn Future<Output = Result<CompactionOutcome, CompactionError>> + Send + '_>> {
        Box::pin(async move {
            if job.inputs.is_empty() {
                return Err(CompactionError::NoInputs);
            }
            let bytes_in: u64 = job.inputs.iter().map(Segment::size_bytes).sum();
            let min_write_time = job
                .inputs
                .iter()
                .map(Segment::min_write_time)
                .min()
                .unwrap_or(0);
            let max_write_time = job
                .inputs
                .iter()
                .map(Segment::max_write_time)
                .max()
                .unwrap_or(0);

            let ceiling = job.max_output_bytes.max(1);
            let mut outputs = Vec::new();
            if bytes_in > 0 {
                let count = bytes_in.div_ceil(ceiling);
                let base = bytes_in / count;
                let remainder = bytes_in % count;
                for index in 0..count {
                    let size = if index < remainder { base + 1 } else { base };
                    let mut output = Segment::new(
                        job.allocator.allocate(),
                        size,
                        min_write_time,
                        max_write_time,
                    );
                    if let Some(level) = job.target_level {
                        output = output.with_level(level);
                    }
                    outputs.push(output);
                }
            }
            let bytes_out = outputs.iter().map(Segment::size_bytes).sum();
            Ok(CompactionOutcome {
                outputs,
                bytes_in,
                bytes_out,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Generation;

    fn job(sizes: &[u64], ceiling: u64) -> CompactionJob {
        let allocator = GenerationAllocator::new();
        let inputs = sizes
            .iter()
            .map(|size| Segment::new(allocator.allocate(), *size, 10, 20))
            .collect();
        CompactionJob {
            inputs,
            target_level: None,
            max_output_bytes: ceiling,
            allocator,
        }
    }

    #[tokio::test]
    async fn merge_conserves_bytes() {
        let outcome = SegmentMergeExecutor::new()
            .execute(job(&[100, 150], 1_000))
            .await
            .unwrap();
        assert_eq!(outcome.bytes_in, 250);
        assert_eq!(outcome.bytes_out, 250);
        assert_eq!(outcome.outputs.len(), 1);
        assert_eq!(outcome.outputs[0].min_write_time(), 10);
        assert_eq!(outcome.outputs[0].max_write_time(), 20);
    }

    #[tokio::test]
    async fn output_split_at_size_ceiling() {
        let outcome = SegmentMergeExecutor::new()
            .execute(job(&[100, 150], 90))
            .await
            .unwrap();
        assert_eq!(outcome.outputs.len(), 3);
        assert!(outcome.outputs.iter().all(|s| s.size_bytes() <= 90));
        assert_eq!(outcome.bytes_out, 250);
    }

    #[tokio::test]
    async fn outputs_carry_target_level() {
        let mut merge_job = job(&[100], 1_000);
        merge_job.target_level = Some(2);
        let outcome = SegmentMergeExecutor::new().execute(merge_job).await.unwrap();
        assert_eq!(outcome.outputs[0].level(), Some(2));
    }

    #[tokio::test]
    async fn empty_inputs_rejected() {
        let mut merge_job = job(&[100], 1_000);
        merge_job.inputs.clear();
        let err = SegmentMergeExecutor::new()
            .execute(merge_job)
            .await
            .unwrap_err();
        assert!(matches!(err, CompactionError::NoInputs));
    }

    #[tokio::test]
    async fn zero_byte_inputs_collapse_to_no_outputs() {
        let allocator = GenerationAllocator::new();
        let merge_job = CompactionJob {
            inputs: vec![Segment::new(Generation::new(1), 0, 0, 1)],
            target_level: None,
            max_output_bytes: 100,
            allocator,
        };
        let outcome = SegmentMergeExecutor::new().execute(merge_job).await.unwrap();
        assert!(outcome.outputs.is_empty());
        assert_eq!(outcome.bytes_out, 0);
    }
}
