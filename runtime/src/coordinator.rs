use std::borrow::Borrow;

use itertools::Itertools;
use tracing::{debug, trace};

use tsummary_common::time::{format_timestamp, Timestamp};

use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::summarizer::Summarizer;
use crate::types::Row;

/// Position and time extent of one partition's slice of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBounds {
    pub partition_index: usize,
    /// `None` for a partition without rows for the group.
    pub first_timestamp: Option<Timestamp>,
    pub last_timestamp: Option<Timestamp>,
}

impl PartitionBounds {
    pub fn from_rows<R: Borrow<Row>>(partition_index: usize, rows: &[R]) -> Self {
        PartitionBounds {
            partition_index,
            first_timestamp: rows.first().map(|r| r.borrow().timestamp),
            last_timestamp: rows.last().map(|r| r.borrow().timestamp),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_timestamp.is_none()
    }
}

/// A partition-local state, tagged with the partition it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPartial<T> {
    pub bounds: PartitionBounds,
    pub state: T,
}

impl<T> PartitionPartial<T> {
    pub fn new(bounds: PartitionBounds, state: T) -> Self {
        PartitionPartial { bounds, state }
    }
}

/// Sorts `bounds` by partition index and rejects a partition delivered twice.
pub fn check_unique_partitions(bounds: &mut [PartitionBounds]) -> RuntimeResult<()> {
    bounds.sort_by_key(|b| b.partition_index);

    if let Some((a, _)) = bounds
        .iter()
        .tuple_windows()
        .find(|(a, b)| a.partition_index == b.partition_index)
    {
        return Err(RuntimeError::UnorderedPartitions(format!(
            "partition {} was delivered more than once",
            a.partition_index
        )));
    }
    Ok(())
}

/// Sorts `bounds` by partition index and checks that partitions are in timestamp order:
/// every non-empty partition must start no earlier than the previous one ends.
pub fn check_partition_order(bounds: &mut [PartitionBounds]) -> RuntimeResult<()> {
    check_unique_partitions(bounds)?;

    let mut previous: Option<&PartitionBounds> = None;
    for current in bounds.iter().filter(|b| !b.is_empty()) {
        if let Some(prev) = previous {
            if let (Some(end), Some(start)) = (prev.last_timestamp, current.first_timestamp) {
                if start < end {
                    return Err(RuntimeError::UnorderedPartitions(format!(
                        "partition {} starts at {} before partition {} ends at {}",
                        current.partition_index,
                        format_timestamp(start),
                        prev.partition_index,
                        format_timestamp(end)
                    )));
                }
            }
        }
        previous = Some(current);
    }
    Ok(())
}

/// Reconciles partition-local states of one group into states equivalent to a
/// single sequential pass.
///
/// Runs after every contributing partition task has finished; partials are moved in,
/// so nothing is shared with the tasks that produced them.
pub struct PartitionMergeCoordinator<'a, S: Summarizer + ?Sized> {
    summarizer: &'a S,
}

impl<'a, S: Summarizer + ?Sized> PartitionMergeCoordinator<'a, S> {
    pub fn new(summarizer: &'a S) -> Self {
        PartitionMergeCoordinator { summarizer }
    }

    /// Folds the partials left to right in partition order.
    pub fn combine(&self, partials: Vec<PartitionPartial<S::State>>) -> RuntimeResult<S::State> {
        let partials = self.ordered(partials)?;
        debug!(
            summarizer = self.summarizer.name(),
            partitions = partials.len(),
            "combining partition states"
        );
        partials
            .into_iter()
            .try_fold(self.summarizer.zero(), |acc, partial| {
                trace!(partition = partial.bounds.partition_index, "merging partition");
                self.summarizer.merge(&acc, &partial.state)
            })
    }

    /// Returns, for each partial in partition order, the merged state of every partition
    /// before it. Used to resume a partition's local computation where the previous
    /// partitions left off.
    pub fn prefix_states(
        &self,
        partials: Vec<PartitionPartial<S::State>>,
    ) -> RuntimeResult<Vec<(PartitionBounds, S::State)>> {
        let partials = self.ordered(partials)?;
        let mut result = Vec::with_capacity(partials.len());
        let mut acc = self.summarizer.zero();
        for partial in partials {
            let next = self.summarizer.merge(&acc, &partial.state)?;
            result.push((partial.bounds, acc));
            acc = next;
        }
        Ok(result)
    }

    fn ordered(
        &self,
        mut partials: Vec<PartitionPartial<S::State>>,
    ) -> RuntimeResult<Vec<PartitionPartial<S::State>>> {
        let mut bounds: Vec<PartitionBounds> = partials.iter().map(|p| p.bounds).collect();
        if self.summarizer.requires_order() {
            check_partition_order(&mut bounds)?;
        } else {
            check_unique_partitions(&mut bounds)?;
        }
        partials.sort_by_key(|p| p.bounds.partition_index);
        Ok(partials)
    }
}
