use ahash::AHashMap;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, field, trace_span, Span};

use tsummary_common::time::Timestamp;

use crate::config::ExecutorConfig;
use crate::coordinator::{
    check_partition_order, PartitionBounds, PartitionMergeCoordinator, PartitionPartial,
};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::summarizer::{add_all, Summarizer};
use crate::types::{find_unordered, GroupSummary, Row};
use crate::window::{Window, WindowDriver};

/// The rows of one group, split by the partition they were delivered in.
struct GroupRows<'a> {
    key: &'a str,
    parts: Vec<Vec<&'a Row>>,
}

impl<'a> GroupRows<'a> {
    fn new(key: &'a str, partition_count: usize) -> Self {
        GroupRows {
            key,
            parts: vec![vec![]; partition_count],
        }
    }

    fn row_count(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }

    /// Partition bounds in partition order. With `check_order`, also checks row order
    /// inside every partition and across partitions.
    fn bounds(&self, check_order: bool) -> RuntimeResult<Vec<PartitionBounds>> {
        let mut bounds: Vec<PartitionBounds> = self
            .parts
            .iter()
            .enumerate()
            .map(|(i, rows)| PartitionBounds::from_rows(i, rows))
            .collect();
        if !check_order {
            return Ok(bounds);
        }
        for rows in &self.parts {
            if let Some(i) = find_unordered(rows) {
                return Err(RuntimeError::OrderViolation {
                    timestamp: rows[i].timestamp,
                    latest: rows[i - 1].timestamp,
                });
            }
        }
        check_partition_order(&mut bounds)?;
        Ok(bounds)
    }

    fn partials<S: Summarizer + ?Sized>(
        &self,
        summarizer: &S,
        bounds: &[PartitionBounds],
    ) -> RuntimeResult<Vec<PartitionPartial<S::State>>> {
        self.parts
            .par_iter()
            .zip(bounds.par_iter())
            .map(|(rows, bounds)| {
                let state = add_all(summarizer, summarizer.zero(), rows.iter().copied())?;
                Ok(PartitionPartial::new(*bounds, state))
            })
            .collect()
    }

    /// Rows of earlier partitions at or after `lower`, in order.
    fn lookbehind(&self, index: usize, lower: Timestamp) -> Vec<&'a Row> {
        let mut rows: Vec<&Row> = self.parts[..index]
            .iter()
            .flat_map(|p| p.iter().copied())
            .rev()
            .take_while(|r| r.timestamp >= lower)
            .collect();
        rows.reverse();
        rows
    }

    /// Rows of later partitions at or before `upper`, in order.
    fn lookahead(&self, index: usize, upper: Timestamp) -> Vec<&'a Row> {
        self.parts[index + 1..]
            .iter()
            .flat_map(|p| p.iter().copied())
            .take_while(|r| r.timestamp <= upper)
            .collect()
    }
}

/// Runs a summarizer over partitioned, grouped rows on a dedicated worker pool.
///
/// Groups are independent and processed in parallel. Within a group every partition
/// is summarized locally in parallel, then the partition-merge coordinator stitches
/// the partials so the output equals a single sequential pass over the group.
#[derive(Debug)]
pub struct SummarizeExecutor {
    config: ExecutorConfig,
    pool: ThreadPool,
}

impl SummarizeExecutor {
    pub fn new(config: ExecutorConfig) -> RuntimeResult<Self> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|i| format!("tsummary-worker-{}", i));
        if config.max_workers > 0 {
            builder = builder.num_threads(config.max_workers);
        }
        let pool = builder
            .build()
            .map_err(|e| RuntimeError::from(("cannot start summarizer worker pool", e)))?;
        Ok(SummarizeExecutor { config, pool })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Summarizes every group over `window`, emitting one value per input row.
    ///
    /// `partitions` are in partition order: for each group, the rows of partition `i`
    /// must all be at or before the rows of partition `i + 1`. Groups are returned in
    /// the order their keys are first seen.
    pub fn summarize<S: Summarizer + ?Sized>(
        &self,
        summarizer: &S,
        partitions: &[Vec<Row>],
        window: Window,
    ) -> RuntimeResult<Vec<GroupSummary>> {
        let span = if self.config.trace_enabled {
            trace_span!(
                "summarize",
                summarizer = summarizer.name(),
                %window,
                partitions = partitions.len(),
                groups = field::Empty,
                rows = field::Empty
            )
        } else {
            Span::none()
        }
        .entered();

        let groups = self.group_rows(partitions)?;
        if self.config.trace_enabled {
            let rows: usize = groups.iter().map(|g| g.row_count()).sum();
            span.record("groups", groups.len());
            span.record("rows", rows);
        }

        self.pool.install(|| {
            groups
                .par_iter()
                .map(|group| summarize_group(summarizer, group, window))
                .collect()
        })
    }

    /// Summarizes every group over all of its rows, emitting a single value per group
    /// stamped with the group's latest timestamp.
    pub fn summarize_totals<S: Summarizer + ?Sized>(
        &self,
        summarizer: &S,
        partitions: &[Vec<Row>],
    ) -> RuntimeResult<Vec<GroupSummary>> {
        let _span = if self.config.trace_enabled {
            trace_span!(
                "summarize totals",
                summarizer = summarizer.name(),
                partitions = partitions.len()
            )
        } else {
            Span::none()
        }
        .entered();

        let groups = self.group_rows(partitions)?;
        self.pool.install(|| {
            groups
                .par_iter()
                .map(|group| {
                    let bounds = group.bounds(summarizer.requires_order())?;
                    let last = bounds.iter().rev().find_map(|b| b.last_timestamp);
                    let partials = group.partials(summarizer, &bounds)?;
                    let state = PartitionMergeCoordinator::new(summarizer).combine(partials)?;
                    Ok(GroupSummary::new(
                        group.key,
                        last.into_iter().collect(),
                        vec![summarizer.render(&state)],
                    ))
                })
                .collect()
        })
    }

    fn group_rows<'a>(&self, partitions: &'a [Vec<Row>]) -> RuntimeResult<Vec<GroupRows<'a>>> {
        let mut index: AHashMap<&'a str, usize> = AHashMap::new();
        let mut groups: Vec<GroupRows<'a>> = vec![];

        for (p, rows) in partitions.iter().enumerate() {
            for row in rows {
                let i = match index.get(row.key.as_str()) {
                    Some(&i) => i,
                    None => {
                        let max_groups = self.config.max_groups;
                        if max_groups > 0 && groups.len() >= max_groups {
                            let msg = format!(
                                "cannot summarize more than {} groups; increase maxGroups",
                                max_groups
                            );
                            return Err(RuntimeError::from(msg));
                        }
                        index.insert(row.key.as_str(), groups.len());
                        groups.push(GroupRows::new(&row.key, partitions.len()));
                        groups.len() - 1
                    }
                };
                groups[i].parts[p].push(row);
            }
        }

        debug!(
            groups = groups.len(),
            partitions = partitions.len(),
            "grouped rows"
        );
        Ok(groups)
    }
}

fn summarize_group<S: Summarizer + ?Sized>(
    summarizer: &S,
    group: &GroupRows<'_>,
    window: Window,
) -> RuntimeResult<GroupSummary> {
    // sliding windows walk rows by timestamp whatever the summarizer
    let check_order = summarizer.requires_order() || !window.is_cumulative();
    let bounds = group.bounds(check_order)?;
    let driver = WindowDriver::new(summarizer, window);

    let outputs: Vec<Vec<f64>> = match window {
        Window::Cumulative => {
            let partials = group.partials(summarizer, &bounds)?;
            let prefixes = PartitionMergeCoordinator::new(summarizer).prefix_states(partials)?;
            prefixes
                .into_par_iter()
                .map(|(b, initial)| {
                    driver.run_cumulative_from(initial, &group.parts[b.partition_index])
                })
                .collect::<RuntimeResult<_>>()?
        }
        Window::Past(duration) => bounds
            .par_iter()
            .map(|b| {
                let rows = &group.parts[b.partition_index];
                match b.first_timestamp {
                    Some(first) => {
                        let lookbehind =
                            group.lookbehind(b.partition_index, first.saturating_sub(duration));
                        driver.run_with_context(&lookbehind, rows, &[])
                    }
                    None => Ok(vec![]),
                }
            })
            .collect::<RuntimeResult<_>>()?,
        Window::Future(duration) => bounds
            .par_iter()
            .map(|b| {
                let rows = &group.parts[b.partition_index];
                match (b.first_timestamp, b.last_timestamp) {
                    (Some(first), Some(last)) => {
                        // earlier rows at the same instant belong to the first windows
                        let lookbehind = group.lookbehind(b.partition_index, first);
                        let lookahead =
                            group.lookahead(b.partition_index, last.saturating_add(duration));
                        driver.run_with_context(&lookbehind, rows, &lookahead)
                    }
                    _ => Ok(vec![]),
                }
            })
            .collect::<RuntimeResult<_>>()?,
    };

    let row_count = group.row_count();
    let mut summary = GroupSummary::new(
        group.key,
        Vec::with_capacity(row_count),
        Vec::with_capacity(row_count),
    );
    for (rows, values) in group.parts.iter().zip(outputs) {
        let timestamps: Vec<Timestamp> = rows.iter().map(|r| r.timestamp).collect();
        summary.extend(&timestamps, &values)?;
    }
    Ok(summary)
}
