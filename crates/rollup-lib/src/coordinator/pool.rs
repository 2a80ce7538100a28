//! Fork-join execution of independent work units
//!
//! Units are split into contiguous partitions, each partition is folded on a
//! rayon worker, and the partials are merged in partition order. A single
//! worker runs the same code path inline without a pool.

use crate::error::{Result, RollupError};
use crate::merge::Merge;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Worker threads; 1 runs sequentially on the calling thread
    pub workers: usize,
    /// Number of partitions; defaults to `workers`
    pub partitions: Option<usize>,
    /// Units not started within this budget are computed by the caller
    pub deadline: Option<Duration>,
    /// Recompute sequentially and compare after every merge
    pub verify_merge: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            partitions: None,
            deadline: None,
            verify_merge: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn sequential() -> Self {
        Self {
            workers: 1,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = Some(partitions.max(1));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_verify_merge(mut self, verify: bool) -> Self {
        self.verify_merge = verify;
        self
    }
}

/// Merged value plus how it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    pub value: T,
    pub units: usize,
    pub partitions: usize,
    /// Units the workers abandoned at the deadline
    pub fallback_units: usize,
    pub elapsed: Duration,
}

impl<T> MergeOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MergeOutcome<U> {
        MergeOutcome {
            value: f(self.value),
            units: self.units,
            partitions: self.partitions,
            fallback_units: self.fallback_units,
            elapsed: self.elapsed,
        }
    }
}

/// Split `len` units into at most `k` contiguous, non-empty ranges
pub fn partition_ranges(len: usize, k: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let k = k.clamp(1, len);
    let base = len / k;
    let extra = len % k;

    let mut ranges = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Split `units` into at most `k` contiguous partitions
pub fn partition<T>(units: &[T], k: usize) -> Vec<&[T]> {
    partition_ranges(units.len(), k)
        .into_iter()
        .map(|range| &units[range])
        .collect()
}

struct PartitionRun<P> {
    partial: Result<P>,
    skipped: Range<usize>,
}

pub struct ParallelMergeCoordinator {
    config: CoordinatorConfig,
    pool: Option<rayon::ThreadPool>,
}

impl fmt::Debug for ParallelMergeCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelMergeCoordinator")
            .field("config", &self.config)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl ParallelMergeCoordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        let workers = config.workers.max(1);
        let pool = if workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|idx| format!("rollup-worker-{idx}"))
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self {
            config: CoordinatorConfig { workers, ..config },
            pool,
        })
    }

    pub fn sequential() -> Self {
        Self {
            config: CoordinatorConfig::sequential(),
            pool: None,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    fn partition_count(&self) -> usize {
        self.config.partitions.unwrap_or(self.config.workers).max(1)
    }

    /// Map every unit to a partial and merge the partials
    ///
    /// The first error in partition order is returned. Units left unstarted
    /// at the deadline are mapped on the calling thread afterwards, so the
    /// result always covers every unit.
    pub fn map_reduce<U, P, F>(&self, units: &[U], map: F) -> Result<MergeOutcome<P>>
    where
        U: Sync,
        P: Merge + Default + PartialEq + Send,
        F: Fn(&U) -> Result<P> + Sync,
    {
        let started = Instant::now();
        let deadline_at = self.config.deadline.map(|budget| started + budget);
        let ranges = partition_ranges(units.len(), self.partition_count());

        debug!(units = units.len(), partitions = ranges.len(), "Dispatching work units");

        let run = |range: &Range<usize>| -> PartitionRun<P> {
            let mut acc = P::default();
            for idx in range.clone() {
                if deadline_at.is_some_and(|at| Instant::now() >= at) {
                    return PartitionRun {
                        partial: Ok(acc),
                        skipped: idx..range.end,
                    };
                }
                match map(&units[idx]) {
                    Ok(partial) => acc.merge(partial),
                    Err(err) => {
                        return PartitionRun {
                            partial: Err(err),
                            skipped: range.end..range.end,
                        }
                    }
                }
            }
            PartitionRun {
                partial: Ok(acc),
                skipped: range.end..range.end,
            }
        };

        let runs: Vec<PartitionRun<P>> = match &self.pool {
            Some(pool) => pool.install(|| ranges.par_iter().map(run).collect()),
            None => ranges.iter().map(run).collect(),
        };

        let mut merged = P::default();
        let mut leftovers = Vec::new();
        for run in runs {
            merged.merge(run.partial?);
            leftovers.extend(run.skipped);
        }

        let fallback_units = leftovers.len();
        if fallback_units > 0 {
            warn!(
                event = "deadline_fallback",
                units = fallback_units,
                "Workers missed the merge deadline, finishing sequentially"
            );
            for idx in leftovers {
                merged.merge(map(&units[idx])?);
            }
        }

        if self.config.verify_merge && ranges.len() > 1 {
            let mut sequential = P::default();
            for unit in units {
                sequential.merge(map(unit)?);
            }
            if sequential != merged {
                return Err(RollupError::PartitionMismatch {
                    partitions: ranges.len(),
                    detail: format!("{} units merged to a different value", units.len()),
                });
            }
        }

        Ok(MergeOutcome {
            value: merged,
            units: units.len(),
            partitions: ranges.len(),
            fallback_units,
            elapsed: started.elapsed(),
        })
    }
}
