//! Roster partitioning.
//!
//! Splits the live roster into consecutive, non-overlapping waves. A plan is
//! computed once per run and never rebalanced, even if targets go down while
//! earlier batches execute.

mod types;

pub use types::{BatchSize, ParseBatchSizeError};

use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;

/// One wave of targets, dispatched as a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBatch {
    /// Zero-based position of this batch in the plan.
    pub index: usize,
    /// Target ids in roster order.
    pub targets: Vec<String>,
}

impl TargetBatch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Split `roster` into batches of `size`, preserving roster order.
///
/// The final batch holds the remainder. An empty roster yields no batches.
pub fn plan(roster: &[String], size: BatchSize) -> Vec<TargetBatch> {
    if roster.is_empty() {
        return Vec::new();
    }

    let per_batch = size.resolve(roster.len());
    roster
        .chunks(per_batch)
        .enumerate()
        .map(|(index, chunk)| TargetBatch {
            index,
            targets: chunk.to_vec(),
        })
        .collect()
}

/// Batch planner carrying the configured size and its safe-limit override.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    size: BatchSize,
    safe_limit: Option<(usize, BatchSize)>,
}

impl BatchPlanner {
    pub fn new(size: BatchSize) -> Self {
        Self {
            size,
            safe_limit: None,
        }
    }

    /// Use `safe_size` instead of the configured size when the roster is
    /// larger than `limit`.
    pub fn with_safe_limit(mut self, limit: usize, safe_size: BatchSize) -> Self {
        self.safe_limit = Some((limit, safe_size));
        self
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        let planner = Self::new(config.batch_size);
        match (config.safe_limit, config.safe_size) {
            (Some(limit), Some(safe_size)) => planner.with_safe_limit(limit, safe_size),
            _ => planner,
        }
    }

    /// The size that applies to a roster of `roster_len` targets.
    pub fn effective_size(&self, roster_len: usize) -> BatchSize {
        match self.safe_limit {
            Some((limit, safe_size)) if roster_len > limit => safe_size,
            _ => self.size,
        }
    }

    pub fn plan(&self, roster: &[String]) -> Vec<TargetBatch> {
        plan(roster, self.effective_size(roster.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("m{}", i)).collect()
    }

    fn ids(batches: &[TargetBatch]) -> Vec<Vec<&str>> {
        batches
            .iter()
            .map(|b| b.targets.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_plan_absolute_with_remainder() {
        let batches = plan(&roster(5), BatchSize::Absolute(2));
        assert_eq!(
            ids(&batches),
            vec![vec!["m1", "m2"], vec!["m3", "m4"], vec!["m5"]]
        );
        assert_eq!(
            batches.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_plan_percent() {
        let batches = plan(&roster(10), BatchSize::Percent(50.0));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[1].len(), 5);
    }

    #[test]
    fn test_plan_size_larger_than_roster() {
        let batches = plan(&roster(3), BatchSize::Absolute(10));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].targets, roster(3));
    }

    #[test]
    fn test_plan_empty_roster() {
        assert!(plan(&[], BatchSize::Absolute(3)).is_empty());
        assert!(plan(&[], BatchSize::Percent(10.0)).is_empty());
    }

    #[test]
    fn test_plan_covers_roster_exactly_once() {
        let roster = roster(23);
        let batches = plan(&roster, BatchSize::Percent(10.0));
        let flattened: Vec<String> = batches.into_iter().flat_map(|b| b.targets).collect();
        assert_eq!(flattened, roster);
    }

    #[test]
    fn test_planner_safe_limit_applies_above_limit() {
        let planner =
            BatchPlanner::new(BatchSize::Percent(50.0)).with_safe_limit(4, BatchSize::Absolute(1));

        assert_eq!(planner.effective_size(4), BatchSize::Percent(50.0));
        assert_eq!(planner.plan(&roster(4)).len(), 2);

        assert_eq!(planner.effective_size(6), BatchSize::Absolute(1));
        assert_eq!(planner.plan(&roster(6)).len(), 6);
    }

    #[test]
    fn test_planner_from_config() {
        let mut config = BatchConfig::new("*", "test.ping").with_batch_size(BatchSize::Absolute(2));
        config.safe_limit = Some(3);
        config.safe_size = Some(BatchSize::Absolute(1));

        let planner = BatchPlanner::from_config(&config);
        assert_eq!(planner.plan(&roster(3)).len(), 2);
        assert_eq!(planner.plan(&roster(5)).len(), 5);
    }
}
