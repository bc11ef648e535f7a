//! Batch sizing types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a batch size string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid batch size {0:?}: expected a count like \"10\" or a percentage like \"25%\"")]
pub struct ParseBatchSizeError(pub String);

/// How many targets a single wave may contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BatchSizeRepr", into = "String")]
pub enum BatchSize {
    /// A fixed number of targets per batch.
    Absolute(usize),
    /// A percentage of the discovered roster.
    Percent(f64),
}

impl BatchSize {
    /// Resolve to a concrete per-batch count for a roster of `roster_len` targets.
    ///
    /// Percentages are rounded to the nearest integer. The result is never
    /// below 1, so a tiny percentage of a small roster still makes progress.
    pub fn resolve(&self, roster_len: usize) -> usize {
        let size = match *self {
            BatchSize::Absolute(n) => n,
            BatchSize::Percent(p) => (roster_len as f64 * p / 100.0).round() as usize,
        };
        size.max(1)
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchSize::Absolute(n) => write!(f, "{}", n),
            BatchSize::Percent(p) => write!(f, "{}%", p),
        }
    }
}

impl FromStr for BatchSize {
    type Err = ParseBatchSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ParseBatchSizeError(s.to_string());

        if let Some(pct) = trimmed.strip_suffix('%') {
            let value: f64 = pct.trim().parse().map_err(|_| invalid())?;
            if !value.is_finite() || value < 0.0 {
                return Err(invalid());
            }
            return Ok(BatchSize::Percent(value));
        }

        trimmed
            .parse::<usize>()
            .map(BatchSize::Absolute)
            .map_err(|_| invalid())
    }
}

impl From<BatchSize> for String {
    fn from(size: BatchSize) -> Self {
        size.to_string()
    }
}

/// Wire form: TOML and env overrides may carry either an integer or a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchSizeRepr {
    Count(u64),
    Text(String),
}

impl TryFrom<BatchSizeRepr> for BatchSize {
    type Error = ParseBatchSizeError;

    fn try_from(repr: BatchSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            BatchSizeRepr::Count(n) => usize::try_from(n)
                .map(BatchSize::Absolute)
                .map_err(|_| ParseBatchSizeError(n.to_string())),
            BatchSizeRepr::Text(s) => s.parse(),
        }
    }
}
