//! Types for the batch dispatcher.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The discovery stream could not be opened.
    #[error("discovery failed for {target:?}: {source}")]
    Discovery {
        target: String,
        #[source]
        source: TransportError,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Running totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Batches in the plan.
    pub planned_batches: usize,
    /// Batches whose job was dispatched (including failed publishes).
    pub dispatched_batches: usize,
    /// Batches whose job could not be published.
    pub dispatch_failures: usize,
    /// Targets that returned.
    pub returned: usize,
    /// Targets surfaced as timed out.
    pub timed_out: usize,
    /// Returned targets that reported failure.
    pub failed: usize,
    /// Dispatching stopped early because of `fail_hard`.
    pub stopped_early: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BatchError::Discovery {
            target: "web*".to_string(),
            source: TransportError::ConnectionFailed("refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "discovery failed for \"web*\": Connection failed: refused"
        );

        let err = BatchError::from(ConfigError::ValidationError("bad".to_string()));
        assert_eq!(
            err.to_string(),
            "configuration error: Configuration validation failed: bad"
        );
    }

    #[test]
    fn test_summary_default() {
        let summary = RunSummary::default();
        assert_eq!(summary.dispatched_batches, 0);
        assert!(!summary.stopped_early);
    }
}
