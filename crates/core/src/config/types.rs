use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::planner::BatchSize;

/// Root configuration for one batch run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Target expression handed to the transport for discovery.
    pub target: String,
    /// Remote function to execute on every live target.
    pub function: String,
    /// Positional arguments for `function`.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Function used to probe liveness during discovery.
    #[serde(default = "default_probe_function")]
    pub probe_function: String,
    /// Size of each wave, either a count (`10`) or a share of the roster (`"25%"`).
    #[serde(default = "default_batch_size")]
    pub batch_size: BatchSize,
    /// Per-job deadline (seconds), measured from dispatch.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// How long discovery waits for probe replies (seconds).
    #[serde(default = "default_gather_timeout")]
    pub gather_timeout_secs: u64,
    /// Demote per-batch progress logging to debug level.
    #[serde(default)]
    pub quiet: bool,
    /// Pause between a finished batch and the next dispatch (seconds).
    #[serde(default)]
    pub batch_wait_secs: u64,
    /// Stop dispatching new batches once a target reports a failure.
    #[serde(default)]
    pub fail_hard: bool,
    /// Roster size above which `safe_size` replaces `batch_size`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_limit: Option<usize>,
    /// Batch size used when the roster exceeds `safe_limit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_size: Option<BatchSize>,
}

fn default_probe_function() -> String {
    "test.ping".to_string()
}

fn default_batch_size() -> BatchSize {
    BatchSize::Percent(10.0)
}

fn default_timeout() -> u64 {
    5
}

fn default_gather_timeout() -> u64 {
    10
}

impl BatchConfig {
    /// Build a config with defaults for everything except target and function.
    pub fn new(target: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            function: function.into(),
            args: Vec::new(),
            probe_function: default_probe_function(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout(),
            gather_timeout_secs: default_gather_timeout(),
            quiet: false,
            batch_wait_secs: 0,
            fail_hard: false,
            safe_limit: None,
            safe_size: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_batch_size(mut self, batch_size: BatchSize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }

    pub fn batch_wait(&self) -> Duration {
        Duration::from_secs(self.batch_wait_secs)
    }
}
