//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Discovery (roster sizes by liveness)
//! - Dispatch (batches by outcome, batch duration)
//! - Collection (returns, timeouts, discarded envelopes)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Discovery Metrics
// =============================================================================

/// Targets seen during discovery, by final status.
pub static DISCOVERY_TARGETS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fleetbatch_discovery_targets_total",
            "Targets seen during discovery",
        ),
        &["status"], // "live", "down", "timed_out"
    )
    .unwrap()
});

// =============================================================================
// Dispatch Metrics
// =============================================================================

/// Batches dispatched, by terminal collector state.
pub static BATCHES_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fleetbatch_batches_total", "Total batches dispatched"),
        &["result"], // "complete", "timed_out", "dispatch_failed"
    )
    .unwrap()
});

/// Batch duration in seconds, from dispatch to terminal state.
pub static BATCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "fleetbatch_batch_duration_seconds",
            "Duration of a batch from dispatch to completion",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .unwrap()
});

// =============================================================================
// Collection Metrics
// =============================================================================

/// Target returns yielded to the caller.
pub static TARGETS_RETURNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "fleetbatch_targets_returned_total",
        "Target returns yielded to the caller",
    )
    .unwrap()
});

/// Targets surfaced as timed out.
pub static TARGETS_TIMED_OUT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fleetbatch_targets_timed_out_total",
            "Targets that did not return before the job ended",
        ),
        &["reason"], // "deadline", "stream_ended", "dispatch_failed"
    )
    .unwrap()
});

/// Envelopes dropped by the collector or discovery.
pub static ENVELOPES_DISCARDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fleetbatch_envelopes_discarded_total",
            "Envelopes discarded instead of being yielded",
        ),
        &["reason"], // "transport_error", "duplicate", "stray", "discovery_payload"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Discovery
        Box::new(DISCOVERY_TARGETS.clone()),
        // Dispatch
        Box::new(BATCHES_DISPATCHED.clone()),
        Box::new(BATCH_DURATION.clone()),
        // Collection
        Box::new(TARGETS_RETURNED.clone()),
        Box::new(TARGETS_TIMED_OUT.clone()),
        Box::new(ENVELOPES_DISCARDED.clone()),
    ]
}

/// Register all core metrics into `registry`.
pub fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        let registry = prometheus::Registry::new();
        register_metrics(&registry).unwrap();

        ENVELOPES_DISCARDED.with_label_values(&["duplicate"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "fleetbatch_envelopes_discarded_total"));
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = prometheus::Registry::new();
        register_metrics(&registry).unwrap();
        assert!(register_metrics(&registry).is_err());
    }
}
