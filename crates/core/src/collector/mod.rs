//! Per-batch result collection.
//!
//! A [`ResultCollector`] owns one job's envelope stream and turns it into the
//! caller-facing result sequence:
//!
//! - transport errors are dropped and never surface as targets
//! - the first return from an expected target is yielded immediately
//! - repeated returns from the same target are dropped
//! - once every expected target returned the batch is complete; if the
//!   deadline fires or the stream ends first, each missing target is yielded
//!   as an explicit timeout marker
//!
//! Completion is decided by set membership only, so arrival order and
//! redelivery do not matter.

mod types;

pub use types::{
    BatchResult, CollectorState, ResultKind, ResultMeta, TargetOutcome, TimeoutReason,
};

use std::collections::{HashSet, VecDeque};

use futures::StreamExt;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::metrics;
use crate::transport::{DecodedStream, Envelope};

/// Envelope accounting for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub returned: usize,
    pub timed_out: usize,
    pub transport_errors: usize,
    pub duplicates: usize,
    pub strays: usize,
}

/// State machine collecting the results of a single batch job.
pub struct ResultCollector {
    jid: String,
    batch: usize,
    expected: Vec<String>,
    expected_set: HashSet<String>,
    received: HashSet<String>,
    stream: Option<DecodedStream>,
    deadline: Instant,
    state: CollectorState,
    missing: VecDeque<String>,
    timeout_reason: Option<TimeoutReason>,
    stats: CollectorStats,
}

impl ResultCollector {
    /// Start collecting `expected` from `stream` until `deadline`.
    ///
    /// Repeated ids in `expected` count once.
    pub fn new(
        jid: impl Into<String>,
        batch: usize,
        expected: Vec<String>,
        stream: DecodedStream,
        deadline: Instant,
    ) -> Self {
        let (expected, expected_set) = unique_in_order(expected);
        let state = if expected_set.is_empty() {
            CollectorState::Complete
        } else {
            CollectorState::Collecting
        };

        Self {
            jid: jid.into(),
            batch,
            expected,
            expected_set,
            received: HashSet::new(),
            stream: Some(stream),
            deadline,
            state,
            missing: VecDeque::new(),
            timeout_reason: None,
            stats: CollectorStats::default(),
        }
    }

    /// Collector for a batch whose job could not be published. Every expected
    /// target is surfaced as timed out.
    pub fn dispatch_failed(jid: impl Into<String>, batch: usize, expected: Vec<String>) -> Self {
        let (expected, expected_set) = unique_in_order(expected);
        let mut collector = Self {
            jid: jid.into(),
            batch,
            expected,
            expected_set,
            received: HashSet::new(),
            stream: None,
            deadline: Instant::now(),
            state: CollectorState::Collecting,
            missing: VecDeque::new(),
            timeout_reason: None,
            stats: CollectorStats::default(),
        };
        collector.expire(TimeoutReason::DispatchFailed);
        collector
    }

    pub fn jid(&self) -> &str {
        &self.jid
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn timeout_reason(&self) -> Option<TimeoutReason> {
        self.timeout_reason
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Expected targets that have no yielded entry yet.
    pub fn pending(&self) -> usize {
        self.expected.len() - self.stats.returned - self.stats.timed_out
    }

    /// Pull the next result.
    ///
    /// Waits for the next envelope or the job deadline, whichever comes first.
    /// Returns `None` once the collector is terminal and every timeout marker
    /// has been handed out.
    pub async fn next(&mut self) -> Option<BatchResult> {
        loop {
            match self.state {
                CollectorState::Complete => return None,
                CollectorState::TimedOut => return self.next_missing(),
                CollectorState::Collecting => {}
            }

            let next = match self.stream.as_mut() {
                Some(stream) => timeout_at(self.deadline, stream.next()).await,
                None => {
                    self.expire(TimeoutReason::StreamEnded);
                    continue;
                }
            };

            match next {
                Ok(Some(envelope)) => {
                    if let Some(result) = self.accept(envelope) {
                        return Some(result);
                    }
                }
                Ok(None) => {
                    debug!(
                        "Job {} stream ended with {} targets outstanding",
                        self.jid,
                        self.expected.len() - self.received.len()
                    );
                    self.expire(TimeoutReason::StreamEnded);
                }
                Err(_) => {
                    debug!("Job {} reached its deadline", self.jid);
                    self.expire(TimeoutReason::Deadline);
                }
            }
        }
    }

    /// Apply one decoded envelope to the state machine.
    ///
    /// Returns the result to yield, if the envelope produced one. Envelopes
    /// that arrive after the collector is terminal are ignored.
    pub fn accept(&mut self, envelope: Envelope) -> Option<BatchResult> {
        if self.state.is_terminal() {
            return None;
        }

        match envelope {
            Envelope::TransportError { message } => {
                debug!("Job {}: discarding transport error: {}", self.jid, message);
                self.stats.transport_errors += 1;
                metrics::ENVELOPES_DISCARDED
                    .with_label_values(&["transport_error"])
                    .inc();
                None
            }
            Envelope::DiscoveryPayload { .. } => {
                debug!("Job {}: discarding discovery payload", self.jid);
                metrics::ENVELOPES_DISCARDED
                    .with_label_values(&["discovery_payload"])
                    .inc();
                None
            }
            Envelope::TargetReturn { target_id, payload } => {
                if !self.expected_set.contains(&target_id) {
                    debug!(
                        "Job {}: discarding return from {} (not in batch)",
                        self.jid, target_id
                    );
                    self.stats.strays += 1;
                    metrics::ENVELOPES_DISCARDED
                        .with_label_values(&["stray"])
                        .inc();
                    return None;
                }

                if !self.received.insert(target_id.clone()) {
                    debug!("Job {}: discarding duplicate return from {}", self.jid, target_id);
                    self.stats.duplicates += 1;
                    metrics::ENVELOPES_DISCARDED
                        .with_label_values(&["duplicate"])
                        .inc();
                    return None;
                }

                self.stats.returned += 1;
                metrics::TARGETS_RETURNED.inc();

                if self.received.len() == self.expected_set.len() {
                    self.state = CollectorState::Complete;
                    self.stream = None;
                }

                Some(self.result(target_id, TargetOutcome::Returned(payload)))
            }
        }
    }

    fn expire(&mut self, reason: TimeoutReason) {
        self.stream = None;
        self.state = CollectorState::TimedOut;
        self.timeout_reason = Some(reason);
        self.missing = self
            .expected
            .iter()
            .filter(|id| !self.received.contains(*id))
            .cloned()
            .collect();

        if !self.missing.is_empty() {
            warn!(
                "Batch {} (job {}): {} targets did not return ({})",
                self.batch + 1,
                self.jid,
                self.missing.len(),
                reason.as_str()
            );
        }
    }

    fn next_missing(&mut self) -> Option<BatchResult> {
        let target_id = self.missing.pop_front()?;
        let reason = self.timeout_reason.unwrap_or(TimeoutReason::Deadline);

        self.stats.timed_out += 1;
        metrics::TARGETS_TIMED_OUT
            .with_label_values(&[reason.as_str()])
            .inc();

        Some(self.result(target_id, TargetOutcome::TimedOut(reason)))
    }

    fn result(&self, target_id: String, outcome: TargetOutcome) -> BatchResult {
        let kind = match &outcome {
            TargetOutcome::Returned(_) => ResultKind::Return,
            TargetOutcome::TimedOut(reason) => ResultKind::TimedOut { reason: *reason },
        };

        BatchResult {
            target_id,
            outcome,
            meta: ResultMeta {
                pending: self.pending(),
                kind,
                batch: self.batch,
                jid: self.jid.clone(),
            },
        }
    }
}

/// Drop repeated ids, keeping first occurrences in order.
fn unique_in_order(ids: Vec<String>) -> (Vec<String>, HashSet<String>) {
    let mut seen = HashSet::with_capacity(ids.len());
    let ordered = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    (ordered, seen)
}
