//! Batch dispatcher implementation.
//!
//! A [`Batch`] is turned into a [`BatchRun`], a pull-based result sequence.
//! Each pull advances the run just far enough to produce the next result:
//! discovery on the first pull, then one batch job at a time. The next job is
//! never published before the current collector is terminal, so at most one
//! batch worth of targets is contacted at once.
//!
//! `BatchRun::next` is cancel-safe: a batch leaves the queue only once its job
//! stream has been opened (or failed to open), and the pause between batches
//! is a stored deadline, so a dropped call is resumed by the next one.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::collector::{BatchResult, CollectorState, ResultCollector};
use crate::config::{validate_config, BatchConfig};
use crate::discovery::{self, Discovery};
use crate::metrics;
use crate::planner::{BatchPlanner, TargetBatch};
use crate::transport::{decode_stream, DiscoveryRequest, JobRequest, RemoteClient};

use super::jid::JidGenerator;
use super::types::{BatchError, RunSummary};

/// Releases the transport exactly once, on completion or on drop.
struct ReleaseGuard {
    client: Arc<dyn RemoteClient>,
    released: bool,
}

impl ReleaseGuard {
    fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self {
            client,
            released: false,
        }
    }

    fn client(&self) -> &dyn RemoteClient {
        self.client.as_ref()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.client.release();
            debug!("Released {} transport", self.client.name());
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A configured batch job, ready to run.
pub struct Batch {
    config: BatchConfig,
    client: Arc<dyn RemoteClient>,
}

impl Batch {
    /// Create a new batch job.
    pub fn new(config: BatchConfig, client: Arc<dyn RemoteClient>) -> Self {
        Self { config, client }
    }

    /// Validate `config`, then create the batch job.
    pub fn try_new(config: BatchConfig, client: Arc<dyn RemoteClient>) -> Result<Self, BatchError> {
        validate_config(&config)?;
        Ok(Self::new(config, client))
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Probe the target expression without dispatching anything.
    pub async fn discover(&self) -> Result<Discovery, BatchError> {
        discovery::discover(self.client.as_ref(), &discovery_request(&self.config))
            .await
            .map_err(|source| BatchError::Discovery {
                target: self.config.target.clone(),
                source,
            })
    }

    /// Consume the batch and return its lazy result sequence.
    pub fn run(self) -> BatchRun {
        BatchRun {
            planner: BatchPlanner::from_config(&self.config),
            guard: ReleaseGuard::new(self.client),
            config: self.config,
            jids: JidGenerator::new(),
            phase: RunPhase::NotStarted,
            discovery: None,
            error: None,
            queue: VecDeque::new(),
            current: None,
            next_dispatch_at: None,
            summary: RunSummary::default(),
            stop_requested: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    NotStarted,
    Dispatching,
    Finished,
}

struct ActiveBatch {
    collector: ResultCollector,
    started_at: Instant,
}

/// Pull-based result sequence of one run.
///
/// Dropping it part-way releases the transport.
pub struct BatchRun {
    config: BatchConfig,
    guard: ReleaseGuard,
    planner: BatchPlanner,
    jids: JidGenerator,
    phase: RunPhase,
    discovery: Option<Discovery>,
    error: Option<BatchError>,
    queue: VecDeque<TargetBatch>,
    current: Option<ActiveBatch>,
    next_dispatch_at: Option<Instant>,
    summary: RunSummary,
    stop_requested: bool,
}

impl BatchRun {
    /// Pull the next result, advancing discovery and dispatch as needed.
    ///
    /// Returns `None` once every batch is terminal, after a `fail_hard` stop,
    /// or when discovery could not be started (see [`BatchRun::error`]).
    ///
    /// Cancel-safe. Dropping the returned future loses no result and no
    /// batch; a cancelled discovery is simply started again.
    pub async fn next(&mut self) -> Option<BatchResult> {
        loop {
            match self.phase {
                RunPhase::Finished => return None,
                RunPhase::NotStarted => {
                    self.start().await;
                    continue;
                }
                RunPhase::Dispatching => {}
            }

            if let Some(active) = self.current.as_mut() {
                if let Some(result) = active.collector.next().await {
                    self.record(&result);
                    return Some(result);
                }
                self.finish_batch();
                continue;
            }

            if self.stop_requested {
                self.summary.stopped_early = !self.queue.is_empty();
                self.finish();
                continue;
            }

            if self.queue.is_empty() {
                self.finish();
                continue;
            }

            if let Some(at) = self.next_dispatch_at {
                sleep_until(at).await;
                self.next_dispatch_at = None;
            }

            match self.dispatch().await {
                Some(active) => self.current = Some(active),
                None => self.finish(),
            }
        }
    }

    /// Adapt the run into a `Stream` of results.
    pub fn into_stream(self) -> impl Stream<Item = BatchResult> + Send {
        futures::stream::unfold(self, |mut run| async move {
            run.next().await.map(|result| (result, run))
        })
    }

    /// Discovery outcome, once discovery has run.
    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// The error that aborted the run, if any.
    pub fn error(&self) -> Option<&BatchError> {
        self.error.as_ref()
    }

    /// Take ownership of the aborting error, if any.
    pub fn take_error(&mut self) -> Option<BatchError> {
        self.error.take()
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RunPhase::Finished
    }

    async fn start(&mut self) {
        let request = discovery_request(&self.config);

        match discovery::discover(self.guard.client(), &request).await {
            Ok(found) => {
                if found.is_empty() {
                    warn!("No targets responded to {:?}", self.config.target);
                }
                let batches = self.planner.plan(&found.live);
                self.summary.planned_batches = batches.len();
                self.progress(format_args!(
                    "Planned {} batches for {} targets (batch size {})",
                    batches.len(),
                    found.live.len(),
                    self.planner.effective_size(found.live.len())
                ));
                self.queue = batches.into();
                self.discovery = Some(found);
                self.phase = RunPhase::Dispatching;
            }
            Err(source) => {
                error!(
                    "Discovery for {:?} failed: {}",
                    self.config.target, source
                );
                self.error = Some(BatchError::Discovery {
                    target: self.config.target.clone(),
                    source,
                });
                self.finish();
            }
        }
    }

    /// Publish the job for the batch at the front of the queue.
    ///
    /// The batch is popped only after the transport answered.
    async fn dispatch(&mut self) -> Option<ActiveBatch> {
        let batch = self.queue.front()?.clone();
        let jid = self.jids.next_jid();
        let request = JobRequest {
            targets: batch.targets.clone(),
            function: self.config.function.clone(),
            args: self.config.args.clone(),
            jid: jid.clone(),
            timeout: self.config.timeout(),
        };

        self.progress(format_args!(
            "Executing batch {} of {} (job {}) on {:?}",
            batch.index + 1,
            self.summary.planned_batches,
            jid,
            request.targets
        ));

        let started_at = Instant::now();
        let opened = self.guard.client().open_job_stream(&request).await;
        self.queue.pop_front();
        self.summary.dispatched_batches += 1;

        let collector = match opened {
            Ok(stream) => ResultCollector::new(
                jid,
                batch.index,
                batch.targets,
                decode_stream(stream),
                started_at + self.config.timeout(),
            ),
            Err(e) => {
                warn!(
                    "Failed to publish batch {} (job {}): {}",
                    batch.index + 1,
                    jid,
                    e
                );
                self.summary.dispatch_failures += 1;
                ResultCollector::dispatch_failed(jid, batch.index, batch.targets)
            }
        };

        Some(ActiveBatch {
            collector,
            started_at,
        })
    }

    fn record(&mut self, result: &BatchResult) {
        if result.is_timeout() {
            self.summary.timed_out += 1;
            return;
        }

        self.summary.returned += 1;
        if result.is_failure() {
            self.summary.failed += 1;
            if self.config.fail_hard && !self.stop_requested {
                warn!(
                    "{} reported failure, no further batches will be dispatched",
                    result.target_id
                );
                self.stop_requested = true;
            }
        }
    }

    fn finish_batch(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };

        let collector = &active.collector;
        let outcome = match (collector.state(), collector.timeout_reason()) {
            (CollectorState::TimedOut, Some(reason)) => reason.as_str(),
            (state, _) => state.as_str(),
        };
        let label = if outcome == "deadline" || outcome == "stream_ended" {
            "timed_out"
        } else {
            outcome
        };

        let wait = self.config.batch_wait();
        if !wait.is_zero() && !self.queue.is_empty() {
            debug!("Waiting {:?} before next batch", wait);
            self.next_dispatch_at = Some(Instant::now() + wait);
        }

        metrics::BATCHES_DISPATCHED.with_label_values(&[label]).inc();
        metrics::BATCH_DURATION.observe(active.started_at.elapsed().as_secs_f64());

        let stats = collector.stats();
        self.progress(format_args!(
            "Batch {} (job {}) finished: {} ({} returned, {} timed out, {} duplicates dropped)",
            collector.batch() + 1,
            collector.jid(),
            outcome,
            stats.returned,
            stats.timed_out,
            stats.duplicates
        ));
    }

    fn finish(&mut self) {
        self.phase = RunPhase::Finished;
        self.current = None;
        self.queue.clear();
        self.guard.release();

        if self.error.is_none() {
            self.progress(format_args!(
                "Run finished: {} of {} batches dispatched, {} returned, {} timed out",
                self.summary.dispatched_batches,
                self.summary.planned_batches,
                self.summary.returned,
                self.summary.timed_out
            ));
        }
    }

    fn progress(&self, message: std::fmt::Arguments<'_>) {
        if self.config.quiet {
            debug!("{}", message);
        } else {
            info!("{}", message);
        }
    }
}

fn discovery_request(config: &BatchConfig) -> DiscoveryRequest {
    DiscoveryRequest {
        target: config.target.clone(),
        probe_function: config.probe_function.clone(),
        timeout: config.gather_timeout(),
    }
}
