//! Mock remote client for testing.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};

use crate::transport::{
    DiscoveryRequest, EnvelopeStream, JobRequest, RawEnvelope, RemoteClient, TransportError,
};

/// Scripted response to one `open_job_stream` call.
#[derive(Debug)]
pub struct JobScript {
    outcome: Result<Vec<RawEnvelope>, TransportError>,
    hold_open: bool,
    delay: Duration,
}

impl JobScript {
    /// Yield `items` in order, then end the stream.
    pub fn new(items: Vec<RawEnvelope>) -> Self {
        Self {
            outcome: Ok(items),
            hold_open: false,
            delay: Duration::ZERO,
        }
    }

    /// Fail to publish the job.
    pub fn fail(error: TransportError) -> Self {
        Self {
            outcome: Err(error),
            hold_open: false,
            delay: Duration::ZERO,
        }
    }

    /// Never end the stream after the scripted items.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Sleep this long before each scripted item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Decrements the open-stream count when dropped.
struct OpenStreamGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Job stream that counts as open until it is dropped.
struct TrackedStream {
    inner: EnvelopeStream,
    _guard: OpenStreamGuard,
}

impl Stream for TrackedStream {
    type Item = RawEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Mock implementation of the RemoteClient trait.
///
/// Provides controllable behavior for testing:
/// - Script discovery and per-job envelope streams
/// - Simulate publish failures and streams that never end
/// - Track job requests, open streams and releases for assertions
///
/// # Example
///
/// ```rust,ignore
/// let client = MockRemoteClient::new()
///     .with_discovery(vec![json!({"minions": ["m1"]}), json!({"m1": {"ret": true}})])
///     .with_job(JobScript::new(vec![json!({"m1": {"ret": true}})]));
///
/// let mut run = Batch::new(config, Arc::new(client)).run();
/// ```
#[derive(Debug, Default)]
pub struct MockRemoteClient {
    discovery: Mutex<Vec<RawEnvelope>>,
    hold_discovery_open: bool,
    discovery_error: Mutex<Option<TransportError>>,
    jobs: Mutex<VecDeque<JobScript>>,
    auto_reply: bool,
    job_requests: Mutex<Vec<JobRequest>>,
    open_jobs: Arc<AtomicUsize>,
    max_open_jobs: AtomicUsize,
    releases: AtomicUsize,
}

impl MockRemoteClient {
    /// Create a new mock client with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes returned by the discovery stream.
    pub fn with_discovery(self, items: Vec<RawEnvelope>) -> Self {
        *self.discovery.lock().unwrap() = items;
        self
    }

    /// Keep the discovery stream open after its scripted items.
    pub fn hold_discovery_open(mut self) -> Self {
        self.hold_discovery_open = true;
        self
    }

    /// Queue a script for the next unscripted job.
    pub fn with_job(self, script: JobScript) -> Self {
        self.jobs.lock().unwrap().push_back(script);
        self
    }

    /// Once the scripted jobs run out, reply `{"ret": true, "retcode": 0}`
    /// for every requested target.
    pub fn with_auto_reply(mut self) -> Self {
        self.auto_reply = true;
        self
    }

    /// Make the next discovery attempt fail.
    pub fn fail_discovery(&self, error: TransportError) {
        *self.discovery_error.lock().unwrap() = Some(error);
    }

    /// Every job request received, in order.
    pub fn job_requests(&self) -> Vec<JobRequest> {
        self.job_requests.lock().unwrap().clone()
    }

    /// Job streams currently alive.
    pub fn open_jobs(&self) -> usize {
        self.open_jobs.load(Ordering::SeqCst)
    }

    /// Highest number of job streams alive at the same time.
    pub fn max_open_jobs(&self) -> usize {
        self.max_open_jobs.load(Ordering::SeqCst)
    }

    /// Number of `release` calls.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn next_script(&self, request: &JobRequest) -> JobScript {
        if let Some(script) = self.jobs.lock().unwrap().pop_front() {
            return script;
        }
        if self.auto_reply {
            return JobScript::new(
                request
                    .targets
                    .iter()
                    .map(|id| json!({ id.as_str(): {"ret": true, "retcode": 0} }))
                    .collect(),
            );
        }
        JobScript::new(Vec::new())
    }

    fn track_open(&self) -> OpenStreamGuard {
        let now_open = self.open_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_jobs.fetch_max(now_open, Ordering::SeqCst);
        OpenStreamGuard {
            open: Arc::clone(&self.open_jobs),
        }
    }
}

fn scripted_stream(items: Vec<Value>, delay: Duration, hold_open: bool) -> EnvelopeStream {
    let items = stream::iter(items).then(move |item| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        item
    });

    if hold_open {
        items.chain(stream::pending()).boxed()
    } else {
        items.boxed()
    }
}

#[async_trait]
impl RemoteClient for MockRemoteClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open_discovery_stream(
        &self,
        _request: &DiscoveryRequest,
    ) -> Result<EnvelopeStream, TransportError> {
        if let Some(err) = self.discovery_error.lock().unwrap().take() {
            return Err(err);
        }

        let items = self.discovery.lock().unwrap().clone();
        Ok(scripted_stream(items, Duration::ZERO, self.hold_discovery_open))
    }

    async fn open_job_stream(
        &self,
        request: &JobRequest,
    ) -> Result<EnvelopeStream, TransportError> {
        self.job_requests.lock().unwrap().push(request.clone());

        let script = self.next_script(request);
        let items = script.outcome?;

        let stream = TrackedStream {
            inner: scripted_stream(items, script.delay, script.hold_open),
            _guard: self.track_open(),
        };
        Ok(stream.boxed())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_request(targets: &[&str]) -> JobRequest {
        JobRequest {
            targets: targets.iter().map(|s| s.to_string()).collect(),
            function: "test.ping".to_string(),
            args: Vec::new(),
            jid: "1".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_scripted_jobs_then_auto_reply() {
        let client = MockRemoteClient::new()
            .with_job(JobScript::new(vec![json!({"m1": {"ret": "scripted"}})]))
            .with_auto_reply();

        let first: Vec<Value> = client
            .open_job_stream(&job_request(&["m1"]))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(first, vec![json!({"m1": {"ret": "scripted"}})]);

        let second: Vec<Value> = client
            .open_job_stream(&job_request(&["m2"]))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(second, vec![json!({"m2": {"ret": true, "retcode": 0}})]);
        assert_eq!(client.job_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_job_is_recorded() {
        let client = MockRemoteClient::new().with_job(JobScript::fail(TransportError::Timeout));

        let result = client.open_job_stream(&job_request(&["m1"])).await;
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert_eq!(client.job_requests().len(), 1);
        assert_eq!(client.open_jobs(), 0);
    }

    #[tokio::test]
    async fn test_open_jobs_tracking() {
        let client = MockRemoteClient::new();

        let a = client.open_job_stream(&job_request(&["m1"])).await.unwrap();
        let b = client.open_job_stream(&job_request(&["m2"])).await.unwrap();
        assert_eq!(client.open_jobs(), 2);

        drop(a);
        drop(b);
        assert_eq!(client.open_jobs(), 0);
        assert_eq!(client.max_open_jobs(), 2);
    }

    #[test]
    fn test_release_counts() {
        let client = MockRemoteClient::new();
        client.release();
        client.release();
        assert_eq!(client.release_count(), 2);
    }
}
