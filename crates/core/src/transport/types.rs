//! Types for the remote-execution transport contract.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One undecoded item as produced by the transport.
pub type RawEnvelope = Value;

/// Stream of raw envelopes.
///
/// `Poll::Pending` means "no item yet"; `None` is the end-of-stream signal.
pub type EnvelopeStream = BoxStream<'static, RawEnvelope>;

/// Errors that can occur while opening a transport stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request to probe a target expression for live targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Target expression to resolve.
    pub target: String,
    /// Function each target runs to prove liveness.
    pub probe_function: String,
    /// How long the transport should gather replies.
    pub timeout: Duration,
}

/// Request to publish a job to one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Exact target ids this job is addressed to.
    pub targets: Vec<String>,
    /// Function to execute.
    pub function: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Correlation id for every envelope of this job.
    pub jid: String,
    /// Per-job deadline.
    pub timeout: Duration,
}

/// Trait for remote-execution transport backends.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Open the discovery stream for a target expression.
    ///
    /// The stream ends once every expected responder replied or the
    /// transport-side timeout elapsed.
    async fn open_discovery_stream(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<EnvelopeStream, TransportError>;

    /// Publish a job and open its non-blocking result stream.
    async fn open_job_stream(&self, request: &JobRequest)
        -> Result<EnvelopeStream, TransportError>;

    /// Tear down client-held resources. Must be safe to call repeatedly.
    fn release(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::PublishFailed("no master".to_string());
        assert_eq!(err.to_string(), "Publish failed: no master");
        assert_eq!(TransportError::Timeout.to_string(), "Request timeout");
    }

    #[test]
    fn test_job_request_serialization() {
        let request = JobRequest {
            targets: vec!["m1".to_string(), "m2".to_string()],
            function: "cmd.run".to_string(),
            args: vec![Value::from("uptime")],
            jid: "20260101000000000001".to_string(),
            timeout: Duration::from_secs(5),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: JobRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.targets, vec!["m1", "m2"]);
        assert_eq!(parsed.jid, "20260101000000000001");
        assert_eq!(parsed.timeout, Duration::from_secs(5));
    }
}
