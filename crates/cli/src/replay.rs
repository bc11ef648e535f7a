//! Replay transport.
//!
//! Serves recorded envelopes from JSON-lines files instead of talking to a
//! live fleet. Useful for dry runs and for reproducing a problematic return
//! stream offline.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use fleetbatch_core::transport::ROSTER_KEY;
use fleetbatch_core::{
    DiscoveryRequest, EnvelopeStream, JobRequest, RawEnvelope, RemoteClient, TransportError,
};

/// A `RemoteClient` backed by recorded envelopes.
///
/// Discovery replays the discovery file verbatim. Each job replays, in file
/// order, every recorded envelope that mentions one of the job's targets as a
/// top-level key. Envelopes that mention no target at all (error reports,
/// malformed lines) are replayed into every job, the way a noisy transport
/// would interleave them.
pub struct ReplayClient {
    discovery: Vec<RawEnvelope>,
    returns: Vec<RawEnvelope>,
    released: AtomicBool,
}

impl ReplayClient {
    pub fn new(discovery: Vec<RawEnvelope>, returns: Vec<RawEnvelope>) -> Self {
        Self {
            discovery,
            returns,
            released: AtomicBool::new(false),
        }
    }

    /// Load both recordings from JSON-lines files.
    pub fn from_files(discovery: &Path, returns: &Path) -> Result<Self> {
        Ok(Self::new(read_json_lines(discovery)?, read_json_lines(returns)?))
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn job_envelopes(&self, targets: &[String]) -> Vec<RawEnvelope> {
        self.returns
            .iter()
            .filter(|raw| match raw.as_object() {
                Some(map) => {
                    let addressed = map.keys().any(|k| targets.contains(k));
                    let mentions_any = map.keys().any(|k| self.is_known_target(k));
                    addressed || !mentions_any
                }
                None => true,
            })
            .cloned()
            .collect()
    }

    fn is_known_target(&self, id: &str) -> bool {
        self.discovery.iter().any(|raw| {
            raw.get(ROSTER_KEY)
                .and_then(Value::as_array)
                .is_some_and(|ids| ids.iter().any(|v| v.as_str() == Some(id)))
        })
    }
}

#[async_trait]
impl RemoteClient for ReplayClient {
    fn name(&self) -> &str {
        "replay"
    }

    async fn open_discovery_stream(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<EnvelopeStream, TransportError> {
        if self.is_released() {
            return Err(TransportError::ConnectionFailed(
                "replay client already released".to_string(),
            ));
        }
        debug!(
            "Replaying {} discovery envelopes for {:?}",
            self.discovery.len(),
            request.target
        );
        Ok(stream::iter(self.discovery.clone()).boxed())
    }

    async fn open_job_stream(
        &self,
        request: &JobRequest,
    ) -> Result<EnvelopeStream, TransportError> {
        if self.is_released() {
            return Err(TransportError::ConnectionFailed(
                "replay client already released".to_string(),
            ));
        }
        let envelopes = self.job_envelopes(&request.targets);
        debug!(
            "Replaying {} envelopes for job {} ({} targets)",
            envelopes.len(),
            request.jid,
            request.targets.len()
        );
        Ok(stream::iter(envelopes).boxed())
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Read one JSON value per non-blank line.
pub fn read_json_lines(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    parse_json_lines(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn parse_json_lines(content: &str) -> Result<Vec<Value>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid JSON", i + 1))
        })
        .collect()
}
