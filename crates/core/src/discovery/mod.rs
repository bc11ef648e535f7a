//! Target discovery.
//!
//! Probes a target expression and builds the live roster from the replies.
//! Transport errors on the discovery stream are dropped; they never become
//! roster entries.

mod roster;

pub use roster::{Roster, Target, TargetStatus};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::metrics;
use crate::transport::{decode_stream, DiscoveryRequest, Envelope, RemoteClient, TransportError};

/// Outcome of probing a target expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    /// Targets that replied, in reply order.
    pub live: Vec<String>,
    /// Announced targets that never replied before the stream ended.
    pub down: Vec<String>,
    /// Announced targets still pending when the discovery deadline fired.
    pub timed_out: Vec<String>,
    /// Correlation id of the probe job, if the transport reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    /// Transport error envelopes dropped while discovering.
    pub errors_discarded: usize,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Probe `request.target` and gather live targets until the stream ends or
/// `request.timeout` elapses.
///
/// An empty roster is not an error. Only failing to open the stream is.
pub async fn discover(
    client: &dyn RemoteClient,
    request: &DiscoveryRequest,
) -> Result<Discovery, TransportError> {
    debug!(
        "Probing {:?} with {} via {}",
        request.target,
        request.probe_function,
        client.name()
    );

    let mut stream = decode_stream(client.open_discovery_stream(request).await?);
    let deadline = Instant::now() + request.timeout;

    let mut roster = Roster::new();
    let mut jid = None;
    let mut errors_discarded = 0;

    let unanswered = loop {
        match timeout_at(deadline, stream.next()).await {
            Ok(Some(Envelope::TransportError { message })) => {
                debug!("Discarding transport error during discovery: {}", message);
                metrics::ENVELOPES_DISCARDED
                    .with_label_values(&["transport_error"])
                    .inc();
                errors_discarded += 1;
            }
            Ok(Some(Envelope::DiscoveryPayload { ids, jid: probe_jid })) => {
                for id in &ids {
                    roster.insert(id);
                }
                if jid.is_none() {
                    jid = probe_jid;
                }
            }
            Ok(Some(Envelope::TargetReturn { target_id, .. })) => {
                if !roster.mark_responded(&target_id) && !roster.contains(&target_id) {
                    debug!("Ignoring probe reply from unannounced target {}", target_id);
                }
            }
            Ok(None) => break TargetStatus::Down,
            Err(_) => {
                debug!(
                    "Discovery deadline reached after {:?}",
                    request.timeout
                );
                break TargetStatus::TimedOut;
            }
        }
    };

    roster.settle_pending(unanswered);

    let discovery = Discovery {
        live: roster.live().to_vec(),
        down: roster.ids_with(TargetStatus::Down),
        timed_out: roster.ids_with(TargetStatus::TimedOut),
        jid,
        errors_discarded,
    };

    metrics::DISCOVERY_TARGETS
        .with_label_values(&["live"])
        .inc_by(discovery.live.len() as u64);
    metrics::DISCOVERY_TARGETS
        .with_label_values(&["down"])
        .inc_by(discovery.down.len() as u64);
    metrics::DISCOVERY_TARGETS
        .with_label_values(&["timed_out"])
        .inc_by(discovery.timed_out.len() as u64);

    info!(
        "Discovered {} live targets ({} down, {} timed out)",
        discovery.live.len(),
        discovery.down.len(),
        discovery.timed_out.len()
    );

    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRemoteClient;
    use serde_json::json;
    use std::time::Duration;

    fn request() -> DiscoveryRequest {
        DiscoveryRequest {
            target: "*".to_string(),
            probe_function: "test.ping".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_discover_ignores_error_payload() {
        let client = MockRemoteClient::new().with_discovery(vec![
            json!({"error": "Authentication failure", "jid": "20260101000000"}),
            json!({"minions": ["minion1"], "jid": "20260101000001"}),
            json!({"minion1": {"ret": true}}),
        ]);

        let discovery = discover(&client, &request()).await.unwrap();

        assert!(!discovery.live.contains(&"error".to_string()));
        assert_eq!(discovery.live, vec!["minion1"]);
        assert_eq!(discovery.jid.as_deref(), Some("20260101000001"));
        assert_eq!(discovery.errors_discarded, 1);
    }

    #[tokio::test]
    async fn test_discover_marks_silent_targets_down() {
        let client = MockRemoteClient::new().with_discovery(vec![
            json!({"minions": ["m1", "m2", "m3"]}),
            json!({"m3": {"ret": true}}),
            json!({"m1": {"ret": true}}),
        ]);

        let discovery = discover(&client, &request()).await.unwrap();

        assert_eq!(discovery.live, vec!["m3", "m1"]);
        assert_eq!(discovery.down, vec!["m2"]);
        assert!(discovery.timed_out.is_empty());
    }

    #[tokio::test]
    async fn test_discover_merges_repeated_payloads() {
        let client = MockRemoteClient::new().with_discovery(vec![
            json!({"minions": ["m1", "m2"]}),
            json!({"minions": ["m2", "m3"]}),
            json!({"m2": {"ret": true}}),
            json!({"m2": {"ret": true}}),
            json!({"m3": {"ret": true}}),
        ]);

        let discovery = discover(&client, &request()).await.unwrap();

        assert_eq!(discovery.live, vec!["m2", "m3"]);
        assert_eq!(discovery.down, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_discover_ignores_unannounced_replies() {
        let client = MockRemoteClient::new().with_discovery(vec![
            json!({"stranger": {"ret": true}}),
            json!({"minions": ["m1"]}),
            json!({"m1": {"ret": true}}),
        ]);

        let discovery = discover(&client, &request()).await.unwrap();
        assert_eq!(discovery.live, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_discover_empty_is_not_an_error() {
        let client = MockRemoteClient::new().with_discovery(vec![json!({"error": "No targets"})]);

        let discovery = discover(&client, &request()).await.unwrap();
        assert!(discovery.is_empty());
        assert!(discovery.down.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_deadline_marks_pending_timed_out() {
        let client = MockRemoteClient::new()
            .with_discovery(vec![json!({"minions": ["m1", "m2"]}), json!({"m1": {"ret": true}})])
            .hold_discovery_open();

        let discovery = discover(&client, &request()).await.unwrap();

        assert_eq!(discovery.live, vec!["m1"]);
        assert_eq!(discovery.timed_out, vec!["m2"]);
        assert!(discovery.down.is_empty());
    }

    #[tokio::test]
    async fn test_discover_open_failure() {
        let client = MockRemoteClient::new();
        client.fail_discovery(TransportError::ConnectionFailed("refused".to_string()));

        let result = discover(&client, &request()).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
