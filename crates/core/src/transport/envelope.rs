//! Envelope decoding at the transport boundary.
//!
//! The transport hands out loosely shaped JSON mappings: sometimes an error
//! report, sometimes the list of targets a probe was published to, sometimes a
//! `{target_id: return}` document. Everything downstream works on the decoded
//! [`Envelope`] and never re-inspects raw keys, so the error sentinel keys can
//! never be mistaken for target ids.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};

use super::types::{EnvelopeStream, RawEnvelope};

/// Key carrying a transport error message.
pub const ERROR_KEY: &str = "error";
/// Key carrying a transport failure flag.
pub const FAILED_KEY: &str = "failed";
/// Key carrying the target ids a probe was published to.
pub const ROSTER_KEY: &str = "minions";
/// Key carrying the correlation id.
pub const JID_KEY: &str = "jid";

/// Decoded stream of envelopes.
pub type DecodedStream = BoxStream<'static, Envelope>;

/// One decoded item from a transport stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Error or failure report from the transport itself.
    TransportError { message: String },
    /// Target ids the transport expects to hear from.
    DiscoveryPayload {
        ids: Vec<String>,
        jid: Option<String>,
    },
    /// Result document from exactly one target.
    TargetReturn { target_id: String, payload: Value },
}

impl Envelope {
    /// Short label used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::TransportError { .. } => "transport_error",
            Envelope::DiscoveryPayload { .. } => "discovery_payload",
            Envelope::TargetReturn { .. } => "target_return",
        }
    }

    fn transport_error(message: impl Into<String>) -> Self {
        Envelope::TransportError {
            message: message.into(),
        }
    }
}

/// Decode one raw transport item.
///
/// A mapping that carries returns for several targets is split into one
/// [`Envelope::TargetReturn`] per target.
pub fn decode(raw: RawEnvelope) -> Vec<Envelope> {
    let map = match raw {
        Value::Object(map) => map,
        other => {
            return vec![Envelope::transport_error(format!(
                "malformed envelope: expected an object, got {}",
                json_type(&other)
            ))]
        }
    };

    if let Some(message) = error_message(&map) {
        return vec![Envelope::transport_error(message)];
    }

    if let Some(Value::Array(ids)) = map.get(ROSTER_KEY) {
        let ids = ids
            .iter()
            .filter_map(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        let jid = map.get(JID_KEY).and_then(Value::as_str).map(str::to_string);
        return vec![Envelope::DiscoveryPayload { ids, jid }];
    }

    if map.is_empty() {
        return vec![Envelope::transport_error("malformed envelope: empty mapping")];
    }

    map.into_iter()
        .map(|(target_id, payload)| {
            if target_id.is_empty() {
                Envelope::transport_error("malformed envelope: empty target id")
            } else if !payload.is_object() {
                Envelope::transport_error(format!(
                    "malformed return for {}: expected an object, got {}",
                    target_id,
                    json_type(&payload)
                ))
            } else {
                Envelope::TargetReturn { target_id, payload }
            }
        })
        .collect()
}

/// Wrap a raw transport stream so every item is decoded exactly once.
pub fn decode_stream(raw: EnvelopeStream) -> DecodedStream {
    raw.flat_map(|raw| stream::iter(decode(raw)))
        .boxed()
}

fn error_message(map: &Map<String, Value>) -> Option<String> {
    let explicit = map.get(ERROR_KEY).and_then(Value::as_str);
    let failed = map.get(FAILED_KEY).and_then(Value::as_bool).unwrap_or(false);

    match (explicit, failed) {
        (Some(message), _) => Some(message.to_string()),
        (None, true) => Some("transport reported failure".to_string()),
        (None, false) => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_error_string() {
        let decoded = decode(json!({"error": "Authentication failure", "jid": "20260101000000"}));
        assert_eq!(
            decoded,
            vec![Envelope::TransportError {
                message: "Authentication failure".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_failed_flag() {
        let decoded = decode(json!({"error": "Publish failed", "failed": true}));
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].kind(), "transport_error");

        let decoded = decode(json!({"failed": true}));
        assert_eq!(
            decoded,
            vec![Envelope::TransportError {
                message: "transport reported failure".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_discovery_payload() {
        let decoded = decode(json!({"minions": ["m1", "m2", 7, ""], "jid": "1"}));
        assert_eq!(
            decoded,
            vec![Envelope::DiscoveryPayload {
                ids: vec!["m1".to_string(), "m2".to_string()],
                jid: Some("1".to_string()),
            }]
        );
    }

    #[test]
    fn test_decode_target_return() {
        let decoded = decode(json!({"m1": {"ret": true}}));
        assert_eq!(
            decoded,
            vec![Envelope::TargetReturn {
                target_id: "m1".to_string(),
                payload: json!({"ret": true}),
            }]
        );
    }

    #[test]
    fn test_decode_target_named_error_with_object_payload() {
        // A target whose id happens to be "error" still returns an object.
        let decoded = decode(json!({"error": {"ret": true}}));
        assert_eq!(
            decoded,
            vec![Envelope::TargetReturn {
                target_id: "error".to_string(),
                payload: json!({"ret": true}),
            }]
        );
    }

    #[test]
    fn test_decode_multi_target_mapping_splits() {
        let decoded = decode(json!({"m2": {"ret": 2}, "m1": {"ret": 1}}));
        let mut ids: Vec<_> = decoded
            .iter()
            .map(|e| match e {
                Envelope::TargetReturn { target_id, .. } => target_id.as_str(),
                other => panic!("unexpected envelope {:?}", other),
            })
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_decode_malformed() {
        for raw in [json!(null), json!("m1"), json!([1, 2]), json!({})] {
            let decoded = decode(raw);
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0].kind(), "transport_error");
        }

        let decoded = decode(json!({"m1": true}));
        assert_eq!(decoded[0].kind(), "transport_error");
    }

    #[tokio::test]
    async fn test_decode_stream() {
        let raw = stream::iter(vec![
            json!({"error": "boom"}),
            json!({"m1": {"ret": true}, "m2": {"ret": false}}),
        ])
        .boxed();

        let decoded: Vec<Envelope> = decode_stream(raw).collect().await;
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].kind(), "transport_error");
        assert_eq!(decoded[1].kind(), "target_return");
        assert_eq!(decoded[2].kind(), "target_return");
    }
}
