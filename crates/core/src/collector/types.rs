//! Types yielded by the result collector.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Lifecycle of one batch's collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    /// Waiting for returns.
    Collecting,
    /// Every expected target returned.
    Complete,
    /// The job ended with targets still missing.
    TimedOut,
}

impl CollectorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CollectorState::Collecting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorState::Collecting => "collecting",
            CollectorState::Complete => "complete",
            CollectorState::TimedOut => "timed_out",
        }
    }
}

/// Why a target was surfaced as timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutReason {
    /// The job deadline elapsed first.
    Deadline,
    /// The transport closed the stream before the target returned.
    StreamEnded,
    /// The job could not be published at all.
    DispatchFailed,
}

impl TimeoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutReason::Deadline => "deadline",
            TimeoutReason::StreamEnded => "stream_ended",
            TimeoutReason::DispatchFailed => "dispatch_failed",
        }
    }
}

/// Whether an entry is a real return or a timeout marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResultKind {
    Return,
    TimedOut { reason: TimeoutReason },
}

/// What happened to one target in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOutcome {
    /// The target's return document.
    Returned(Value),
    /// No return arrived.
    TimedOut(TimeoutReason),
}

/// Metadata attached to every yielded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMeta {
    /// Targets in this batch still without a yielded entry.
    pub pending: usize,
    #[serde(flatten)]
    pub kind: ResultKind,
    /// Zero-based batch index.
    pub batch: usize,
    /// Correlation id of the batch job.
    pub jid: String,
}

/// One entry of the run's output sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub target_id: String,
    pub outcome: TargetOutcome,
    pub meta: ResultMeta,
}

impl BatchResult {
    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, TargetOutcome::TimedOut(_))
    }

    /// The return payload, if the target returned.
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            TargetOutcome::Returned(payload) => Some(payload),
            TargetOutcome::TimedOut(_) => None,
        }
    }

    /// Whether the target returned but reported failure, either through a
    /// non-zero `retcode` or `"success": false`.
    pub fn is_failure(&self) -> bool {
        let Some(payload) = self.payload() else {
            return false;
        };
        let retcode_failed = payload
            .get("retcode")
            .and_then(Value::as_i64)
            .is_some_and(|code| code != 0);
        let success_false = payload.get("success").and_then(Value::as_bool) == Some(false);
        retcode_failed || success_false
    }

    /// Render as a single-entry `{target_id: payload}` mapping.
    ///
    /// Timeout markers render as `{"timed_out": true, "reason": ...}`.
    pub fn to_mapping(&self) -> Map<String, Value> {
        let value = match &self.outcome {
            TargetOutcome::Returned(payload) => payload.clone(),
            TargetOutcome::TimedOut(reason) => json!({
                "timed_out": true,
                "reason": reason.as_str(),
            }),
        };
        let mut mapping = Map::new();
        mapping.insert(self.target_id.clone(), value);
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: TargetOutcome) -> BatchResult {
        let kind = match &outcome {
            TargetOutcome::Returned(_) => ResultKind::Return,
            TargetOutcome::TimedOut(reason) => ResultKind::TimedOut { reason: *reason },
        };
        BatchResult {
            target_id: "m1".to_string(),
            outcome,
            meta: ResultMeta {
                pending: 0,
                kind,
                batch: 0,
                jid: "1".to_string(),
            },
        }
    }

    #[test]
    fn test_to_mapping_return() {
        let r = result(TargetOutcome::Returned(json!({"ret": true})));
        assert_eq!(Value::Object(r.to_mapping()), json!({"m1": {"ret": true}}));
        assert!(!r.is_timeout());
    }

    #[test]
    fn test_to_mapping_timeout() {
        let r = result(TargetOutcome::TimedOut(TimeoutReason::Deadline));
        assert_eq!(
            Value::Object(r.to_mapping()),
            json!({"m1": {"timed_out": true, "reason": "deadline"}})
        );
        assert!(r.is_timeout());
        assert!(r.payload().is_none());
    }

    #[test]
    fn test_is_failure() {
        assert!(!result(TargetOutcome::Returned(json!({"ret": true, "retcode": 0}))).is_failure());
        assert!(result(TargetOutcome::Returned(json!({"ret": "x", "retcode": 2}))).is_failure());
        assert!(result(TargetOutcome::Returned(json!({"success": false}))).is_failure());
        assert!(!result(TargetOutcome::TimedOut(TimeoutReason::Deadline)).is_failure());
    }

    #[test]
    fn test_meta_serialization_flattens_kind() {
        let r = result(TargetOutcome::TimedOut(TimeoutReason::DispatchFailed));
        let json = serde_json::to_value(&r.meta).unwrap();
        assert_eq!(json["kind"], "timed_out");
        assert_eq!(json["reason"], "dispatch_failed");
        assert_eq!(json["pending"], 0);
    }

    #[test]
    fn test_collector_state_terminal() {
        assert!(!CollectorState::Collecting.is_terminal());
        assert!(CollectorState::Complete.is_terminal());
        assert!(CollectorState::TimedOut.is_terminal());
    }
}
