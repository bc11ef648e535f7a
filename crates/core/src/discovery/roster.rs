//! Ordered roster of discovered targets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Liveness of a target as seen by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Announced by the transport, no reply yet.
    Pending,
    /// Replied to the probe.
    Responded,
    /// Did not reply before the discovery deadline.
    TimedOut,
    /// The transport finished without hearing from it.
    Down,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Pending => "pending",
            TargetStatus::Responded => "responded",
            TargetStatus::TimedOut => "timed_out",
            TargetStatus::Down => "down",
        }
    }
}

/// A single fleet member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub status: TargetStatus,
}

/// Insertion-ordered set of targets; each id appears at most once.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
    responded: Vec<String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending target. Returns false if the id was already known.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.index.contains_key(id) {
            return false;
        }
        self.index.insert(id.to_string(), self.targets.len());
        self.targets.push(Target {
            id: id.to_string(),
            status: TargetStatus::Pending,
        });
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn status(&self, id: &str) -> Option<TargetStatus> {
        self.index.get(id).map(|&i| self.targets[i].status)
    }

    /// Mark a pending target as responded. Returns false for unknown ids and
    /// for targets that already responded.
    pub fn mark_responded(&mut self, id: &str) -> bool {
        match self.index.get(id) {
            Some(&i) if self.targets[i].status == TargetStatus::Pending => {
                self.targets[i].status = TargetStatus::Responded;
                self.responded.push(id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Move every still-pending target to `status`.
    pub fn settle_pending(&mut self, status: TargetStatus) {
        for target in &mut self.targets {
            if target.status == TargetStatus::Pending {
                target.status = status;
            }
        }
    }

    /// Responded targets, in the order their replies arrived.
    pub fn live(&self) -> &[String] {
        &self.responded
    }

    /// Ids with the given status, in roster order.
    pub fn ids_with(&self, status: TargetStatus) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut roster = Roster::new();
        assert!(roster.insert("m1"));
        assert!(!roster.insert("m1"));
        assert!(roster.insert("m2"));
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.status("m1"), Some(TargetStatus::Pending));
    }

    #[test]
    fn test_live_keeps_response_order() {
        let mut roster = Roster::new();
        roster.insert("m1");
        roster.insert("m2");
        roster.insert("m3");

        assert!(roster.mark_responded("m3"));
        assert!(roster.mark_responded("m1"));
        assert!(!roster.mark_responded("m1"));
        assert!(!roster.mark_responded("unknown"));

        assert_eq!(roster.live(), &["m3".to_string(), "m1".to_string()]);
    }

    #[test]
    fn test_settle_pending() {
        let mut roster = Roster::new();
        roster.insert("m1");
        roster.insert("m2");
        roster.mark_responded("m2");
        roster.settle_pending(TargetStatus::Down);

        assert_eq!(roster.ids_with(TargetStatus::Down), vec!["m1"]);
        assert_eq!(roster.ids_with(TargetStatus::Responded), vec!["m2"]);
        assert!(roster.ids_with(TargetStatus::Pending).is_empty());
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(TargetStatus::Pending.as_str(), "pending");
        assert_eq!(TargetStatus::TimedOut.as_str(), "timed_out");
        assert_eq!(
            serde_json::to_string(&TargetStatus::Down).unwrap(),
            "\"down\""
        );
    }
}
