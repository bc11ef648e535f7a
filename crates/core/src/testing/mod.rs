//! Testing utilities and mock implementations.
//!
//! This module provides a scripted implementation of the transport trait,
//! allowing full runs to be exercised without a real fleet.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetbatch_core::testing::{fixtures, JobScript, MockRemoteClient};
//!
//! let client = MockRemoteClient::new()
//!     .with_discovery(fixtures::discovery(&["m1", "m2"]))
//!     .with_job(JobScript::new(vec![fixtures::target_return("m1", json!(true))]))
//!     .with_auto_reply();
//! ```

mod mock_remote_client;

pub use mock_remote_client::{JobScript, MockRemoteClient};

/// Envelope literals in the shape the transport emits.
pub mod fixtures {
    use serde_json::{json, Value};

    /// The probe announcement listing `ids`.
    pub fn announcement(ids: &[&str], jid: &str) -> Value {
        json!({"minions": ids, "jid": jid})
    }

    /// A successful return from `id` carrying `ret`.
    pub fn target_return(id: &str, ret: Value) -> Value {
        json!({ id: {"ret": ret, "retcode": 0} })
    }

    /// A return from `id` reporting failure with `retcode`.
    pub fn failed_return(id: &str, retcode: i64) -> Value {
        json!({ id: {"ret": "command failed", "retcode": retcode} })
    }

    /// A transport-level error report.
    pub fn transport_error(message: &str) -> Value {
        json!({"error": message, "failed": true})
    }

    /// A complete discovery exchange: announcement followed by one probe
    /// reply per id.
    pub fn discovery(ids: &[&str]) -> Vec<Value> {
        let mut items = vec![announcement(ids, "20260101000000000000")];
        items.extend(ids.iter().map(|id| target_return(id, json!(true))));
        items
    }
}
