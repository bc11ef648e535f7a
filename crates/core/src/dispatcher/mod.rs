//! Batch dispatcher.
//!
//! Drives a run through its phases:
//! - **Discovery**: probe the target expression once, lazily on first pull
//! - **Planning**: split the live roster into fixed batches
//! - **Dispatch**: strictly sequential, one batch job open at a time

mod jid;
mod runner;
mod types;

pub use jid::JidGenerator;
pub use runner::{Batch, BatchRun};
pub use types::{BatchError, RunSummary};
