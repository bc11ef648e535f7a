//! Remote-execution transport abstraction.
//!
//! This module provides the `RemoteClient` trait the dispatcher talks to, and
//! the envelope decoder that sits on every stream the client opens.

mod envelope;
mod types;

pub use envelope::{
    decode, decode_stream, DecodedStream, Envelope, ERROR_KEY, FAILED_KEY, JID_KEY, ROSTER_KEY,
};
pub use types::*;
