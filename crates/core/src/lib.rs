pub mod collector;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod metrics;
pub mod planner;
pub mod testing;
pub mod transport;

pub use collector::{
    BatchResult, CollectorState, CollectorStats, ResultCollector, ResultKind, ResultMeta,
    TargetOutcome, TimeoutReason,
};
pub use config::{
    load_config, load_config_from_str, load_layered, validate_config, BatchConfig, ConfigError,
    ConfigOverrides,
};
pub use discovery::{discover, Discovery, Roster, Target, TargetStatus};
pub use dispatcher::{Batch, BatchError, BatchRun, JidGenerator, RunSummary};
pub use planner::{plan, BatchPlanner, BatchSize, ParseBatchSizeError, TargetBatch};
pub use transport::{
    decode, decode_stream, DecodedStream, DiscoveryRequest, Envelope, EnvelopeStream, JobRequest,
    RawEnvelope, RemoteClient, TransportError,
};
