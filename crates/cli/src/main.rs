//! fleetbatch - run a remote function across a fleet in batches
//!
//! Drives a batch run against recorded transport envelopes and prints one JSON
//! line per target result.

mod output;
mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetbatch_core::{load_layered, metrics, Batch, BatchConfig, BatchSize, ConfigOverrides};

use replay::ReplayClient;

#[derive(Debug, Parser)]
#[command(name = "fleetbatch", version, about = "Run a remote function across a fleet in batches")]
struct Cli {
    /// Config file (TOML); FLEETBATCH_* variables override its values
    #[arg(long, short = 'c', env = "FLEETBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Target expression
    #[arg(long, short = 't')]
    target: Option<String>,

    /// Function to execute on every live target
    #[arg(long, short = 'f')]
    function: Option<String>,

    /// Positional argument for the function (JSON, or a bare string); repeatable
    #[arg(long = "arg", short = 'a')]
    args: Vec<String>,

    /// Batch size, a count (`10`) or a share of the roster (`25%`)
    #[arg(long, short = 'b')]
    batch_size: Option<BatchSize>,

    /// Per-job deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Discovery deadline in seconds
    #[arg(long)]
    gather_timeout: Option<u64>,

    /// Seconds to wait between batches
    #[arg(long)]
    batch_wait: Option<u64>,

    /// Stop dispatching once a target reports failure
    #[arg(long)]
    fail_hard: bool,

    /// Log per-batch progress at debug level only
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Recorded discovery envelopes (JSON lines)
    #[arg(long)]
    discovery: PathBuf,

    /// Recorded job envelopes (JSON lines)
    #[arg(long)]
    returns: PathBuf,

    /// Wrap each line with its batch metadata
    #[arg(long)]
    with_meta: bool,

    /// Dump Prometheus metrics to stderr when the run ends
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let registry = Registry::new();
    if cli.metrics {
        metrics::register_metrics(&registry).context("Failed to register metrics")?;
    }

    let config = build_config(&cli)?;
    info!(
        "Running {} on {:?} (batch size {})",
        config.function, config.target, config.batch_size
    );

    let client = Arc::new(
        ReplayClient::from_files(&cli.discovery, &cli.returns)
            .context("Failed to load recorded envelopes")?,
    );

    let mut run = Batch::try_new(config, client)
        .context("Configuration validation failed")?
        .run();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(result) = run.next().await {
        output::write_line(&mut out, &result, cli.with_meta)?;
    }
    drop(out);

    if cli.metrics {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        eprint!("{}", String::from_utf8_lossy(&buffer));
    }

    if let Some(err) = run.take_error() {
        return Err(err.into());
    }

    let summary = run.summary();
    info!(
        "{} returned, {} timed out, {} failed across {} batches",
        summary.returned, summary.timed_out, summary.failed, summary.dispatched_batches
    );
    Ok(())
}

fn build_config(cli: &Cli) -> Result<BatchConfig> {
    let overrides = ConfigOverrides {
        target: cli.target.clone(),
        function: cli.function.clone(),
        args: (!cli.args.is_empty()).then(|| cli.args.iter().map(|a| parse_arg(a)).collect()),
        batch_size: cli.batch_size,
        timeout_secs: cli.timeout,
        gather_timeout_secs: cli.gather_timeout,
        batch_wait_secs: cli.batch_wait,
        quiet: cli.quiet,
        fail_hard: cli.fail_hard,
    };

    match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_layered(Some(path), &overrides)
                .with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => load_layered(None, &overrides).context(
            "Failed to build configuration (pass --config, or --target and --function)",
        ),
    }
}

/// Arguments that parse as JSON keep their type; anything else is a string.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["fleetbatch", "--discovery", "d.jsonl", "--returns", "r.jsonl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_only() {
        let cli = parse(&["-t", "web*", "-f", "cmd.run", "-a", "uptime", "-a", "3", "-b", "25%"]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.target, "web*");
        assert_eq!(config.function, "cmd.run");
        assert_eq!(config.args, vec![json!("uptime"), json!(3)]);
        assert_eq!(config.batch_size, BatchSize::Percent(25.0));
    }

    #[test]
    fn test_missing_target_without_config() {
        let cli = parse(&["-f", "test.ping"]);
        let err = build_config(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("--target"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target = \"*\"\nfunction = \"test.ping\"\nbatch_size = 3\ntimeout_secs = 30"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = parse(&["-c", path, "--timeout", "7", "--fail-hard"]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.target, "*");
        assert_eq!(config.batch_size, BatchSize::Absolute(3));
        assert_eq!(config.timeout_secs, 7);
        assert!(config.fail_hard);
    }

    #[test]
    fn test_bad_batch_size_rejected() {
        let argv = [
            "fleetbatch", "--discovery", "d", "--returns", "r", "-b", "lots",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("true"), json!(true));
        assert_eq!(parse_arg("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_arg("uptime"), json!("uptime"));
    }
}
