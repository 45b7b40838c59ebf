//! flowhsd entry point.
//!
//! Reads JSON messages (flow requests and speaker responses) line by line
//! from stdin and writes speaker requests and flow outcomes as JSON lines to
//! stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use flowhs::audit::{init_logging, init_logging_pretty, AuditCategory, AuditOutcome, AuditRecord};
use flowhs::audit_log;
use flowhs::carrier::ChannelCarrier;
use flowhs::config::{FlowHsConfig, LogFormat, DEFAULT_CONFIG_PATH};
use flowhs::daemon::{FlowHsDaemon, FlowHsDaemonConfig, OutboundMessage};
use flowhs::flow_operation::SagaCollaborators;
use flowhs::history::LogHistorySink;
use flowhs::path_computer::StaticPathComputer;
use flowhs::persistence::InMemoryFlowRepository;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Flow operation orchestrator daemon
#[derive(Parser, Debug)]
#[command(name = "flowhsd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the per-command retry limit
    #[arg(short = 'r', long)]
    retries_limit: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,
}

fn load_config(args: &Args) -> anyhow::Result<FlowHsConfig> {
    let mut config = FlowHsConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(limit) = args.retries_limit {
        config.orchestrator.speaker_command_retries_limit = limit;
    }
    if let Some(level) = &args.log_level {
        config.daemon.log_level = level.clone();
    }
    if args.pretty {
        config.daemon.log_format = LogFormat::Pretty;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

async fn run(config: FlowHsConfig) -> anyhow::Result<()> {
    let repository = Arc::new(InMemoryFlowRepository::new());
    let path_computer = Arc::new(StaticPathComputer::new());
    config
        .seed_topology(repository.as_ref(), &path_computer)
        .context("seeding topology")?;

    let (carrier, mut speaker_rx) = ChannelCarrier::new();
    let collaborators = SagaCollaborators {
        carrier: Arc::new(carrier),
        repository,
        path_computer,
        history: Arc::new(LogHistorySink),
    };
    let daemon = FlowHsDaemon::new(FlowHsDaemonConfig::from_config(&config)?, collaborators);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();

    let speaker_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(request) = speaker_rx.recv().await {
            if speaker_out.send(OutboundMessage::SpeakerRequest(request)).is_err() {
                break;
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            let line = match message.encode() {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if let Err(e) = stdout.write_all(format!("{}\n", line).as_bytes()).await {
                error!("Failed to write to stdout: {}", e);
                break;
            }
            if let Err(e) = stdout.flush().await {
                error!("Failed to flush stdout: {}", e);
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match daemon.handle_message(&line).await {
                    Ok(Some(outcome_rx)) => {
                        let outcome_tx = out_tx.clone();
                        tokio::spawn(async move {
                            if let Ok(outcome) = outcome_rx.await {
                                let _ = outcome_tx.send(OutboundMessage::FlowOutcome(outcome));
                            }
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Rejected message: {}", e),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                warn!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    let running = daemon.active_flows().await;
    if !running.is_empty() {
        warn!("Stopping with {} operation(s) still running", running.len());
    }
    daemon.shutdown().await;
    info!("Final stats: {:?}", daemon.stats());

    drop(daemon);
    drop(out_tx);
    forwarder.abort();
    let _ = writer.await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("flowhsd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.daemon.log_format {
        LogFormat::Json => init_logging(&config.daemon.log_level),
        LogFormat::Pretty => init_logging_pretty(&config.daemon.log_level),
    }

    info!("Starting flowhsd");
    info!(
        "Speaker command retry limit: {}",
        config.orchestrator.speaker_command_retries_limit
    );
    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "flowhsd", "daemon_start")
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "retries_limit": config.orchestrator.speaker_command_retries_limit,
            "switches": config.topology.switches.len(),
            "routes": config.topology.routes.len(),
        })));

    match run(config).await {
        Ok(()) => {
            info!("flowhsd shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("flowhsd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
