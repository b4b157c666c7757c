//! linecut - distributed, fault-tolerant field extraction over a
//! message broker.
//!
//! Three run modes: `local` applies the processor directly to stdin,
//! `worker` drains the task queue, `coordinator` splits stdin into
//! chunks, ships them through the broker, and reassembles the output.

use clap::{Parser, Subcommand};
use linecut::config::AppConfig;
use linecut::coordinator::{Coordinator, RunParams};
use linecut::observability::init_default_logging;
use linecut::processor::{parse_fields, LineProcessor};
use linecut::transport::{Broker, MqttTransport};
use linecut::worker::Worker;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Distributed cut-style field extraction
#[derive(Parser)]
#[command(name = "linecut")]
#[command(about = "Distributed cut-style field extraction over a message broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process stdin to stdout directly, no broker involved
    Local {
        /// Field delimiter
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Fields to extract, e.g. "1,3-5,7"
        #[arg(short, long)]
        fields: Option<String>,

        /// Suppress lines containing no delimiter
        #[arg(short, long)]
        suppress: bool,
    },
    /// Run a worker process draining the task queue
    Worker {
        /// Broker URL (mqtt:// or mqtts://)
        #[arg(short, long)]
        broker_url: Option<String>,

        /// Number of concurrent pullers
        #[arg(short, long)]
        threads: Option<usize>,

        /// Stable worker identity
        #[arg(long)]
        id: Option<String>,
    },
    /// Split stdin into chunks, distribute them, reassemble to stdout
    Coordinator {
        /// Field delimiter
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Fields to extract, e.g. "1,3-5,7"
        #[arg(short, long)]
        fields: Option<String>,

        /// Suppress lines containing no delimiter
        #[arg(short, long)]
        suppress: bool,

        /// Broker URL (mqtt:// or mqtts://)
        #[arg(short, long)]
        broker_url: Option<String>,

        /// Target chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Quorum size (reserved for redundant publishing)
        #[arg(long)]
        quorum_size: Option<usize>,

        /// Collection timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Local {
            delimiter,
            fields,
            suppress,
        } => {
            apply_processing_overrides(&mut config, delimiter, fields, suppress);
            run_local(&config)
        }
        Commands::Worker {
            broker_url,
            threads,
            id,
        } => {
            if let Some(url) = broker_url {
                config.broker.broker_url = url;
            }
            if let Some(threads) = threads {
                config.worker.threads = threads;
            }
            if let Some(id) = id {
                config.worker.id = Some(id);
            }
            run_worker(&config).await
        }
        Commands::Coordinator {
            delimiter,
            fields,
            suppress,
            broker_url,
            chunk_size,
            quorum_size,
            timeout_secs,
        } => {
            apply_processing_overrides(&mut config, delimiter, fields, suppress);
            if let Some(url) = broker_url {
                config.broker.broker_url = url;
            }
            if let Some(chunk_size) = chunk_size {
                config.coordinator.chunk_size_bytes = chunk_size;
            }
            if let Some(quorum_size) = quorum_size {
                config.coordinator.quorum_size = quorum_size;
            }
            if let Some(timeout_secs) = timeout_secs {
                config.coordinator.timeout_secs = timeout_secs;
            }
            run_coordinator(&config).await
        }
    };

    if let Err(e) = result {
        error!("run failed: {e}");
        process::exit(1);
    }
}

fn apply_processing_overrides(
    config: &mut AppConfig,
    delimiter: Option<String>,
    fields: Option<String>,
    suppress: bool,
) {
    if let Some(delimiter) = delimiter {
        config.processing.delimiter = delimiter;
    }
    if let Some(fields) = fields {
        config.processing.fields = fields;
    }
    if suppress {
        config.processing.suppress = true;
    }
}

/// Broadcast `true` once SIGINT or SIGTERM arrives.
fn spawn_signal_listener() -> Result<watch::Receiver<bool>, std::io::Error> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    Ok(shutdown_rx)
}

fn run_local(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let fields = parse_fields(&config.processing.fields)?;
    let processor = LineProcessor::new(
        &config.processing.delimiter,
        fields,
        config.processing.suppress,
    )?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    processor.process_stream(stdin.lock(), &mut stdout.lock())?;
    Ok(())
}

async fn run_worker(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(MqttTransport::connect(&config.broker, "worker").await?);
    let worker = Worker::new(
        broker.clone(),
        config.worker.id.clone(),
        config.worker.threads,
        config.broker.prefetch,
    );
    info!(worker_id = %worker.id(), "starting worker");

    let shutdown_rx = spawn_signal_listener()?;
    let run_result = worker.start(shutdown_rx).await;

    if let Err(e) = broker.close().await {
        warn!("error closing broker: {e}");
    }
    run_result?;

    let stats = worker.stats();
    info!(
        processed = stats.processed,
        failed = stats.failed,
        "worker finished"
    );
    Ok(())
}

async fn run_coordinator(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let fields = parse_fields(&config.processing.fields)?;
    let params = RunParams {
        delimiter: config.processing.delimiter.clone(),
        fields,
        suppress: config.processing.suppress,
    };

    let broker = Arc::new(MqttTransport::connect(&config.broker, "coordinator").await?);
    let coordinator = Coordinator::new(broker.clone(), config.coordinator.quorum_size);

    let shutdown_rx = spawn_signal_listener()?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let run_result = coordinator
        .process_with_quorum(
            stdin.lock(),
            &mut stdout.lock(),
            &params,
            config.coordinator.chunk_size_bytes,
            Duration::from_secs(config.coordinator.timeout_secs),
            shutdown_rx,
        )
        .await;

    if let Err(e) = broker.close().await {
        warn!("error closing broker: {e}");
    }
    let stats = run_result?;

    let counters = coordinator.stats();
    info!(
        clean = stats.clean,
        errored = stats.errored,
        total_tasks = counters.total_tasks,
        completed_tasks = counters.completed_tasks,
        "run complete"
    );
    Ok(())
}
