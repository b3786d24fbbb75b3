use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use msgbridge::config::Config;
use msgbridge::db::{Database, StoreReader, StoreWriter};
use msgbridge::dispatch::Dispatcher;
use msgbridge::ingest::Ingestor;
use msgbridge::mcp::{serve_stdio, BridgeServer};
use msgbridge::normalizer::Normalizer;
use msgbridge::protocol::events::{forward_json_lines, ProtocolEvent};
use msgbridge::protocol::http::HttpBridgeClient;
use msgbridge::protocol::Session;
use msgbridge::query::{QueryEngine, QueryLimits};
use msgbridge::tools::builtin::build_registry;
use msgbridge::tools::executor::ToolExecutor;

#[derive(Parser)]
#[command(name = "msgbridge", version, about = "Messaging bridge with a local store and an MCP tool server")]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest protocol events (JSON lines) into the store
    Ingest {
        /// Event file or FIFO; stdin when omitted
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Serve the tool surface over MCP on stdio
    Serve,
    /// Ingest from an event source while serving MCP on stdio
    Run {
        /// Event file or FIFO (stdin carries MCP in this mode)
        #[arg(long)]
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(database) = cli.database {
        config.database_url = database;
    }

    // stdout belongs to the MCP transport
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting msgbridge with {:?}", config);

    let session = Session::new(Arc::new(HttpBridgeClient::new(&config)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = match cli.command {
        Command::Ingest { events } => {
            let (writer, _reader) = Database::open(&config.database_url, config.read_retry_attempts)?;
            run_ingest(&config, writer, session.clone(), events, shutdown_rx).await
        }
        Command::Serve => {
            let reader = Database::open_read_only(&config.database_url, config.read_retry_attempts)?;
            serve_stdio(server(&config, reader, session.clone())).await
        }
        Command::Run { events } => {
            let (writer, reader) = Database::open(&config.database_url, config.read_retry_attempts)?;
            let (stop_tx, stop_rx) = watch::channel(false);
            let ingest = {
                let config = config.clone();
                let session = session.clone();
                let stop_rx = stop_rx.clone();
                tokio::spawn(async move { run_ingest(&config, writer, session, Some(events), stop_rx).await })
            };
            let served = tokio::select! {
                served = serve_stdio(server(&config, reader, session.clone())) => served,
                _ = wait_for(shutdown_rx) => Ok(()),
            };
            let _ = stop_tx.send(true);
            match ingest.await {
                Ok(Err(e)) => error!("Ingestion ended with error: {:#}", e),
                Err(e) => error!("Ingestion task failed: {}", e),
                Ok(Ok(())) => {}
            }
            served
        }
    };

    session.close();
    info!("msgbridge stopped");
    result
}

fn server(config: &Config, reader: StoreReader, session: Arc<Session>) -> BridgeServer {
    let queries = Arc::new(QueryEngine::new(
        reader,
        QueryLimits::from_config(config),
        config.individual_chat_suffix.clone(),
        config.group_chat_suffix.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        session,
        config.individual_chat_suffix.clone(),
        config.send_timeout,
    ));
    let registry = Arc::new(build_registry(queries, dispatcher));
    BridgeServer::new(Arc::new(ToolExecutor::new(registry)))
}

async fn run_ingest(
    config: &Config,
    writer: StoreWriter,
    session: Arc<Session>,
    events: Option<PathBuf>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    let source = spawn_event_source(events, tx).await?;

    let ingestor = Ingestor::new(writer, Normalizer::new(config.group_chat_suffix.clone()), session);
    let (reason, summary) = ingestor.run(rx, shutdown).await;
    info!("Ingestion finished ({:?}): {:?}", reason, summary);

    // The source may be blocked on a FIFO with no writer.
    source.abort();
    match source.await {
        Ok(Ok(count)) => info!("Event source forwarded {} events", count),
        Ok(Err(e)) => warn!("Event source failed: {:#}", e),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("Event source task failed: {}", e),
    }
    Ok(())
}

async fn spawn_event_source(
    events: Option<PathBuf>,
    tx: mpsc::Sender<ProtocolEvent>,
) -> anyhow::Result<JoinHandle<anyhow::Result<usize>>> {
    let handle = match events {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Cannot open event source {}: {}", path.display(), e))?;
            info!("Reading events from {}", path.display());
            tokio::spawn(forward_json_lines(BufReader::new(file), tx))
        }
        None => {
            info!("Reading events from stdin");
            tokio::spawn(forward_json_lines(BufReader::new(tokio::io::stdin()), tx))
        }
    };
    Ok(handle)
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            // Sender dropped: ctrl_c can no longer fire.
            std::future::pending::<()>().await;
        }
    }
}
