//! stratus - watch-and-notify file store over a cloud-synced folder.
//!
//! Usage:
//!   stratus ls [DIR]                  List files known to the provider
//!   stratus tree [DIR]                List every path on disk
//!   stratus upload LOCAL NAME         Copy a local file into the container
//!   stratus download NAME LOCAL       Fetch a container file
//!   stratus rm NAME...                Remove container files
//!   stratus serve                     JSON-lines call server on stdin/stdout
//!   stratus --help                    Show help

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use stratus_core::StoreConfig;
use stratus_local::{LocalProvider, SyncDriver};
use stratus_ops::{
    CallError, CloudStore, DeleteRequest, Dispatcher, DownloadRequest, EventStream, StreamEvent,
    UploadRequest,
};

/// Channel used by one-shot CLI transfers.
const CLI_CHANNEL: &str = "stratus-cli";

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
    name = "stratus",
    version,
    about = "Watch-and-notify file store over a cloud-synced folder",
    long_about = "stratus copies files in and out of a cloud container folder and reports \
                  when the provider has finished syncing them.\n\n\
                  Use subcommands for single operations, or `stratus serve` to accept \
                  JSON-lines calls on stdin."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Container identifier, overriding the config file
    #[arg(short = 'C', long, global = true)]
    container: Option<String>,

    /// Directory holding the containers, overriding the config file
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List files the provider knows below a directory
    Ls {
        /// Subdirectory of the container
        directory: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List every path on disk below a directory, directories included
    Tree {
        directory: Option<String>,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Copy a local file into the container and wait until it is uploaded
    Upload {
        /// Local source file
        local: PathBuf,

        /// Name inside the container
        name: String,

        /// Subdirectory of the container
        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Download a container file to a local path
    Download {
        /// Name inside the container
        name: String,

        /// Local destination (overwritten)
        local: PathBuf,

        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Remove container files
    Rm {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Serve JSON-lines calls on stdin, writing results and events to stdout
    Serve,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let provider = Arc::new(LocalProvider::new(&config.base_dir));
    provider.set_signed_in(config.signed_in);
    let driver = SyncDriver::spawn(
        provider.clone(),
        Duration::from_millis(config.driver_interval_ms.max(1)),
        config.driver_step,
    );
    let store = CloudStore::spawn(provider, &config);
    info!(base_dir = %config.base_dir.display(), container = ?config.container_id, "store started");

    let result = match cli.command {
        Command::Ls { directory, format } => {
            let files = store
                .list_files(directory.as_deref())
                .await
                .context("Listing failed")?;
            print_paths(&files, format)
        }
        Command::Tree { directory, format } => {
            let paths = store
                .sub_files(directory.as_deref())
                .await
                .context("Listing failed")?;
            print_paths(&paths, format)
        }
        Command::Upload { local, name, dir } => run_upload(&store, local, name, dir).await,
        Command::Download { name, local, dir } => run_download(&store, name, local, dir).await,
        Command::Rm { names, dir } => run_remove(&store, names, dir).await,
        Command::Serve => run_serve(store).await,
    };

    driver.shutdown().await;
    result
}

/// Logs go to stderr so stdout stays machine readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StoreConfig::load_or_default(&StoreConfig::default_path())
            .context("Failed to load default config")?,
    };

    if let Some(container) = &cli.container {
        config.container_id = Some(container.clone());
    }
    if let Some(base_dir) = &cli.base_dir {
        config.base_dir = base_dir.clone();
    }
    Ok(config)
}

fn print_paths(paths: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for path in paths {
                println!("{path}");
            }
            if paths.is_empty() {
                eprintln!("No files.");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(paths)?),
    }
    Ok(())
}

async fn run_upload(
    store: &CloudStore,
    local: PathBuf,
    name: String,
    dir: Option<String>,
) -> Result<()> {
    let local = local
        .canonicalize()
        .with_context(|| format!("Invalid path {}", local.display()))?;
    let mut stream = store.create_event_channel(CLI_CHANNEL).await?;

    let mut request = UploadRequest::new(&local, &name).with_channel(CLI_CHANNEL);
    request.directory = dir;
    store.upload(request).await.context("Upload failed")?;

    eprintln!("Uploading {} as {name}...", local.display());
    wait_for_transfer(&mut stream).await?;
    eprintln!("Uploaded {name}");
    Ok(())
}

async fn run_download(
    store: &CloudStore,
    name: String,
    local: PathBuf,
    dir: Option<String>,
) -> Result<()> {
    let mut stream = store.create_event_channel(CLI_CHANNEL).await?;

    let mut request = DownloadRequest::new(&name, &local).with_channel(CLI_CHANNEL);
    request.directory = dir;
    store.download(request).await.context("Download failed")?;

    eprintln!("Downloading {name}...");
    wait_for_transfer(&mut stream).await?;
    eprintln!("Downloaded to {}", local.display());
    Ok(())
}

async fn run_remove(store: &CloudStore, names: Vec<String>, dir: Option<String>) -> Result<()> {
    let count = names.len();
    let mut stream = store.create_event_channel(CLI_CHANNEL).await?;

    let mut request = DeleteRequest::many(names).with_channel(CLI_CHANNEL);
    request.directory = dir;
    store.delete(request).await.context("Delete failed")?;

    wait_for_transfer(&mut stream).await?;
    eprintln!("Removed {count} item(s)");
    Ok(())
}

/// Drain a channel until its terminal event, printing progress to stderr.
async fn wait_for_transfer(stream: &mut EventStream) -> Result<()> {
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Progress(percent) => eprintln!("  {percent:>5.1}%"),
            StreamEvent::Files(_) => {}
            StreamEvent::Error(payload) => bail!(
                "{}: {}",
                payload.message,
                payload.details.unwrap_or_default()
            ),
            StreamEvent::End => return Ok(()),
        }
    }
    // Released without a terminal event, only after a channel-less delete.
    Ok(())
}

/// One call read from stdin.
#[derive(Debug, Deserialize)]
struct CallLine {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    arguments: Value,
}

async fn run_serve(store: CloudStore) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            let mut bytes = line.to_string().into_bytes();
            bytes.push(b'\n');
            if stdout.write_all(&bytes).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let events_tx = out_tx.clone();
    let dispatcher = Dispatcher::new(store, move |stream: EventStream| {
        tokio::spawn(forward_events(stream, events_tx.clone()));
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<CallLine>(&line) {
            Ok(call) => match dispatcher.call(&call.method, call.arguments).await {
                Ok(result) => json!({ "id": call.id, "result": result }),
                Err(err) => json!({ "id": call.id, "error": err.to_json() }),
            },
            Err(err) => {
                warn!(error = %err, "malformed call line");
                json!({ "id": Value::Null, "error": CallError::invalid_arguments(err.to_string()).to_json() })
            }
        };
        if out_tx.send(reply).is_err() {
            break;
        }
    }

    info!("stdin closed, shutting down");
    drop(dispatcher);
    drop(out_tx);
    // Channels still streaming keep the writer alive; give them a moment
    // to drain and then exit.
    if tokio::time::timeout(SHUTDOWN_GRACE, writer).await.is_err() {
        warn!("open event channels dropped on shutdown");
    }
    Ok(())
}

/// Forward every event of a channel as `{channel, event, data}` lines.
async fn forward_events(mut stream: EventStream, out: mpsc::UnboundedSender<Value>) {
    let name = stream.name().to_string();
    while let Some(event) = stream.next().await {
        let mut line = json!(event);
        if let Some(fields) = line.as_object_mut() {
            fields.insert("channel".to_string(), Value::String(name.clone()));
        }
        if out.send(line).is_err() {
            return;
        }
    }
}
