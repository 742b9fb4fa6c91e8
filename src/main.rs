use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use quay_artifact::{ByteStream, FsStore, read_all};
use quay_codec::{Codec, JsonCodec};
use quay_dispatch::{DispatchConfig, Dispatcher, RetryPolicy, Role};
use quay_registry::{DispatchStatus, ListFilter, SqliteRegistry};
use quay_server::{AppState, ServerConfig, build_app_router};
use quay_workflow::{DispatchPayload, WorkflowDef};

/// Quay - dispatch queueing and artifact transfer for workflow execution
#[derive(Parser)]
#[command(name = "quay")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.quay)
  #[arg(long, global = true, env = "QUAY_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Attempts for each storage operation before giving up
  #[arg(long, global = true, env = "QUAY_STORAGE_RETRIES", default_value_t = 3)]
  storage_retries: u32,

  /// Largest accepted payload in bytes
  #[arg(long, global = true, env = "QUAY_MAX_PAYLOAD_BYTES", default_value_t = 64 * 1024 * 1024)]
  max_payload_bytes: usize,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the HTTP server
  Serve(ServeArgs),

  /// Submit a workflow for execution
  Submit {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Path to a JSON object with the workflow inputs
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Default executor for tasks that do not name one
    #[arg(long)]
    executor: Option<String>,

    /// Directory results should be downloaded into
    #[arg(long)]
    results_dir: Option<String>,
  },

  /// Show the record of a dispatch
  Status { dispatch_id: String },

  /// List dispatches, newest first
  List {
    #[arg(long)]
    status: Option<DispatchStatus>,

    #[arg(long, default_value_t = 20)]
    limit: u32,
  },

  /// Upload an input file for a dispatch
  Upload {
    dispatch_id: String,
    file: PathBuf,

    /// Numbered upload slot
    #[arg(long)]
    slot: Option<u32>,
  },

  /// Download an artifact of a dispatch
  Download {
    dispatch_id: String,

    /// Artifact role: payload, result, upload or upload-N
    #[arg(long, default_value = "result")]
    role: Role,

    /// Output file (default: `{dispatch_id}-{role}` in the dispatch's
    /// results directory, or the current directory)
    #[arg(long, short)]
    output: Option<PathBuf>,
  },

  /// Store a result and mark a dispatch completed
  Complete { dispatch_id: String, result_file: PathBuf },

  /// Mark a dispatch failed
  Fail {
    dispatch_id: String,

    #[arg(long)]
    error: String,
  },
}

#[derive(Args)]
struct ServeArgs {
  #[arg(long, env = "QUAY_HOST", default_value = "127.0.0.1")]
  host: String,

  #[arg(long, env = "QUAY_PORT", default_value_t = 48008)]
  port: u16,

  #[arg(long, env = "QUAY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
  request_timeout_secs: u64,
}

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  let cli = Cli::parse();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "quay=info,tower_http=info".into()))
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".quay"),
  };

  let config = DispatchConfig {
    max_payload_bytes: Some(cli.max_payload_bytes),
    retry: RetryPolicy {
      max_attempts: cli.storage_retries,
      ..RetryPolicy::default()
    },
  };

  let Some(command) = cli.command else {
    println!("quay - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async move {
    let dispatcher = open(&data_dir, config.clone()).await?;
    match command {
      Commands::Serve(args) => serve(dispatcher, args, config).await,
      Commands::Submit {
        workflow_file,
        inputs,
        executor,
        results_dir,
      } => submit(&dispatcher, workflow_file, inputs, executor, results_dir).await,
      Commands::Status { dispatch_id } => {
        print_json(&dispatcher.status(&dispatch_id).await?)
      }
      Commands::List { status, limit } => {
        let filter = ListFilter {
          status,
          limit: Some(limit),
          ..ListFilter::default()
        };
        print_json(&dispatcher.list(&filter).await?)
      }
      Commands::Upload {
        dispatch_id,
        file,
        slot,
      } => upload(&dispatcher, &dispatch_id, &file, slot).await,
      Commands::Download {
        dispatch_id,
        role,
        output,
      } => download(&dispatcher, &dispatch_id, role, output).await,
      Commands::Complete {
        dispatch_id,
        result_file,
      } => {
        let data = tokio::fs::read(&result_file)
          .await
          .with_context(|| format!("failed to read result file: {}", result_file.display()))?;
        let record = dispatcher
          .transfer()
          .complete(&dispatch_id, quay_artifact::stream_from(data))
          .await?;
        print_json(&record)
      }
      Commands::Fail { dispatch_id, error } => {
        print_json(&dispatcher.transfer().fail(&dispatch_id, &error).await?)
      }
    }
  })
}

/// Open the registry and artifact store under `data_dir`.
async fn open(data_dir: &Path, config: DispatchConfig) -> Result<Dispatcher> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_path = data_dir.join("quay.db");
  let registry = SqliteRegistry::open(&db_path)
    .await
    .with_context(|| format!("failed to open registry: {}", db_path.display()))?;
  registry
    .migrate()
    .await
    .context("failed to run registry migrations")?;

  let store = FsStore::new(data_dir.join("artifacts"));

  Ok(Dispatcher::new(
    Arc::new(JsonCodec::new()),
    Arc::new(store),
    Arc::new(registry),
    config,
  ))
}

async fn serve(dispatcher: Dispatcher, args: ServeArgs, config: DispatchConfig) -> Result<()> {
  let server_config = ServerConfig {
    host: args.host,
    port: args.port,
    request_timeout_secs: args.request_timeout_secs,
    max_body_bytes: config
      .max_payload_bytes
      .unwrap_or(ServerConfig::default().max_body_bytes),
  };

  let addr = server_config.bind_addr();
  let app = build_app_router(AppState {
    dispatcher,
    config: Arc::new(server_config),
  });

  let listener = tokio::net::TcpListener::bind(&addr)
    .await
    .with_context(|| format!("failed to bind {addr}"))?;
  tracing::info!(addr = %addr, "quay server listening");

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
      }
      tracing::info!("shutting down");
    })
    .await
    .context("server error")?;

  Ok(())
}

async fn submit(
  dispatcher: &Dispatcher,
  workflow_file: PathBuf,
  inputs: Option<PathBuf>,
  executor: Option<String>,
  results_dir: Option<String>,
) -> Result<()> {
  let workflow_content = tokio::fs::read_to_string(&workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let workflow: WorkflowDef = serde_json::from_str(&workflow_content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  let mut payload = DispatchPayload::new(workflow);
  if let Some(inputs) = inputs {
    let content = tokio::fs::read_to_string(&inputs)
      .await
      .with_context(|| format!("failed to read inputs file: {}", inputs.display()))?;
    payload.inputs = serde_json::from_str(&content)
      .with_context(|| format!("inputs must be a JSON object: {}", inputs.display()))?;
  }
  payload.metadata.executor = executor;
  payload.metadata.results_dir = results_dir;

  let dispatch_id = dispatcher.submission().submit_payload(&payload).await?;
  eprintln!("Submitted workflow: {}", payload.workflow.name);
  println!("{dispatch_id}");

  Ok(())
}

async fn upload(
  dispatcher: &Dispatcher,
  dispatch_id: &str,
  file: &Path,
  slot: Option<u32>,
) -> Result<()> {
  let data = tokio::fs::read(file)
    .await
    .with_context(|| format!("failed to read upload file: {}", file.display()))?;

  let transfer = dispatcher.transfer();
  let stored = match slot {
    Some(slot) => transfer.upload_slot(dispatch_id, slot, data.into()).await?,
    None => transfer.upload(dispatch_id, data.into()).await?,
  };
  anyhow::ensure!(stored, "upload failed after retries");

  eprintln!("Uploaded {} to {dispatch_id}", file.display());
  Ok(())
}

async fn download(
  dispatcher: &Dispatcher,
  dispatch_id: &str,
  role: Role,
  output: Option<PathBuf>,
) -> Result<()> {
  let transfer = dispatcher.transfer();

  let output = match output {
    Some(path) => path,
    None => {
      let payload = read_all(transfer.payload(dispatch_id).await?).await?;
      let payload = JsonCodec::new()
        .decode(&payload)
        .context("stored payload could not be decoded")?;
      let dir = payload
        .metadata
        .results_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
      dir.join(format!("{dispatch_id}-{role}"))
    }
  };

  let stream = transfer.download_role(dispatch_id, role).await?;
  if let Some(parent) = output.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  write_stream(stream, &output).await?;

  eprintln!("Wrote {}", output.display());
  Ok(())
}

async fn write_stream(mut stream: ByteStream, path: &Path) -> Result<()> {
  let mut file = tokio::fs::File::create(path)
    .await
    .with_context(|| format!("failed to create {}", path.display()))?;
  while let Some(chunk) = stream.next().await {
    file.write_all(&chunk?).await?;
  }
  file.flush().await?;
  Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
