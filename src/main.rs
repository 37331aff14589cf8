//! FloralBot server and one-shot analyzer.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use floralbot::capture::{capture_from_file, Camera, StillFrameDevice};
use floralbot::config::{
    env_lookup, CredentialProvider, EnvCredentials, EnvReport, RemoteCredentials,
};
use floralbot::server::{self, AppState};
use floralbot::storage::{StorageEndpoint, DEFAULT_STORAGE_HOST};
use floralbot::{ImageAsset, Pipeline, PipelineError, PipelineSettings};

#[derive(Parser)]
#[command(name = "floralbot", version, about = "Identify flowers in photos")]
struct Cli {
    /// Increase log verbosity (info by default, -v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (default).
    Serve(ServeArgs),
    /// Analyze a single photo and print the report.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Clone)]
struct TransportArgs {
    /// Blob service host; blobs go to `<account>.<host>`.
    #[arg(long, env = "STORAGE_HOST", default_value = DEFAULT_STORAGE_HOST)]
    storage_host: String,

    /// Full blob service base URL, overriding the account host.
    #[arg(long, env = "STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// Deadline for each storage and vision request.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,
}

impl TransportArgs {
    fn settings(&self) -> anyhow::Result<PipelineSettings> {
        let storage =
            StorageEndpoint::from_settings(&self.storage_host, self.storage_endpoint.as_deref())?;
        Ok(PipelineSettings {
            storage,
            deadline: self.request_timeout_secs.map(Duration::from_secs),
        })
    }
}

#[derive(Args, Clone)]
struct ServeArgs {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Directory served under `/static`.
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    #[command(flatten)]
    transport: TransportArgs,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Photo to analyze.
    #[arg(long, required_unless_present = "camera", conflicts_with = "camera")]
    file: Option<PathBuf>,

    /// Frame file kept fresh by a capture daemon; one snapshot is taken.
    #[arg(long)]
    camera: Option<PathBuf>,

    /// Fetch credentials from a running server instead of the environment.
    #[arg(long)]
    config_url: Option<String>,

    /// Print JSON instead of the text report.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    transport: TransportArgs,
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("floralbot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let env_report = EnvReport::from_lookup(env_lookup);
    env_report.log();

    let settings = args.transport.settings()?;
    let client = http_client()?;
    let pipeline = EnvCredentials
        .credentials()
        .await
        .map(|creds| Pipeline::from_settings(creds, client, &settings));
    if let Err(e) = &pipeline {
        error!("{e}");
    }

    let state = Arc::new(AppState {
        pipeline,
        env_report,
    });
    let app = server::router(state, &args.static_dir);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("binding port {}", args.port))?;

    info!("FloralBot server running on port {}", args.port);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn acquire(args: &AnalyzeArgs) -> Result<ImageAsset, PipelineError> {
    match (&args.file, &args.camera) {
        (Some(path), _) => capture_from_file(path),
        (None, Some(frame)) => {
            let mut camera = Camera::new(StillFrameDevice::new(frame));
            camera.toggle()?;
            camera.capture()
        }
        (None, None) => Err(PipelineError::Decode("no image given".to_string())),
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let settings = args.transport.settings()?;
    let client = http_client()?;

    let creds = match &args.config_url {
        Some(url) => RemoteCredentials::new(client.clone(), url).credentials().await,
        None => EnvCredentials.credentials().await,
    }?;
    let pipeline = Pipeline::from_settings(creds, client, &settings);

    let result = match acquire(&args) {
        Ok(asset) => pipeline.run(asset).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) if args.json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::SUCCESS)
        }
        Ok(outcome) => {
            print!("{}", outcome.text());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            eprintln!("error: {}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Default filter when `RUST_LOG` is unset.
fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(cli.verbose)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Some(Command::Serve(args)) => serve(args).await.map(|()| ExitCode::SUCCESS),
        Some(Command::Analyze(args)) => analyze(args).await,
        None => serve(cli.serve).await.map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
