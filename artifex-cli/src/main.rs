//! Artifex CLI: serve the price model and run it from the terminal.

mod commands;

use artifex_core::config::{AppConfig, ConfigOverrides, LoggingConfig, load_config};
use clap::Parser;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Artifex: art auction price prediction
#[derive(Parser, Debug)]
#[command(name = "artifex", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory (overrides ml.artifacts.dir)
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,

    /// Market reference JSON (overrides ml.market.reference_path)
    #[arg(long, global = true)]
    market: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP prediction server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Predict the price of one listing (JSON file)
    Predict {
        /// Listing JSON file
        listing: PathBuf,
        /// Optional image of the work
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Compute colorfulness, SVD entropy and aspect ratio for an image
    AnalyzeImage {
        /// Image file
        path: PathBuf,
    },
    /// Derive schema-ordered feature rows for a JSONL file of listings
    Featurize {
        /// One listing JSON object per line
        records: PathBuf,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load and cross-check the artifact set, then report
    Validate,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default .artifex/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

/// Install the stderr layer and, when enabled, the JSON file layer.
fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error".to_string(),
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = if verbose == 0 && !quiet {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter))
    } else {
        EnvFilter::new(&filter)
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    let log_dir = if logging.json_file {
        logging.resolved_log_dir()
    } else {
        None
    };
    let (json_layer, guard) = match log_dir {
        Some(log_dir) if std::fs::create_dir_all(&log_dir).is_ok() => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, "artifex.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let mut overrides = ConfigOverrides {
        artifact_dir: cli.artifacts.clone(),
        market_reference: cli.market.clone(),
        ..Default::default()
    };
    if let Commands::Serve { host, port } = &cli.command {
        overrides.host = host.clone();
        overrides.port = *port;
    }

    let config = load_config(Some(&workspace), cli.config.as_deref(), &overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"));
    let logging = config
        .as_ref()
        .map(|c: &AppConfig| c.logging.clone())
        .unwrap_or_default();
    let _guard = init_tracing(cli.verbose, cli.quiet, &logging);

    let ctx = commands::CommandContext { workspace, config };
    commands::handle_command(cli.command, ctx).await
}
