// ABOUTME: Main entry point for the ordo console bot
// ABOUTME: Parses CLI args, loads config, initializes logging and metrics, runs the console session

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ordo::config::{Config, LogFormat, LoggingConfig, ThrottleBackend};
use ordo::console::{ConsolePlatform, ConsoleSession};
use ordo::{commands, paths};
use ordo_core::throttle::{MemoryThrottleStore, SqliteThrottleStore};
use ordo_core::{Client, ThrottleStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::Notify;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

#[derive(Parser, Debug)]
#[command(name = "ordo")]
#[command(version, about = "Chat-bot runtime with ordered listeners, modules and gated commands", long_about = None)]
struct Cli {
    /// Path to config.toml (overrides ORDO_CONFIG_PATH and the default search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an interactive console session (default)
    Run,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC! ordo crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;

    let _log_guard = init_logging(&config.logging)?;

    tracing::info!(
        prefixes = ?config.bot.prefix,
        mention_prefix = config.bot.mention_prefix,
        elevated = config.bot.elevated.len(),
        throttle_backend = ?config.throttle.backend,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!("Configuration OK");
            println!("  prefixes: {}", config.bot.prefix.join(", "));
            println!("  mention prefix: {}", config.bot.mention_prefix);
            println!("  elevated users: {}", config.bot.elevated.len());
            println!("  throttle backend: {:?}", config.throttle.backend);
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

/// Terminal logs go to stderr so they never interleave with bot replies on stdout
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let terminal_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    match config.format {
        LogFormat::Pretty => layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(terminal_filter)
                .boxed(),
        ),
        LogFormat::Json => layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(terminal_filter)
                .boxed(),
        ),
    }

    let guard = if config.file {
        let dir = paths::log_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, "ordo.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"))
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry().with(layers).init();

    if config.file {
        tracing::info!(path = %paths::log_dir().display(), "File logging enabled");
    }
    Ok(guard)
}

fn throttle_store(config: &Config) -> Result<Arc<dyn ThrottleStore>> {
    match config.throttle.backend {
        ThrottleBackend::Memory => Ok(Arc::new(MemoryThrottleStore::new())),
        ThrottleBackend::Sqlite => {
            let path = config.throttle.db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tracing::info!(path = %path.display(), "Opening SQLite throttle store");
            Ok(Arc::new(SqliteThrottleStore::open(&path)?))
        }
    }
}

async fn run(config: Config) -> Result<()> {
    if let Some(addr) = config.metrics.socket_addr()? {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        tracing::info!(%addr, "Prometheus metrics endpoint listening");
    }

    let platform = Arc::new(ConsolePlatform::new());
    let client = Client::builder(platform.clone())
        .config(config.bot.clone())
        .event_source(platform.clone())
        .throttle_store(throttle_store(&config)?)
        .build()?;

    let shutdown = Arc::new(Notify::new());
    commands::register_defaults(&client, shutdown.clone())?;

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.notify_one();
        }
    });

    client.connect().await?;
    tracing::info!(
        user = %config.console.user_id,
        commands = client.commands().len(),
        "Console session started"
    );

    let session = ConsoleSession::new(platform, &config.console);
    let delivered = session
        .run(BufReader::new(tokio::io::stdin()), shutdown)
        .await?;

    tracing::info!(delivered, "Console session ended");
    client.disconnect().await?;
    Ok(())
}
