//! tailcast entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tailcast_server::{ServerConfig, TailServer};
use tailcast_tail::{Patterns, PositionStore};

#[derive(Parser)]
#[command(
    name = "tailcast",
    version,
    about = "Follow a growing log file from the browser",
    long_about = "tailcast serves a log file over HTTP: a bootstrap page shows the \
current filtered content and a WebSocket endpoint pushes new lines as they are \
appended. Reconnecting viewers resume from their last position."
)]
struct Cli {
    /// File to publish
    #[arg(long)]
    filename: PathBuf,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Regex of characters to strip from raw content before
    /// line-splitting, e.g. '^[^{]*' to drop anything before the first '{'
    #[arg(long)]
    skip: Option<String>,

    /// Regex selecting which lines to push
    #[arg(long, default_value = ".*")]
    grep: String,

    /// Log level: debug, info, warning or error
    #[arg(long, default_value = "info")]
    loglevel: String,

    /// Advertise wss:// in the bootstrap page regardless of the inbound
    /// scheme (useful behind a TLS-terminating reverse proxy)
    #[arg(long)]
    force_tls: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.loglevel.as_str() {
        "debug" => "debug",
        "info" => "info",
        "warning" => "warn",
        "error" => "error",
        other => bail!("unknown log level {other:?} (expected debug, info, warning or error)"),
    };

    // Initialize structured logging; RUST_LOG overrides the flag.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let patterns = Patterns::new(cli.skip.as_deref(), Some(&cli.grep))
        .context("invalid skip/grep pattern")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        file = %cli.filename.display(),
        skip = cli.skip.as_deref().unwrap_or(""),
        grep = %cli.grep,
        force_tls = cli.force_tls,
        "tailcast started"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, Arc::new(patterns)))?;

    tracing::info!("tailcast shut down cleanly");
    Ok(())
}

async fn run(cli: Cli, patterns: Arc<Patterns>) -> anyhow::Result<()> {
    let store = Arc::new(PositionStore::new());
    let config = ServerConfig {
        port: cli.port,
        force_tls: cli.force_tls,
    };
    let server = TailServer::new(config, &cli.filename, patterns, store);

    tokio::select! {
        result = server.run() => {
            result.context("server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            server.shutdown();
        }
    }

    Ok(())
}
