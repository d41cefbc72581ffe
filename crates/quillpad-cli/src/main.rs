//! Quillpad CLI - sign in to the diary service and manage your profile.
//!
//! The session is persisted between runs through the configured token
//! backend, so `quillpad login` once and the other commands reuse it until
//! the token expires.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;
use quillpad_core::Config;

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "quillpad.log";

#[derive(Parser)]
#[command(name = "quillpad")]
#[command(about = "Sign in to Quillpad and manage your profile")]
#[command(version)]
struct Cli {
    /// API base URL (overrides config and environment)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Initialize the tracing subscriber for logging
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    let api_url = cli.api_url.unwrap_or_else(|| config.api_base_url());

    let log_dir = config.cache_dir().ok();
    let _guard = init_tracing(log_dir.as_deref());
    info!(api = %api_url, "Quillpad CLI starting");

    cli.command.execute(&mut config, &api_url).await
}
