//! tg-roster: a web service ranking the active usernames of a Telegram group.
//!
//! This is the application entry point. It loads configuration from TOML,
//! initializes tracing, opens the session provider, builds the Axum router
//! and serves it until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tg_roster::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use tg_roster::session::ArchiveSession;
use tg_roster::{create_router, AppState, ScrapeService};

/// tg-roster: rank the active usernames of a Telegram group
#[derive(Parser, Debug)]
#[command(name = "tg-roster", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "tg_roster=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration decides the log format, so it loads before tracing starts
    let config = AppConfig::load(&args.config)?;

    // Log filter priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(path = %args.config, "Loaded configuration");
    tracing::info!(
        default_message_limit = config.scan.default_message_limit,
        max_message_limit = config.scan.max_message_limit,
        cooldown_seconds = config.scan.cooldown_seconds,
        "Scan limits configured"
    );

    let provider = Arc::new(ArchiveSession::new(config.archive.dir.clone()));
    tracing::info!(dir = %provider.dir().display(), "Initialized archive session provider");

    let scraper = ScrapeService::new(provider, &config.scan);
    let state = AppState::new(scraper);
    let app = create_router(state);

    tg_roster::http::start_server(app, &config.http).await?;

    Ok(())
}
