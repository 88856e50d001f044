#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use recolecta_core::config;
use recolecta_core::notify::{LogNotifier, Notifier};
use recolecta_core::store;
use recolecta_server::api::{AppState, build_router};
use recolecta_server::notifier::WebhookNotifier;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "recolectad: pickup-request pool and assignment server",
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "recolecta.toml")]
    config: PathBuf,

    /// Override the bind address from the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Override the SQLite database path from the config file.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("RECOLECTA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "recolecta=debug,info"
        } else {
            "recolecta=info,warn"
        })
    });

    let format = env::var("RECOLECTA_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    if format.as_str() == "json" {
        registry.with(fmt::layer().json().with_ansi(false)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = config::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(db) = cli.db {
        config.store.path = db;
    }

    // Open once up front so migrations run before we accept traffic.
    store::open(&config.store.path)
        .with_context(|| format!("open store at {}", config.store.path.display()))?;

    let notifier: Arc<dyn Notifier> = match config.notify.webhook_url.clone() {
        Some(url) => {
            info!(webhook = %url, "assignment notices go to webhook");
            Arc::new(WebhookNotifier::new(
                url,
                Duration::from_secs(config.notify.timeout_secs),
            ))
        }
        None => {
            info!("no webhook configured; assignment notices go to the log");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::new(config.store.path.clone(), notifier);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        db = %config.store.path.display(),
        "recolectad listening"
    );

    axum::serve(listener, router).await.context("serve")?;
    Ok(())
}
