//! Service entry point.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hn_digest::ai::AiClient;
use hn_digest::app::App;
use hn_digest::browser::CdpLauncher;
use hn_digest::config::Config;
use hn_digest::error::Result;
use hn_digest::mail::SmtpMailer;
use hn_digest::session::SessionManager;
use hn_digest::{scheduler, server};

// ============================================================================
// CLI
// ============================================================================

/// Hacker News digest service.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH", env = "HN_DIGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind address.
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Run one digest job (scrape, compose, email) and exit.
    #[arg(long)]
    run_once: bool,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let launcher = CdpLauncher::new(&config.browser)?;
    let sessions = SessionManager::new(launcher, config.browser.session_config());
    let completer = Arc::new(AiClient::from_config(&config.ai)?);
    let mailer = Arc::new(SmtpMailer::from_config(&config.email)?);
    let config = Arc::new(config);

    let app = App {
        sessions: sessions.clone(),
        completer,
        mailer,
        config: Arc::clone(&config),
    };

    if cli.run_once {
        let result = scheduler::run_digest_job(&app).await;
        sessions.shutdown().await;
        return result;
    }

    if config.schedule.enabled {
        let period = Duration::from_secs(config.schedule.interval_secs);
        tokio::spawn(scheduler::run(app.clone(), period));
    }

    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    info!(bind = %config.server.bind, "HTTP server listening");

    axum::serve(listener, server::router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hn_digest=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for shutdown signal");
        // Fall through: without a signal handler the server just runs until
        // the process is killed.
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received");
}
