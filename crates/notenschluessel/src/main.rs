//! Notenschluessel - grading scale calculator backend
//!
//! Main entry point for the server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use notenschluessel_registry::{RateLimitConfig, SessionConfig};
use notenschluessel_server::{Server, ServerConfig};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Notenschluessel - grading scale calculator backend
#[derive(Parser, Debug)]
#[command(name = "notenschluessel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "NOTENSCHLUESSEL_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Production mode (marks session cookies Secure); also enabled by ENV=production
    #[arg(long)]
    pub production: bool,

    /// Result submissions allowed per minute and client address
    #[arg(long, default_value_t = 10)]
    pub rate_limit_rpm: u32,

    /// Submissions a client may burst before being limited
    #[arg(long, default_value_t = 20)]
    pub rate_limit_burst: u32,

    /// Hours a stored result stays available
    #[arg(long, default_value_t = 24)]
    pub session_ttl_hours: u64,

    /// Disable rate limiting
    #[arg(long)]
    pub no_rate_limit: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log as JSON lines instead of human-readable text
    #[arg(long)]
    pub log_json: bool,

    /// Also write JSON logs to a daily rotating file in this directory
    #[arg(long, env = "NOTENSCHLUESSEL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Print OK and exit (container health probe)
    #[arg(long)]
    pub health_check: bool,
}

impl Cli {
    fn is_production(&self) -> bool {
        self.production || std::env::var("ENV").is_ok_and(|v| v == "production")
    }

    fn server_config(&self) -> ServerConfig {
        let session = SessionConfig::new()
            .with_ttl(Duration::from_secs(self.session_ttl_hours.saturating_mul(3600)));
        let rate_limit = RateLimitConfig::new()
            .with_requests_per_minute(self.rate_limit_rpm)
            .with_burst(self.rate_limit_burst);

        ServerConfig::new()
            .with_bind_address(self.bind)
            .with_production(self.is_production())
            .with_rate_limiting(!self.no_rate_limit)
            .with_session(session)
            .with_rate_limit(rate_limit)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing(cli: &Cli) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = if cli.verbose {
        "notenschluessel=debug,notenschluessel_server=debug,notenschluessel_registry=debug,tower_http=debug,info"
    } else {
        "notenschluessel=info,notenschluessel_server=info,notenschluessel_registry=info,warn"
    };
    let console_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter))
    };

    let (console_text, console_json) = if cli.log_json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_filter(console_filter()),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(console_filter()),
            ),
            None,
        )
    };

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "notenschluessel.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "notenschluessel=debug,notenschluessel_server=debug,notenschluessel_registry=debug,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_text)
        .with(console_json)
        .with(file_layer)
        .init();

    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.health_check {
        println!("OK");
        return Ok(());
    }

    let _guard = init_tracing(&cli);
    let config = cli.server_config();

    info!(
        bind = %config.bind_address,
        production = config.production,
        rate_limiting = config.rate_limiting,
        "Starting notenschluessel"
    );

    let server = Server::new(config).context("Failed to initialize server")?;
    server
        .run_until(shutdown_signal())
        .await
        .context("Server exited with an error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
