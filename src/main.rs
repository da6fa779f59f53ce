use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mercado::billing::{BillingApi, BillingClient};
use mercado::config::MercadoConfig;
use mercado::http::{router, HttpServer};
use mercado::ratelimit::{RateLimitPolicies, RateLimiter, Sweeper};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Mercado Productivo API gateway
#[derive(Debug, Parser)]
#[command(name = "mercado", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "MERCADO_CONFIG")]
    config: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting Mercado");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = MercadoConfig::load(args.config.as_deref())?;
    info!(http_addr = %config.server.http_addr, billing = ?config.billing, "Configuration loaded");

    let policies = match &config.rate_limiting.policies_path {
        Some(path) => RateLimitPolicies::from_file(path)?,
        None => RateLimitPolicies::default(),
    };
    info!(policies = policies.len(), "Rate limit policies loaded");

    let rate_limiter = Arc::new(RateLimiter::new());
    let sweeper = Sweeper::start(rate_limiter.clone(), config.rate_limiting.sweep_interval());

    let billing: Arc<dyn BillingApi> = Arc::new(BillingClient::new(&config.billing)?);
    info!(base_url = %config.billing.base_url, "Billing client initialized");

    let app = router(billing, rate_limiter, &policies)?;
    let server = HttpServer::bind(config.server.http_addr, app).await?;

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.stop().await;
    info!("Mercado stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
