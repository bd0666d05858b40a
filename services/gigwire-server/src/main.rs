//! Gigwire marketplace server
//!
//! Brokers paid work between autonomous agents: USDC-bountied jobs with
//! escrow or x402 paywall settlement on Solana.
//!
//! # Usage
//!
//! ```bash
//! # Start with environment configuration
//! ESCROW_WALLET=... ESCROW_PRIVATE_KEY=... USDC_MINT=... gigwire-server
//!
//! # Start with a config file
//! gigwire-server --config /etc/gigwire/config.toml
//!
//! # Local demo without on-chain verification
//! gigwire-server --demo-mode
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gigwire_api::{create_router, ApiConfig, AppState, PaywallSettings, RateLimiter};
use gigwire_chain::{ChainAdapter, SolanaChainAdapter, SolanaConfig};
use gigwire_escrow::{EscrowCoordinator, EscrowLedger, EscrowSettings, ExpirySweeper};
use gigwire_service::{bus::EventBus, JobService};
use gigwire_store::MemoryJobStore;

use crate::config::ServerConfig;

/// Gigwire - bot-to-bot job marketplace server
#[derive(Parser, Debug)]
#[command(name = "gigwire-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "GIGWIRE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GIGWIRE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "GIGWIRE_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Allow job activation without on-chain deposit verification.
    /// Never enable in production.
    #[arg(long)]
    demo_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if args.demo_mode {
        server_config.chain.demo_mode = true;
    }
    server_config.logging.level = args.log_level;
    server_config.logging.format = args.log_format;

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Gigwire server"
    );

    validate_config(&server_config)?;

    // Chain adapter; demo mode may substitute an ephemeral escrow identity
    let (chain, mint, escrow_wallet) = init_chain(&server_config.chain)?;

    // Core wiring: store -> service -> ledger -> coordinator
    let bus = EventBus::new(server_config.jobs.event_buffer);
    let jobs = Arc::new(JobService::new(
        Arc::new(MemoryJobStore::new()),
        bus,
        chrono::Duration::hours(server_config.jobs.expiry_hours),
    ));
    let escrow = Arc::new(EscrowCoordinator::new(
        chain.clone(),
        Arc::new(EscrowLedger::new()),
        jobs.clone(),
        EscrowSettings {
            escrow_wallet,
            mint,
            platform_wallet: server_config.chain.platform_wallet.clone(),
            fee_basis_points: server_config.chain.fee_basis_points(),
        },
    ));

    let limiter = RateLimiter::new(
        server_config.api.rate_limit,
        Duration::from_secs(server_config.api.rate_limit_window_secs),
    );

    // Background tasks: expiry sweep + rate-limit bucket sweep
    let sweeper = ExpirySweeper::new(
        escrow.clone(),
        Duration::from_secs(server_config.jobs.sweep_interval_secs),
    );
    let sweeper_handle = sweeper.spawn();
    let limiter_handle = limiter.spawn_cleanup(Duration::from_secs(
        server_config.api.rate_limit_window_secs * 2,
    ));

    let state = Arc::new(
        AppState::new(
            jobs,
            escrow,
            chain,
            limiter,
            PaywallSettings {
                network: server_config.chain.network.clone(),
            },
        )
        .with_client_ip_headers(server_config.api.client_ip_headers.clone()),
    );

    let api_config = ApiConfig {
        enable_cors: server_config.api.enable_cors,
        enable_compression: server_config.api.enable_compression,
        enable_tracing: server_config.api.enable_tracing,
        demo_mode: server_config.chain.demo_mode,
    };
    let app = create_router(state, api_config);

    if server_config.metrics.enabled {
        start_metrics_server(&server_config.metrics)?;
    }

    let addr = server_config.server.socket_addr()?;
    tracing::info!(
        host = %server_config.server.host,
        port = server_config.server.port,
        network = %server_config.chain.network,
        demo_mode = server_config.chain.demo_mode,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    sweeper_handle.abort();
    limiter_handle.abort();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
    Ok(())
}

/// Reject configurations that cannot settle payments
fn validate_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.chain.demo_mode {
        tracing::warn!(
            "DEMO MODE is enabled: jobs can be activated without on-chain verification. \
             This must be off in production."
        );
        return Ok(());
    }

    if config.chain.usdc_mint.is_empty() {
        anyhow::bail!("USDC_MINT must be set");
    }
    if config.chain.escrow_wallet.is_empty() {
        anyhow::bail!("ESCROW_WALLET must be set");
    }
    if config.chain.escrow_private_key.is_none() {
        anyhow::bail!("ESCROW_PRIVATE_KEY must be set for escrow releases");
    }
    if config.chain.platform_fee_percent > 0.0 && config.chain.platform_wallet.is_none() {
        tracing::warn!("PLATFORM_FEE_PERCENT is set without PLATFORM_WALLET; no fee will be taken");
    }
    Ok(())
}

/// USDC mint on devnet, used when demo mode has no mint configured
const DEVNET_USDC_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

/// Build the Solana adapter from configuration, returning the resolved
/// mint and escrow wallet
fn init_chain(
    chain: &config::ChainSettings,
) -> anyhow::Result<(Arc<dyn ChainAdapter>, String, String)> {
    let mut mint = chain.usdc_mint.clone();
    let mut escrow_wallet = chain.escrow_wallet.clone();
    let mut keypair = chain
        .escrow_private_key
        .as_deref()
        .map(SolanaChainAdapter::keypair_from_base58)
        .transpose()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if chain.demo_mode {
        if mint.is_empty() {
            mint = DEVNET_USDC_MINT.to_string();
        }
        if escrow_wallet.is_empty() {
            let ephemeral = solana_sdk::signature::Keypair::new();
            escrow_wallet = solana_sdk::signer::Signer::pubkey(&ephemeral).to_string();
            keypair = Some(ephemeral);
            tracing::warn!(%escrow_wallet, "demo mode: using an ephemeral escrow identity");
        }
    }

    let adapter = SolanaChainAdapter::new(
        SolanaConfig {
            rpc_url: chain.rpc_url.clone(),
            mint: mint.clone(),
            escrow_wallet: escrow_wallet.clone(),
            ..SolanaConfig::default()
        },
        keypair,
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing::info!(rpc_url = %chain.rpc_url, %mint, "Chain adapter ready");
    Ok((Arc::new(adapter), mint, escrow_wallet))
}

/// Start the Prometheus metrics exporter
fn start_metrics_server(config: &config::MetricsConfig) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(port = config.port, "Metrics exporter listening");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then allow in-flight requests to finish
async fn shutdown_signal(timeout: Duration) {
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
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let args = Args::parse_from(["gigwire-server", "--port", "8080", "--demo-mode"]);
        assert_eq!(args.port, Some(8080));
        assert!(args.demo_mode);
    }

    #[test]
    fn production_config_requires_escrow_key() {
        let config = ServerConfig::default();
        assert!(validate_config(&config).is_err());

        let mut demo = ServerConfig::default();
        demo.chain.demo_mode = true;
        assert!(validate_config(&demo).is_ok());
    }
}
