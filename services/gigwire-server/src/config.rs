//! Server configuration
//!
//! Layered: config files, `GIGWIRE__`-prefixed environment variables,
//! then the well-known plain variables (`SOLANA_RPC_URL`, `USDC_MINT`,
//! `ESCROW_WALLET`, ...) recognized for operational compatibility, then
//! CLI flags on top.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Chain and settlement settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Network label advertised in x402 challenges
    #[serde(default = "default_network")]
    pub network: String,
    /// Asset mint address
    #[serde(default)]
    pub usdc_mint: String,
    /// System escrow wallet
    #[serde(default)]
    pub escrow_wallet: String,
    /// base58 signing key for escrow payouts
    #[serde(default, skip_serializing)]
    pub escrow_private_key: Option<String>,
    /// Fee recipient; no fee without it
    #[serde(default)]
    pub platform_wallet: Option<String>,
    /// Platform fee percentage, 0-100
    #[serde(default)]
    pub platform_fee_percent: f64,
    /// When true, the on-chain deposit check can be bypassed
    #[serde(default)]
    pub demo_mode: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            network: default_network(),
            usdc_mint: String::new(),
            escrow_wallet: String::new(),
            escrow_private_key: None,
            platform_wallet: None,
            platform_fee_percent: 0.0,
            demo_mode: false,
        }
    }
}

impl ChainSettings {
    /// Fee percentage as basis points for the atomic split math
    pub fn fee_basis_points(&self) -> u32 {
        (self.platform_fee_percent.clamp(0.0, 100.0) * 100.0).round() as u32
    }
}

/// Job lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Hours before an OPEN job may expire
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
    /// Expiry sweep interval
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Event bus buffer capacity
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            expiry_hours: default_expiry_hours(),
            sweep_interval_secs: default_sweep_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// API behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    #[serde(default = "default_true")]
    pub enable_compression: bool,
    #[serde(default = "default_true")]
    pub enable_tracing: bool,
    /// Requests allowed per client per window
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_secs: u64,
    /// Proxy headers trusted for client addressing, most trusted first
    #[serde(default = "default_client_ip_headers")]
    pub client_ip_headers: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enable_cors: true,
            enable_compression: true,
            enable_tracing: true,
            rate_limit: default_rate_limit(),
            rate_limit_window_secs: default_rate_window(),
            client_ip_headers: default_client_ip_headers(),
        }
    }
}

/// Admin endpoint gating (reporting endpoints live outside this service)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminSettings {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// =============================================================================
// Defaults
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_network() -> String {
    "solana-devnet".to_string()
}

fn default_expiry_hours() -> i64 {
    24
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    256
}

fn default_rate_limit() -> u32 {
    100
}

fn default_rate_window() -> u64 {
    60
}

fn default_client_ip_headers() -> Vec<String> {
    vec!["x-real-ip".to_string(), "x-forwarded-for".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Loading
// =============================================================================

impl ServerConfig {
    /// Load from files and environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("GIGWIRE")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: ServerConfig = builder.build()?.try_deserialize().unwrap_or_default();
        config.apply_plain_env();
        Ok(config)
    }

    /// Recognize the deployment's conventional unprefixed variables
    fn apply_plain_env(&mut self) {
        if let Ok(v) = std::env::var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("SOLANA_RPC_URL") {
            self.chain.rpc_url = v;
        }
        if let Ok(v) = std::env::var("SOLANA_NETWORK") {
            self.chain.network = v;
        }
        if let Ok(v) = std::env::var("USDC_MINT") {
            self.chain.usdc_mint = v;
        }
        if let Ok(v) = std::env::var("ESCROW_WALLET") {
            self.chain.escrow_wallet = v;
        }
        if let Ok(v) = std::env::var("ESCROW_PRIVATE_KEY") {
            self.chain.escrow_private_key = Some(v);
        }
        if let Ok(v) = std::env::var("PLATFORM_WALLET") {
            self.chain.platform_wallet = Some(v);
        }
        if let Ok(v) = std::env::var("PLATFORM_FEE_PERCENT") {
            if let Ok(percent) = v.parse() {
                self.chain.platform_fee_percent = percent;
            }
        }
        if let Ok(v) = std::env::var("DEMO_MODE") {
            self.chain.demo_mode = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("ADMIN_API_KEY") {
            self.admin.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("ADMIN_ALLOWED_IPS") {
            self.admin.allowed_ips = v.split(',').map(|s| s.trim().to_string()).collect();
        }
    }
}
