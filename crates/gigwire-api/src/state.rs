//! Application state shared across handlers

use std::sync::Arc;

use gigwire_chain::ChainAdapter;
use gigwire_escrow::EscrowCoordinator;
use gigwire_service::JobService;

use crate::rate_limit::RateLimiter;

/// Paywall-facing settlement parameters
#[derive(Debug, Clone)]
pub struct PaywallSettings {
    /// Chain network label advertised in challenges (e.g. `solana-devnet`)
    pub network: String,
}

/// Proxy headers consulted for the client address when none are
/// configured, most trusted first
pub fn default_client_ip_headers() -> Vec<String> {
    vec!["x-real-ip".to_string(), "x-forwarded-for".to_string()]
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Job lifecycle state machine
    pub jobs: Arc<JobService>,
    /// Escrow verification and settlement
    pub escrow: Arc<EscrowCoordinator>,
    /// Chain access for paywall submissions
    pub chain: Arc<dyn ChainAdapter>,
    /// Per-IP request limiter
    pub limiter: RateLimiter,
    pub paywall: PaywallSettings,
    /// Proxy headers the deployment trusts for client addressing, in
    /// precedence order; rate limiting keys off the first match
    pub client_ip_headers: Vec<String>,
}

impl AppState {
    pub fn new(
        jobs: Arc<JobService>,
        escrow: Arc<EscrowCoordinator>,
        chain: Arc<dyn ChainAdapter>,
        limiter: RateLimiter,
        paywall: PaywallSettings,
    ) -> Self {
        Self {
            jobs,
            escrow,
            chain,
            limiter,
            paywall,
            client_ip_headers: default_client_ip_headers(),
        }
    }

    /// Override the trusted proxy header list (deployment-specific)
    pub fn with_client_ip_headers(mut self, headers: Vec<String>) -> Self {
        self.client_ip_headers = headers
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        self
    }
}
