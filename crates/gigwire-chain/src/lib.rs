//! Gigwire Chain - thin abstraction over the settlement chain
//!
//! Everything the marketplace needs from the chain fits behind one trait:
//! submit a signed transaction, await confirmation, read the token-balance
//! deltas of a confirmed transaction, pay out from the escrow wallet, and
//! derive associated token accounts. Swapping networks touches only this
//! crate.

pub mod mock;
pub mod solana;

use async_trait::async_trait;

use gigwire_types::Result;

pub use mock::MockChainAdapter;
pub use solana::{SolanaChainAdapter, SolanaConfig};

/// Net change of one token account within a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDelta {
    /// Owner of the token account
    pub owner: String,
    /// Token mint
    pub mint: String,
    /// Post-balance minus pre-balance, in atomic units
    pub delta: i128,
}

/// A confirmed transaction reduced to its token movements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransfer {
    pub signature: String,
    pub slot: u64,
    pub deltas: Vec<TokenDelta>,
}

impl ConfirmedTransfer {
    /// Atomic units received by `owner` for `mint` in this transaction
    pub fn received_by(&self, owner: &str, mint: &str) -> i128 {
        self.deltas
            .iter()
            .filter(|d| d.owner == owner && d.mint == mint)
            .map(|d| d.delta)
            .sum()
    }
}

/// One leg of a payout transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    /// Recipient wallet (owner address, not token account)
    pub recipient: String,
    pub amount_atomic: u64,
}

/// Abstraction over the settlement chain.
///
/// Chain calls are long-running (seconds); callers must not hold
/// state-machine locks across them.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Submit a fully-signed serialized transaction; returns its signature.
    async fn submit_raw(&self, tx_bytes: &[u8]) -> Result<String>;

    /// Await confirmation of a submitted transaction, with bounded retries.
    async fn confirm(&self, signature: &str) -> Result<()>;

    /// Fetch a confirmed transaction and reduce it to token-balance deltas.
    async fn get_confirmed(&self, signature: &str) -> Result<ConfirmedTransfer>;

    /// Build, sign, and submit one transaction that pays every leg from
    /// the escrow wallet, creating missing recipient token accounts.
    /// Returns the confirmed signature.
    async fn send_payout(&self, payouts: &[Payout]) -> Result<String>;

    /// Associated token account of `owner` for the configured mint.
    fn token_account_for(&self, owner: &str) -> Result<String>;
}
