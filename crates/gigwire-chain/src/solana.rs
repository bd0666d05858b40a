//! Solana implementation of the chain adapter
//!
//! Uses the nonblocking RPC client. Token movements are read from the
//! pre/post token balances of confirmed transactions; payouts are SPL
//! transfers signed by the escrow keypair, with idempotent associated
//! token account creation for recipients.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use solana_transaction_status::UiTransactionEncoding;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use gigwire_types::{GigwireError, Result};

use crate::{ChainAdapter, ConfirmedTransfer, Payout, TokenDelta};

/// Connection settings for the Solana adapter
#[derive(Debug, Clone)]
pub struct SolanaConfig {
    /// RPC endpoint
    pub rpc_url: String,
    /// Asset mint (USDC)
    pub mint: String,
    /// System escrow wallet (owner address)
    pub escrow_wallet: String,
    /// Confirmation poll attempts
    pub confirm_attempts: u32,
    /// Delay between confirmation polls
    pub confirm_interval: Duration,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            mint: String::new(),
            escrow_wallet: String::new(),
            confirm_attempts: 30,
            confirm_interval: Duration::from_secs(2),
        }
    }
}

/// Chain adapter backed by a Solana RPC node
pub struct SolanaChainAdapter {
    rpc: RpcClient,
    mint: Pubkey,
    escrow_wallet: Pubkey,
    /// Required for payouts; absent in deposit-only deployments
    escrow_keypair: Option<Arc<Keypair>>,
    confirm_attempts: u32,
    confirm_interval: Duration,
}

impl SolanaChainAdapter {
    pub fn new(config: SolanaConfig, escrow_keypair: Option<Keypair>) -> Result<Self> {
        let mint = parse_pubkey("mint", &config.mint)?;
        let escrow_wallet = parse_pubkey("escrowWallet", &config.escrow_wallet)?;

        if let Some(ref keypair) = escrow_keypair {
            if keypair.pubkey() != escrow_wallet {
                return Err(GigwireError::validation(
                    "escrowPrivateKey",
                    "signing key does not match the escrow wallet",
                ));
            }
        }

        Ok(Self {
            rpc: RpcClient::new_with_commitment(
                config.rpc_url,
                CommitmentConfig::confirmed(),
            ),
            mint,
            escrow_wallet,
            escrow_keypair: escrow_keypair.map(Arc::new),
            confirm_attempts: config.confirm_attempts,
            confirm_interval: config.confirm_interval,
        })
    }

    /// Parse a base58-encoded 64-byte signing key
    pub fn keypair_from_base58(encoded: &str) -> Result<Keypair> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| GigwireError::validation("escrowPrivateKey", "malformed signing key"))?;
        Keypair::from_bytes(&bytes)
            .map_err(|_| GigwireError::validation("escrowPrivateKey", "malformed signing key"))
    }

    fn signing_key(&self) -> Result<&Arc<Keypair>> {
        self.escrow_keypair
            .as_ref()
            .ok_or_else(|| GigwireError::internal("escrow signing key not configured"))
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).map_err(|_| GigwireError::validation(field, "malformed chain address"))
}

fn parse_signature(value: &str) -> Result<Signature> {
    Signature::from_str(value)
        .map_err(|_| GigwireError::payment_invalid("malformed transaction signature"))
}

#[async_trait]
impl ChainAdapter for SolanaChainAdapter {
    async fn submit_raw(&self, tx_bytes: &[u8]) -> Result<String> {
        // VersionedTransaction parses both legacy and v0 wire formats
        let tx: VersionedTransaction = bincode::deserialize(tx_bytes)
            .map_err(|_| GigwireError::payment_invalid("malformed serialized transaction"))?;

        let signature = self
            .rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| GigwireError::payment_backend(format!("submit failed: {e}")))?;

        debug!(%signature, "transaction submitted");
        Ok(signature.to_string())
    }

    async fn confirm(&self, signature: &str) -> Result<()> {
        let sig = parse_signature(signature)?;

        for attempt in 1..=self.confirm_attempts {
            let statuses = self
                .rpc
                .get_signature_statuses(&[sig])
                .await
                .map_err(|e| GigwireError::payment_backend(format!("status fetch failed: {e}")))?;

            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(GigwireError::payment_backend(format!(
                        "transaction failed on chain: {err}"
                    )));
                }
                if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    debug!(%sig, attempt, "transaction confirmed");
                    return Ok(());
                }
            }
            sleep(self.confirm_interval).await;
        }

        Err(GigwireError::payment_backend(
            "timed out waiting for confirmation",
        ))
    }

    async fn get_confirmed(&self, signature: &str) -> Result<ConfirmedTransfer> {
        let sig = parse_signature(signature)?;

        let tx = self
            .rpc
            .get_transaction_with_config(
                &sig,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::Json),
                    commitment: Some(CommitmentConfig::confirmed()),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await
            .map_err(|e| GigwireError::payment_backend(format!("transaction fetch failed: {e}")))?;

        let meta = tx
            .transaction
            .meta
            .ok_or_else(|| GigwireError::payment_backend("transaction meta unavailable"))?;

        if let Some(err) = &meta.err {
            return Err(GigwireError::payment_invalid(format!(
                "transaction failed on chain: {err}"
            )));
        }

        let pre: Vec<_> = Option::from(meta.pre_token_balances).unwrap_or_default();
        let post: Vec<_> = Option::from(meta.post_token_balances).unwrap_or_default();

        // Join pre/post by account index; accounts absent pre-transaction
        // (freshly created ATAs) have an implicit zero pre-balance.
        let mut deltas = Vec::with_capacity(post.len());
        for balance in &post {
            let owner: Option<String> = Option::from(balance.owner.clone());
            let Some(owner) = owner else { continue };

            let post_amount: i128 = balance
                .ui_token_amount
                .amount
                .parse()
                .unwrap_or_default();
            let pre_amount: i128 = pre
                .iter()
                .find(|p| p.account_index == balance.account_index)
                .and_then(|p| p.ui_token_amount.amount.parse().ok())
                .unwrap_or_default();

            deltas.push(TokenDelta {
                owner,
                mint: balance.mint.clone(),
                delta: post_amount - pre_amount,
            });
        }

        Ok(ConfirmedTransfer {
            signature: signature.to_string(),
            slot: tx.slot,
            deltas,
        })
    }

    async fn send_payout(&self, payouts: &[Payout]) -> Result<String> {
        if payouts.is_empty() {
            return Err(GigwireError::internal("payout with no legs"));
        }
        let keypair = self.signing_key()?.clone();
        let escrow_ata =
            spl_associated_token_account::get_associated_token_address(&self.escrow_wallet, &self.mint);

        let mut instructions: Vec<Instruction> = Vec::with_capacity(payouts.len() * 2);
        for payout in payouts {
            let recipient = parse_pubkey("recipient", &payout.recipient)?;
            let recipient_ata =
                spl_associated_token_account::get_associated_token_address(&recipient, &self.mint);

            instructions.push(
                spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                    &self.escrow_wallet,
                    &recipient,
                    &self.mint,
                    &spl_token::id(),
                ),
            );
            instructions.push(
                spl_token::instruction::transfer(
                    &spl_token::id(),
                    &escrow_ata,
                    &recipient_ata,
                    &self.escrow_wallet,
                    &[],
                    payout.amount_atomic,
                )
                .map_err(|e| GigwireError::payment_backend(format!("transfer build failed: {e}")))?,
            );
        }

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| GigwireError::payment_backend(format!("blockhash fetch failed: {e}")))?;

        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.escrow_wallet),
            &[keypair.as_ref()],
            blockhash,
        );

        let signature = self
            .rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| GigwireError::payment_backend(format!("payout submit failed: {e}")))?
            .to_string();

        info!(%signature, legs = payouts.len(), "payout submitted");

        match self.confirm(&signature).await {
            Ok(()) => Ok(signature),
            Err(e) => {
                warn!(%signature, error = %e, "payout not confirmed");
                Err(e)
            }
        }
    }

    fn token_account_for(&self, owner: &str) -> Result<String> {
        let owner = parse_pubkey("owner", owner)?;
        Ok(
            spl_associated_token_account::get_associated_token_address(&owner, &self.mint)
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SolanaConfig {
        SolanaConfig {
            mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            escrow_wallet: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            ..SolanaConfig::default()
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        let bad = SolanaConfig {
            mint: "not-a-pubkey".to_string(),
            ..config()
        };
        assert!(SolanaChainAdapter::new(bad, None).is_err());
    }

    #[test]
    fn derives_token_accounts() {
        let adapter = SolanaChainAdapter::new(config(), None).unwrap();
        let ata = adapter
            .token_account_for("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin")
            .unwrap();
        assert!(Pubkey::from_str(&ata).is_ok());
        assert!(adapter.token_account_for("bogus").is_err());
    }

    #[test]
    fn payout_requires_signing_key() {
        let adapter = SolanaChainAdapter::new(config(), None).unwrap();
        assert!(adapter.signing_key().is_err());
    }

    #[test]
    fn rejects_mismatched_signing_key() {
        let keypair = Keypair::new();
        // Random keypair will not match the fixed escrow wallet
        assert!(SolanaChainAdapter::new(config(), Some(keypair)).is_err());
    }

    #[test]
    fn keypair_roundtrips_base58() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let parsed = SolanaChainAdapter::keypair_from_base58(&encoded).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
        assert!(SolanaChainAdapter::keypair_from_base58("zz!!").is_err());
    }
}
