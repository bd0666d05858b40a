//! In-memory chain adapter for tests
//!
//! Confirmed transfers are registered up front; submitted raw
//! transactions resolve to a registered signature carried in the payload;
//! payouts are recorded and assigned sequential signatures. Failure
//! injection covers the submit and payout paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use gigwire_types::{GigwireError, Result};

use crate::{ChainAdapter, ConfirmedTransfer, Payout, TokenDelta};

/// Programmable chain adapter
pub struct MockChainAdapter {
    mint: String,
    escrow_wallet: String,
    confirmed: RwLock<HashMap<String, ConfirmedTransfer>>,
    payouts: RwLock<Vec<Vec<Payout>>>,
    payout_seq: AtomicU64,
    fail_submit: AtomicBool,
    fail_payout: AtomicBool,
}

impl MockChainAdapter {
    pub fn new(mint: impl Into<String>, escrow_wallet: impl Into<String>) -> Self {
        Self {
            mint: mint.into(),
            escrow_wallet: escrow_wallet.into(),
            confirmed: RwLock::new(HashMap::new()),
            payouts: RwLock::new(Vec::new()),
            payout_seq: AtomicU64::new(0),
            fail_submit: AtomicBool::new(false),
            fail_payout: AtomicBool::new(false),
        }
    }

    /// Register an arbitrary confirmed transfer
    pub async fn register(&self, transfer: ConfirmedTransfer) {
        self.confirmed
            .write()
            .await
            .insert(transfer.signature.clone(), transfer);
    }

    /// Register a confirmed deposit of `amount` atoms into the escrow wallet
    pub async fn register_deposit(&self, signature: &str, sender: &str, amount: u64) {
        self.register(ConfirmedTransfer {
            signature: signature.to_string(),
            slot: 1,
            deltas: vec![
                TokenDelta {
                    owner: sender.to_string(),
                    mint: self.mint.clone(),
                    delta: -(amount as i128),
                },
                TokenDelta {
                    owner: self.escrow_wallet.clone(),
                    mint: self.mint.clone(),
                    delta: amount as i128,
                },
            ],
        })
        .await;
    }

    /// Register a confirmed payment of `amount` atoms to `recipient`
    pub async fn register_payment(&self, signature: &str, sender: &str, recipient: &str, amount: u64) {
        self.register(ConfirmedTransfer {
            signature: signature.to_string(),
            slot: 1,
            deltas: vec![
                TokenDelta {
                    owner: sender.to_string(),
                    mint: self.mint.clone(),
                    delta: -(amount as i128),
                },
                TokenDelta {
                    owner: recipient.to_string(),
                    mint: self.mint.clone(),
                    delta: amount as i128,
                },
            ],
        })
        .await;
    }

    /// Payout batches recorded so far
    pub async fn recorded_payouts(&self) -> Vec<Vec<Payout>> {
        self.payouts.read().await.clone()
    }

    pub fn fail_next_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_payout(&self, fail: bool) {
        self.fail_payout.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    async fn submit_raw(&self, tx_bytes: &[u8]) -> Result<String> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(GigwireError::payment_backend("submit failed (injected)"));
        }
        // The mock wire format is the registered signature itself
        let signature = String::from_utf8(tx_bytes.to_vec())
            .map_err(|_| GigwireError::payment_invalid("malformed serialized transaction"))?;
        if !self.confirmed.read().await.contains_key(&signature) {
            return Err(GigwireError::payment_backend("submit failed: unknown transaction"));
        }
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> Result<()> {
        if self.confirmed.read().await.contains_key(signature) {
            Ok(())
        } else {
            Err(GigwireError::payment_backend(
                "timed out waiting for confirmation",
            ))
        }
    }

    async fn get_confirmed(&self, signature: &str) -> Result<ConfirmedTransfer> {
        self.confirmed
            .read()
            .await
            .get(signature)
            .cloned()
            .ok_or_else(|| GigwireError::payment_backend("transaction fetch failed: not found"))
    }

    async fn send_payout(&self, payouts: &[Payout]) -> Result<String> {
        if self.fail_payout.load(Ordering::SeqCst) {
            return Err(GigwireError::payment_backend("payout submit failed (injected)"));
        }
        let seq = self.payout_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let signature = format!("payout_sig_{seq}");

        let deltas = payouts
            .iter()
            .map(|p| TokenDelta {
                owner: p.recipient.clone(),
                mint: self.mint.clone(),
                delta: p.amount_atomic as i128,
            })
            .collect();
        self.register(ConfirmedTransfer {
            signature: signature.clone(),
            slot: 1,
            deltas,
        })
        .await;

        self.payouts.write().await.push(payouts.to_vec());
        Ok(signature)
    }

    fn token_account_for(&self, owner: &str) -> Result<String> {
        Ok(format!("ata:{owner}:{}", self.mint))
    }
}
