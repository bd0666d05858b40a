//! Wallet address syntax checks
//!
//! Gigwire identifies callers by chain address. Syntax is validated at
//! the boundary; on-chain existence is not checked here.

use crate::{GigwireError, Result};

/// Whether a string is a well-formed chain address (base58, 32 bytes).
pub fn is_valid_wallet(address: &str) -> bool {
    if address.len() < 32 || address.len() > 44 {
        return false;
    }
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Validate a wallet field, naming the field in the error
pub fn require_valid_wallet(field: &str, address: &str) -> Result<()> {
    if is_valid_wallet(address) {
        Ok(())
    } else {
        Err(GigwireError::validation(field, "malformed wallet address"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_real_addresses() {
        assert!(is_valid_wallet("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"));
        assert!(is_valid_wallet("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_wallet(""));
        assert!(!is_valid_wallet("short"));
        assert!(!is_valid_wallet("0x52908400098527886E0F7030069857D2E4169EE7"));
        // base58 but wrong decoded length
        assert!(!is_valid_wallet("1111111111111111111111111111111111111111111"));
        assert!(require_valid_wallet("requesterWallet", "nope").is_err());
    }
}
