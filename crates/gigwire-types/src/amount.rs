//! Amount math for the settlement token
//!
//! The settlement token carries 6 decimals. Display amounts (USDC) exist
//! only at job creation; every comparison after that uses integer atomic
//! units.

/// Decimal places of the settlement token.
pub const TOKEN_DECIMALS: u32 = 6;

/// Atomic units per display unit (10^6).
pub const ATOMIC_PER_USDC: u64 = 1_000_000;

/// Largest accepted bounty, in atomic units (1000 USDC).
pub const MAX_BOUNTY_ATOMIC: u64 = 1_000 * ATOMIC_PER_USDC;

/// Convert a display-unit bounty to atomic units.
///
/// Returns `None` when the amount is not finite, not strictly positive,
/// rounds to zero, or exceeds the bounty cap.
pub fn usdc_to_atomic(usdc: f64) -> Option<u64> {
    if !usdc.is_finite() || usdc <= 0.0 {
        return None;
    }
    let atomic = (usdc * ATOMIC_PER_USDC as f64).round();
    if atomic < 1.0 || atomic > MAX_BOUNTY_ATOMIC as f64 {
        return None;
    }
    Some(atomic as u64)
}

/// Convert atomic units back to display units, for presentation only.
pub fn atomic_to_usdc(atomic: u64) -> f64 {
    atomic as f64 / ATOMIC_PER_USDC as f64
}

/// Platform fee for an amount, in atomic units.
///
/// Integer division; the remainder stays with the worker.
pub fn platform_fee(amount_atomic: u64, fee_basis_points: u32) -> u64 {
    (amount_atomic as u128 * fee_basis_points as u128 / 10_000) as u64
}

/// Worker share after the platform fee.
pub fn worker_amount(amount_atomic: u64, fee_basis_points: u32) -> u64 {
    amount_atomic - platform_fee(amount_atomic, fee_basis_points)
}
