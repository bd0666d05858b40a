//! Gigwire Types - Canonical domain types for the bot-to-bot job marketplace
//!
//! This crate contains all foundational types for Gigwire with zero
//! dependencies on other gigwire crates. It defines the complete type
//! system for:
//!
//! - Jobs and the job lifecycle state set
//! - Escrow records and their terminal states
//! - Atomic-unit amount math for the 6-decimal settlement token
//! - Lifecycle events published to the event bus
//! - The kind-tagged error type used across all services
//!
//! # Settlement invariants
//!
//! These types back the core marketplace invariants:
//!
//! 1. `bounty_atomic` is fixed at creation and is the single source of
//!    truth for every payment comparison thereafter
//! 2. A job reaches PAID through exactly one settlement path
//! 3. A chain transaction signature is consumed at most once

pub mod amount;
pub mod error;
pub mod escrow;
pub mod events;
pub mod job;
pub mod wallet;

pub use amount::*;
pub use error::*;
pub use escrow::*;
pub use events::*;
pub use job::*;
pub use wallet::*;
