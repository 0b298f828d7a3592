//! CareWallet Types - Canonical domain types for the benefit wallet core
//!
//! This crate contains all foundational types with zero dependencies on other
//! carewallet crates:
//!
//! - Identity types (WalletId, ClaimId, UserId, ...)
//! - `Money` in integer minor units
//! - Actors and roles
//! - Effective wallet configuration
//! - Wallet, ledger transaction and claim records
//! - The error taxonomy
//!
//! # Invariants
//!
//! 1. Money is never floating point
//! 2. `balance.current = balance.allocated - balance.consumed`
//! 3. Ledger transactions and claim status history are append-only

pub mod identity;
pub mod money;
pub mod actor;
pub mod config;
pub mod wallet;
pub mod claim;
pub mod error;

pub use identity::*;
pub use money::*;
pub use actor::*;
pub use config::*;
pub use wallet::*;
pub use claim::*;
pub use error::*;
