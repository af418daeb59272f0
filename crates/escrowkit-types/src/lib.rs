//! Escrowkit Types - Canonical domain types for the escrow lifecycle controller
//!
//! This crate contains the foundational types with zero dependencies on
//! other escrowkit crates:
//!
//! - Identity types (`Address`, `TxHash`)
//! - Lossless amounts in the smallest ledger unit (`Wei`)
//! - Escrow entries, approved records and contract events
//! - The error taxonomy shared by every layer
//!
//! # Lifecycle
//!
//! ```text
//! resolve identity → deploy → Pending → approve() → Approved event → ApprovedRecord
//! ```
//!
//! An escrow only ever moves Pending → Approved, and at most one
//! `ApprovedRecord` exists per contract address.

pub mod identity;
pub mod amount;
pub mod escrow;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use escrow::*;
pub use error::*;
