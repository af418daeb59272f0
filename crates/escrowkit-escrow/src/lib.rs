//! Escrowkit Escrow - the escrow lifecycle controller
//!
//! Binds an identity session to the external ledger, tracks every escrow
//! deployed in the session, and commits exactly one durable approval record
//! per contract once its `Approved` event is confirmed.
//!
//! # Flow
//!
//! 1. [`EscrowController::resolve_identity`] binds the active wallet account
//! 2. [`EscrowController::deploy`] creates a contract and a Pending registry entry
//! 3. [`EscrowController::request_approval`] starts an [`ApprovalWatcher`] and issues `approve()`
//! 4. The watcher task moves the entry to Approved and appends to the [`ApprovalLedger`]
//!
//! [`ApprovalLedger`]: escrowkit_ledger::ApprovalLedger

pub mod config;
pub mod controller;
pub mod events;
pub mod registry;
pub mod subscription;
pub mod watcher;

pub use config::*;
pub use controller::*;
pub use events::*;
pub use registry::*;
pub use subscription::*;
pub use watcher::*;
