//! Escrowkit Ledger - durable storage for finalized approvals
//!
//! The [`ApprovalLedger`] keeps at most one [`ApprovedRecord`] per contract
//! address and writes the whole collection under a single key on every
//! append. Storage is pluggable through [`RecordStore`]:
//!
//! - [`SledStore`]: embedded on-disk store, survives restarts
//! - [`MemoryStore`]: process-local, for tests
//!
//! [`ApprovedRecord`]: escrowkit_types::ApprovedRecord

pub mod approvals;
pub mod store;

pub use approvals::*;
pub use store::*;
