//! Escrowkit Chain - the external ledger boundary
//!
//! The escrow contract is a black box with a fixed ABI:
//!
//! ```text
//! constructor(address arbiter, address beneficiary) payable
//! function approve()            // arbiter only, state-changing
//! event Approved()
//! ```
//!
//! - [`ExternalLedger`]: submit, confirm, and event subscription
//! - [`Deployer`]: validates input, creates an instance, waits for confirmation
//! - [`ContractHandle`]: typed proxy to one deployed instance
//! - [`LocalChain`]: in-process ledger used by tests and the demo

pub mod transaction;
pub mod ledger;
pub mod contract;
pub mod deployer;
pub mod local;

pub use transaction::*;
pub use ledger::*;
pub use contract::*;
pub use deployer::*;
pub use local::*;
