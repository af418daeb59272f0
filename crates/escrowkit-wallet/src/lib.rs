//! Escrowkit Wallet - identity sessions over an external wallet provider
//!
//! - `SignerHandle`: secp256k1 signing capability; key bytes never leave it
//! - `WalletProvider`: the account-granting boundary (`eth_requestAccounts`)
//! - `IdentitySession`: the resolved active identity for this process
//! - `LocalWallet`: deterministic in-process provider for tests and demos

pub mod vault;
pub mod provider;
pub mod session;

pub use vault::*;
pub use provider::*;
pub use session::*;
