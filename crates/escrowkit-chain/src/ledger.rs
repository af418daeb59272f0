//! Stable adapter trait for the external ledger.
//!
//! Everything above this crate talks to the ledger only through
//! [`ExternalLedger`], so a JSON-RPC node and the in-process [`LocalChain`]
//! are interchangeable.
//!
//! [`LocalChain`]: crate::local::LocalChain

use async_trait::async_trait;
use escrowkit_types::{Address, ContractEvent, Result, TxHash, Wei};
use tokio::sync::broadcast;

use crate::transaction::{SignedTransaction, TxReceipt};

/// The distributed system of record that finalizes deployments and calls.
#[async_trait]
pub trait ExternalLedger: Send + Sync + 'static {
    /// Submit a signed transaction. Fails with `RemoteRejected` if refused outright.
    async fn submit(&self, tx: SignedTransaction) -> Result<TxHash>;

    /// Suspend until `tx_hash` is finalized.
    ///
    /// A reverted transaction surfaces as `RemoteRejected`.
    async fn confirm(&self, tx_hash: &TxHash) -> Result<TxReceipt>;

    /// Live confirmed events emitted by `contract`. No replay of earlier events.
    fn subscribe(&self, contract: &Address) -> broadcast::Receiver<ContractEvent>;

    /// Native balance of an account.
    async fn balance_of(&self, account: &Address) -> Result<Wei>;
}
