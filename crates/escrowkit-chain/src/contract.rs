//! Typed proxy to one deployed escrow instance.

use std::sync::Arc;

use escrowkit_types::{Address, ContractEvent, EscrowError, Result, TxHash, Wei};
use escrowkit_wallet::SignerHandle;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::ledger::ExternalLedger;
use crate::transaction::{SignedTransaction, TxPayload, TxReceipt};

/// Handle to a remote escrow contract
#[derive(Clone)]
pub struct ContractHandle {
    address: Address,
    arbiter: Address,
    beneficiary: Address,
    deposit_value: Wei,
    deployed_by: Address,
    chain: Arc<dyn ExternalLedger>,
}

impl ContractHandle {
    /// Bind to an existing instance
    pub fn new(
        chain: Arc<dyn ExternalLedger>,
        address: Address,
        arbiter: Address,
        beneficiary: Address,
        deposit_value: Wei,
        deployed_by: Address,
    ) -> Self {
        Self {
            address,
            arbiter,
            beneficiary,
            deposit_value,
            deployed_by,
            chain,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn arbiter(&self) -> Address {
        self.arbiter
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    pub fn deposit_value(&self) -> Wei {
        self.deposit_value
    }

    pub fn deployed_by(&self) -> Address {
        self.deployed_by
    }

    /// Issue `approve()`. Does not wait for confirmation.
    pub async fn request_approval(&self, signer: &SignerHandle) -> Result<PendingTransaction> {
        let tx = SignedTransaction::sign(
            signer,
            TxPayload::Approve {
                contract: self.address,
            },
        )?;
        let hash = self.chain.submit(tx).await?;
        tracing::debug!(contract = %self.address, tx = %hash, "approve() submitted");
        Ok(PendingTransaction::new(self.chain.clone(), hash, "approve"))
    }

    /// Listen for confirmed `Approved` events from this instance.
    ///
    /// Only events emitted after this call are delivered.
    pub fn on_approved(&self) -> ApprovedStream {
        ApprovedStream {
            contract: self.address,
            receiver: self.chain.subscribe(&self.address),
        }
    }
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("address", &self.address)
            .field("arbiter", &self.arbiter)
            .field("beneficiary", &self.beneficiary)
            .field("deposit_value", &self.deposit_value)
            .finish_non_exhaustive()
    }
}

/// A submitted transaction awaiting finalization
pub struct PendingTransaction {
    chain: Arc<dyn ExternalLedger>,
    hash: TxHash,
    operation: &'static str,
}

impl PendingTransaction {
    pub fn new(chain: Arc<dyn ExternalLedger>, hash: TxHash, operation: &'static str) -> Self {
        Self {
            chain,
            hash,
            operation,
        }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Suspend until the ledger finalizes the transaction
    pub async fn wait(self) -> Result<TxReceipt> {
        self.chain.confirm(&self.hash).await
    }
}

impl std::fmt::Debug for PendingTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransaction")
            .field("hash", &self.hash)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// Stream of `Approved` events for one contract
pub struct ApprovedStream {
    contract: Address,
    receiver: broadcast::Receiver<ContractEvent>,
}

impl ApprovedStream {
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Next `Approved` event, or `None` once the ledger closes the channel
    pub async fn next(&mut self) -> Option<ContractEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.is_approval_of(&self.contract) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(contract = %self.contract, skipped, "Approved stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Map a failed approval confirmation to the approval error taxonomy
pub fn approval_failure(contract: &Address, err: EscrowError) -> EscrowError {
    match err {
        EscrowError::RemoteRejected { reason, .. } => EscrowError::ApprovalFailed {
            contract: contract.to_string(),
            reason,
        },
        other => other,
    }
}
