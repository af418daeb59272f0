//! Escrow types for escrowkit
//!
//! An escrow is a two-party agreement deployed as a remote contract: the
//! depositor locks value, the arbiter approves, the beneficiary receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, TxHash, Wei};

/// State of an escrow entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowState {
    /// Deployed and confirmed, deposit still locked
    Pending,
    /// The contract emitted `Approved`; terminal
    Approved,
}

impl EscrowState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Only Pending → Approved is a legal transition
    pub fn can_transition_to(&self, next: EscrowState) -> bool {
        matches!((self, next), (Self::Pending, Self::Approved))
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

/// An escrow tracked for the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    /// Address of the deployed contract instance (unique per registry)
    pub contract_address: Address,
    /// Identity allowed to approve
    pub arbiter: Address,
    /// Identity that receives the deposit on approval
    pub beneficiary: Address,
    /// Locked deposit
    pub deposit_value: Wei,
    /// Current state
    pub state: EscrowState,
    /// Identity that deployed (and funded) the contract
    pub deployed_by: Address,
    /// When the deployment was confirmed
    pub created_at: DateTime<Utc>,
    /// When the approval was observed
    pub approved_at: Option<DateTime<Utc>>,
}

impl Escrow {
    /// Create a pending escrow for a freshly confirmed deployment
    pub fn pending(
        contract_address: Address,
        arbiter: Address,
        beneficiary: Address,
        deposit_value: Wei,
        deployed_by: Address,
    ) -> Self {
        Self {
            contract_address,
            arbiter,
            beneficiary,
            deposit_value,
            state: EscrowState::Pending,
            deployed_by,
            created_at: Utc::now(),
            approved_at: None,
        }
    }

    /// Move to Approved. Returns `false` if the escrow was already approved.
    pub fn mark_approved(&mut self) -> bool {
        if !self.state.can_transition_to(EscrowState::Approved) {
            return false;
        }
        self.state = EscrowState::Approved;
        self.approved_at = Some(Utc::now());
        true
    }

    /// Check if the escrow has been approved
    pub fn is_approved(&self) -> bool {
        self.state == EscrowState::Approved
    }

    /// Build the durable record for this escrow
    pub fn to_record(&self, sender_address: Address) -> ApprovedRecord {
        ApprovedRecord {
            tx: self.contract_address,
            arbiter: self.arbiter,
            beneficiary: self.beneficiary,
            sender_address,
            value: self.deposit_value,
        }
    }
}

/// Durable record of a finalized approval
///
/// Field names match the persisted JSON format:
/// `{"tx", "arbiter", "beneficiary", "senderAddress", "value"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedRecord {
    /// Contract address of the approved escrow
    pub tx: Address,
    pub arbiter: Address,
    pub beneficiary: Address,
    /// Identity that initiated the approval
    pub sender_address: Address,
    pub value: Wei,
}

/// Kind of event emitted by an escrow contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractEventKind {
    /// `Approved()`; carries no payload beyond the emitting contract
    Approved,
}

/// A confirmed event observed on the external ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Emitting contract
    pub contract: Address,
    pub kind: ContractEventKind,
    /// Account that signed the emitting transaction
    pub sender: Address,
    /// Transaction whose execution emitted the event
    pub tx_hash: TxHash,
    /// Block the transaction was finalized in
    pub block_number: u64,
}

impl ContractEvent {
    /// Check if this is an `Approved` event for `contract`
    pub fn is_approval_of(&self, contract: &Address) -> bool {
        self.kind == ContractEventKind::Approved && &self.contract == contract
    }
}
