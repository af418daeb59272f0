//! Controller events for the rendering layer
//!
//! Broadcast to every subscriber of [`EscrowController::subscribe`].
//!
//! [`EscrowController::subscribe`]: crate::EscrowController::subscribe

use chrono::{DateTime, Utc};
use escrowkit_types::{Address, ApprovedRecord, TxHash, Wei};
use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControllerEvent {
    /// A new escrow was confirmed and registered as Pending
    Deployed {
        contract: Address,
        arbiter: Address,
        beneficiary: Address,
        value: Wei,
        timestamp: DateTime<Utc>,
    },

    /// `approve()` was submitted
    ApprovalRequested {
        contract: Address,
        tx_hash: TxHash,
        requested_by: Address,
        timestamp: DateTime<Utc>,
    },

    /// The approval was observed and committed
    Approved {
        contract: Address,
        record: ApprovedRecord,
        block_number: u64,
        timestamp: DateTime<Utc>,
    },

    /// The approval transaction was rejected or reverted
    ApprovalFailed {
        contract: Address,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The approval watch was cancelled before an outcome
    WatchCancelled {
        contract: Address,
        timestamp: DateTime<Utc>,
    },
}

impl ControllerEvent {
    /// Contract the event concerns
    pub fn contract(&self) -> Address {
        match self {
            Self::Deployed { contract, .. }
            | Self::ApprovalRequested { contract, .. }
            | Self::Approved { contract, .. }
            | Self::ApprovalFailed { contract, .. }
            | Self::WatchCancelled { contract, .. } => *contract,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Deployed { .. } => "deployed",
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::Approved { .. } => "approved",
            Self::ApprovalFailed { .. } => "approval_failed",
            Self::WatchCancelled { .. } => "watch_cancelled",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Deployed { timestamp, .. }
            | Self::ApprovalRequested { timestamp, .. }
            | Self::Approved { timestamp, .. }
            | Self::ApprovalFailed { timestamp, .. }
            | Self::WatchCancelled { timestamp, .. } => *timestamp,
        }
    }
}
