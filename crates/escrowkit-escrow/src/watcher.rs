//! Approval watcher state machine.
//!
//! ```text
//! Idle --begin()--> Awaiting --Approved event--> Approved (terminal)
//! ```
//!
//! Events for other contracts and events after the terminal transition are
//! ignored, so a redelivered `Approved` never transitions twice.

use escrowkit_types::{Address, ContractEvent, TxHash};
use serde::{Deserialize, Serialize};

/// Where an escrow's approval stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// No approval requested yet
    Idle,
    /// `approve()` issued, waiting for the confirmed event
    Awaiting { requested_by: Address },
    /// Confirmed; `approved_by` signed the transaction that emitted the event
    Approved {
        approved_by: Address,
        tx_hash: TxHash,
        block_number: u64,
    },
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Awaiting { .. } => "awaiting",
            Self::Approved { .. } => "approved",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the approval of one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalWatcher {
    contract: Address,
    status: ApprovalStatus,
}

impl ApprovalWatcher {
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            status: ApprovalStatus::Idle,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Identity that issued the outstanding request
    pub fn requested_by(&self) -> Option<Address> {
        match self.status {
            ApprovalStatus::Awaiting { requested_by } => Some(requested_by),
            _ => None,
        }
    }

    /// Identity whose transaction completed the approval
    pub fn approved_by(&self) -> Option<Address> {
        match self.status {
            ApprovalStatus::Approved { approved_by, .. } => Some(approved_by),
            _ => None,
        }
    }

    /// Record that `requested_by` issued `approve()`.
    ///
    /// A repeated request while Awaiting takes over the requester. Returns
    /// `false` once Approved.
    pub fn begin(&mut self, requested_by: Address) -> bool {
        match self.status {
            ApprovalStatus::Approved { .. } => false,
            ApprovalStatus::Idle | ApprovalStatus::Awaiting { .. } => {
                self.status = ApprovalStatus::Awaiting { requested_by };
                true
            }
        }
    }

    /// Give up waiting without an outcome. Terminal state is kept.
    pub fn reset(&mut self) {
        if !self.is_terminal() {
            self.status = ApprovalStatus::Idle;
        }
    }

    /// Whether `event` would complete this watcher
    pub fn accepts(&self, event: &ContractEvent) -> bool {
        matches!(self.status, ApprovalStatus::Awaiting { .. }) && event.is_approval_of(&self.contract)
    }

    /// Apply `event`. Returns `true` only for the Awaiting → Approved transition.
    pub fn observe(&mut self, event: &ContractEvent) -> bool {
        if !self.accepts(event) {
            return false;
        }
        if let ApprovalStatus::Awaiting { .. } = self.status {
            self.status = ApprovalStatus::Approved {
                approved_by: event.sender,
                tx_hash: event.tx_hash,
                block_number: event.block_number,
            };
            return true;
        }
        false
    }
}
