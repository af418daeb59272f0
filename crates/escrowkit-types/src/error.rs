//! Error types for escrowkit
//!
//! Every failure path surfaces to the caller as one of these variants.
//! Nothing is retried automatically.

use thiserror::Error;

/// Result type for escrowkit operations
pub type Result<T> = std::result::Result<T, EscrowError>;

/// Escrowkit error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    // ========================================================================
    // Identity Errors
    // ========================================================================

    /// No account granted by the wallet provider, or the session was invalidated
    #[error("Identity unavailable: {reason}")]
    IdentityUnavailable { reason: String },

    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Malformed input, rejected before any remote call
    #[error("Invalid parameter: {field} - {reason}")]
    InvalidParameter { field: String, reason: String },

    /// Registry lookup miss
    #[error("Escrow {contract} not found")]
    NotFound { contract: String },

    // ========================================================================
    // Remote Errors
    // ========================================================================

    /// The external ledger declined an operation
    #[error("Remote ledger rejected {operation}: {reason}")]
    RemoteRejected { operation: String, reason: String },

    // ========================================================================
    // Approval Errors
    // ========================================================================

    /// An approval record for this contract already exists (benign)
    #[error("Approval record for {contract} already exists")]
    DuplicateRecord { contract: String },

    /// Approval was requested but no confirmed `Approved` event has arrived
    #[error("Approval of {contract} is still pending")]
    ApprovalPending { contract: String },

    /// The approval transaction was rejected or never confirmed
    #[error("Approval of {contract} failed: {reason}")]
    ApprovalFailed { contract: String, reason: String },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================

    /// Durable storage failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EscrowError {
    /// Create an identity unavailable error
    pub fn identity_unavailable(reason: impl Into<String>) -> Self {
        Self::IdentityUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(contract: impl ToString) -> Self {
        Self::NotFound {
            contract: contract.to_string(),
        }
    }

    /// Create a remote rejection error
    pub fn remote_rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteRejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Local validation errors, recoverable by correcting input
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidParameter { .. } | Self::NotFound { .. })
    }

    /// Errors the caller should treat as success
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DuplicateRecord { .. })
    }

    /// Check if this is a retriable error
    ///
    /// Remote rejections are never retriable: the fee market makes a blind
    /// resubmission unsafe.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }

    /// Get an error code for API responses and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IdentityUnavailable { .. } => "IDENTITY_UNAVAILABLE",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::RemoteRejected { .. } => "REMOTE_REJECTED",
            Self::DuplicateRecord { .. } => "DUPLICATE_RECORD",
            Self::ApprovalPending { .. } => "APPROVAL_PENDING",
            Self::ApprovalFailed { .. } => "APPROVAL_FAILED",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(e: serde_json::Error) -> Self {
        EscrowError::Storage {
            message: format!("serialization: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EscrowError::invalid_parameter("arbiter", "not hex");
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert_eq!(err.to_string(), "Invalid parameter: arbiter - not hex");
    }

    #[test]
    fn test_local_errors() {
        assert!(EscrowError::not_found("0xabc").is_local());
        assert!(EscrowError::invalid_parameter("x", "y").is_local());
        assert!(!EscrowError::remote_rejected("deploy", "declined").is_local());
    }

    #[test]
    fn test_remote_rejection_is_not_retriable() {
        assert!(!EscrowError::remote_rejected("approve", "out of gas").is_retriable());
        assert!(EscrowError::storage("disk full").is_retriable());
    }

    #[test]
    fn test_duplicate_is_benign() {
        let dup = EscrowError::DuplicateRecord {
            contract: "0xabc".to_string(),
        };
        assert!(dup.is_benign());
        assert!(!EscrowError::identity_unavailable("none").is_benign());
    }
}
