//! Signed transactions and receipts exchanged with the external ledger.

use escrowkit_types::{Address, ContractEvent, EscrowError, Result, TxHash, Wei};
use escrowkit_wallet::{address_from_public_key, keccak256, verify_signature, SignerHandle};
use serde::{Deserialize, Serialize};

/// Call carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TxPayload {
    /// `constructor(arbiter, beneficiary)` with `value` attached
    Deploy {
        arbiter: Address,
        beneficiary: Address,
        value: Wei,
    },
    /// `approve()` on `contract`
    Approve { contract: Address },
}

impl TxPayload {
    /// Short operation name for logs and errors
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Deploy { .. } => "deploy",
            Self::Approve { .. } => "approve",
        }
    }
}

/// A transaction authorized by a signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub from: Address,
    pub payload: TxPayload,
    /// hex ECDSA signature over [`SignedTransaction::signing_bytes`]
    pub signature: String,
    /// hex uncompressed SEC1 public key of `from`
    pub public_key: String,
}

impl SignedTransaction {
    /// Sign `payload` as the signer's account
    pub fn sign(signer: &SignerHandle, payload: TxPayload) -> Result<Self> {
        let from = signer.address();
        let bytes = Self::signing_bytes(&from, &payload)?;
        let signature = signer.sign(&bytes)?;
        Ok(Self {
            from,
            payload,
            signature,
            public_key: hex::encode(signer.public_key()),
        })
    }

    /// Canonical bytes covered by the signature
    pub fn signing_bytes(from: &Address, payload: &TxPayload) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Signable<'a> {
            from: &'a Address,
            payload: &'a TxPayload,
        }
        Ok(serde_json::to_vec(&Signable { from, payload })?)
    }

    /// Check the key belongs to `from` and the signature covers the payload
    pub fn verify(&self) -> Result<()> {
        let key = hex::decode(&self.public_key).map_err(|_| {
            EscrowError::remote_rejected(self.payload.operation(), "malformed public key")
        })?;
        let owner = address_from_public_key(&key)
            .map_err(|e| EscrowError::remote_rejected(self.payload.operation(), e.to_string()))?;
        if owner != self.from {
            return Err(EscrowError::remote_rejected(
                self.payload.operation(),
                format!("key belongs to {}, not sender {}", owner, self.from),
            ));
        }
        let bytes = Self::signing_bytes(&self.from, &self.payload)?;
        verify_signature(&key, &bytes, &self.signature).map_err(|_| {
            EscrowError::remote_rejected(self.payload.operation(), "invalid signature")
        })
    }

    /// Transaction hash
    pub fn hash(&self) -> Result<TxHash> {
        let mut bytes = Self::signing_bytes(&self.from, &self.payload)?;
        bytes.extend_from_slice(self.signature.as_bytes());
        Ok(TxHash::from_bytes(keccak256(&bytes)))
    }
}

/// Execution outcome of a finalized transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Reverted { reason: String },
}

/// Receipt of a finalized transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub from: Address,
    pub block_number: u64,
    pub status: TxStatus,
    /// Set for successful deployments
    pub contract_address: Option<Address>,
    /// Events emitted during execution
    pub events: Vec<ContractEvent>,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approve_payload() -> TxPayload {
        TxPayload::Approve {
            contract: Address::from_bytes([0xc0; 20]),
        }
    }

    #[test]
    fn test_signed_transaction_verifies() {
        let signer = SignerHandle::for_label("arbiter").unwrap();
        let tx = SignedTransaction::sign(&signer, approve_payload()).unwrap();
        assert_eq!(tx.from, signer.address());
        tx.verify().unwrap();
    }

    #[test]
    fn test_forged_sender_is_rejected() {
        let signer = SignerHandle::for_label("mallory").unwrap();
        let mut tx = SignedTransaction::sign(&signer, approve_payload()).unwrap();
        tx.from = SignerHandle::for_label("arbiter").unwrap().address();
        let err = tx.verify().unwrap_err();
        assert_eq!(err.error_code(), "REMOTE_REJECTED");
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let signer = SignerHandle::for_label("arbiter").unwrap();
        let mut tx = SignedTransaction::sign(&signer, approve_payload()).unwrap();
        tx.payload = TxPayload::Approve {
            contract: Address::from_bytes([0xc1; 20]),
        };
        assert!(tx.verify().is_err());
    }

    #[test]
    fn test_hash_is_stable() {
        let signer = SignerHandle::for_label("arbiter").unwrap();
        let tx = SignedTransaction::sign(&signer, approve_payload()).unwrap();
        assert_eq!(tx.hash().unwrap(), tx.hash().unwrap());
    }

    #[test]
    fn test_payload_wire_format() {
        let json = serde_json::to_value(approve_payload()).unwrap();
        assert_eq!(json["method"], "approve");
    }
}
