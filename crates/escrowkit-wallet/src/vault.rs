//! EVM signer vault for escrowkit identities.
//!
//! A `SignerHandle` owns one secp256k1 key. The account address is
//! `keccak256(uncompressed_pubkey[1..])[12..]`. Callers only ever receive
//! hex-encoded signatures and the public key; raw key bytes stay inside.

use escrowkit_types::{Address, EscrowError};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("verification failed")]
    VerificationFailed,
}

impl From<VaultError> for EscrowError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::VerificationFailed => {
                EscrowError::remote_rejected("signature check", e.to_string())
            }
            other => EscrowError::identity_unavailable(other.to_string()),
        }
    }
}

// ── Hashing ───────────────────────────────────────────────────────────────────

/// keccak256 of `input`.
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(input));
    out
}

/// Derive an address from an uncompressed SEC1 public key (65 bytes, `0x04` prefix).
pub fn address_from_public_key(sec1: &[u8]) -> Result<Address, VaultError> {
    if sec1.len() != 65 || sec1[0] != 0x04 {
        return Err(VaultError::InvalidKey(format!(
            "expected 65-byte uncompressed key, got {} bytes",
            sec1.len()
        )));
    }
    let hash = keccak256(&sec1[1..]);
    Address::from_slice(&hash[12..]).map_err(|e| VaultError::InvalidKey(e.to_string()))
}

/// Verify a hex signature produced by [`SignerHandle::sign`] over `message`.
pub fn verify_signature(public_key: &[u8], message: &[u8], sig_hex: &str) -> Result<(), VaultError> {
    use k256::ecdsa::signature::DigestVerifier;

    let vk = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
    let sig_bytes = hex::decode(sig_hex).map_err(|_| VaultError::VerificationFailed)?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| VaultError::VerificationFailed)?;
    vk.verify_digest(Keccak256::new_with_prefix(message), &sig)
        .map_err(|_| VaultError::VerificationFailed)
}

// ── Signer ────────────────────────────────────────────────────────────────────

/// Capability to authorize transactions for one account.
///
/// Not `Clone`. The identity session owns it and lends it out by reference
/// for a single operation.
pub struct SignerHandle {
    ecdsa_sk: SigningKey,
    address: Address,
    label: String,
}

impl SignerHandle {
    /// Create a signer from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32], label: impl Into<String>) -> Result<Self, VaultError> {
        let ecdsa_sk = SigningKey::from_bytes(seed.into())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        let encoded = ecdsa_sk.verifying_key().to_encoded_point(false);
        let address = address_from_public_key(encoded.as_bytes())?;
        Ok(Self {
            ecdsa_sk,
            address,
            label: label.into(),
        })
    }

    /// Deterministic signer for a label (stable across runs).
    pub fn for_label(label: &str) -> Result<Self, VaultError> {
        let seed = blake3::derive_key("escrowkit local wallet account seed v1", label.as_bytes());
        Self::from_seed(&seed, label)
    }

    /// Account address controlled by this signer.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Uncompressed SEC1 public key bytes.
    pub fn public_key(&self) -> Vec<u8> {
        self.ecdsa_sk
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Sign `message` (keccak256 digest, secp256k1). Returns a hex signature.
    pub fn sign(&self, message: &[u8]) -> Result<String, VaultError> {
        let digest = Keccak256::new_with_prefix(message);
        let (sig, _recovery): (Signature, _) = self
            .ecdsa_sk
            .sign_digest_recoverable(digest)
            .map_err(|e| VaultError::SigningFailed(e.to_string()))?;
        Ok(hex::encode(sig.to_bytes()))
    }
}

impl std::fmt::Debug for SignerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerHandle")
            .field("label", &self.label)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
