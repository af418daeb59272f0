//! Identity types for escrowkit
//!
//! Ledger identifiers are fixed-length byte strings rendered as `0x`-prefixed
//! lowercase hex. Each kind gets its own type so an account address can never
//! be passed where a transaction hash is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{EscrowError, Result};

/// Macro to generate fixed-length hex identifier types
macro_rules! define_hex_id_type {
    ($name:ident, $len:literal, $field:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; $len]);

        impl $name {
            /// Byte length of this identifier
            pub const LEN: usize = $len;

            /// Create from raw bytes
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Create from a slice, which must be exactly `LEN` bytes
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let array: [u8; $len] = bytes.try_into().map_err(|_| {
                    EscrowError::invalid_parameter(
                        $field,
                        format!("expected {} bytes, got {}", $len, bytes.len()),
                    )
                })?;
                Ok(Self(array))
            }

            /// Parse from hex (with or without `0x`, any letter case)
            pub fn parse(s: &str) -> Result<Self> {
                let trimmed = s.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                if digits.len() != $len * 2 {
                    return Err(EscrowError::invalid_parameter(
                        $field,
                        format!("expected {} hex digits, got {:?}", $len * 2, s),
                    ));
                }
                let bytes = hex::decode(digits).map_err(|e| {
                    EscrowError::invalid_parameter($field, format!("{:?} is not hex: {}", s, e))
                })?;
                Self::from_slice(&bytes)
            }

            /// Get the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase `0x`-prefixed hex form
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = EscrowError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = EscrowError;

            fn try_from(s: String) -> Result<Self> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_hex()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

define_hex_id_type!(Address, 20, "address", "A 20-byte account or contract address");
define_hex_id_type!(TxHash, 32, "tx_hash", "A 32-byte transaction hash");

impl Address {
    /// The all-zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Abbreviated form for display, e.g. `0x1234…abcd`
    pub fn short(&self) -> String {
        let full = self.to_hex();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xA1b2C3d4E5f60718293a4B5c6D7e8F9012345678";

    #[test]
    fn test_address_parse_normalizes_to_lowercase() {
        let addr = Address::parse(MIXED).unwrap();
        assert_eq!(addr.to_string(), MIXED.to_lowercase());
    }

    #[test]
    fn test_address_parse_without_prefix() {
        let with = Address::parse(MIXED).unwrap();
        let without = Address::parse(&MIXED[2..]).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        let err = Address::parse("0xA1").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_address_rejects_non_hex() {
        assert!(Address::parse("0xzz b2c3d4e5f60718293a4b5c6d7e8f90123456").is_err());
    }

    #[test]
    fn test_address_serde_as_string() {
        let addr = Address::parse(MIXED).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", MIXED.to_lowercase()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_invalid_address_fails_deserialization() {
        assert!(serde_json::from_str::<Address>("\"0x1234\"").is_err());
    }

    #[test]
    fn test_tx_hash_length() {
        let hash = TxHash::from_bytes([7u8; 32]);
        assert_eq!(hash.to_hex().len(), 66);
        assert!(Address::parse(&hash.to_hex()).is_err());
    }

    #[test]
    fn test_short_form() {
        let addr = Address::parse(MIXED).unwrap();
        assert_eq!(addr.short(), "0xa1b2…5678");
    }
}
