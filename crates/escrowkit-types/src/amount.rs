//! Lossless amounts in the ledger's smallest unit
//!
//! Deposits are carried as `u128` wei. Values never pass through a floating
//! point type: parsing, arithmetic and ether formatting are all exact.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::{EscrowError, Result};

/// Decimal places of the native unit (wei per ether = 10^18)
pub const ETHER_DECIMALS: u32 = 18;

/// Wei per ether
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// An unsigned amount in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wei(pub u128);

impl Wei {
    /// Zero wei
    pub const ZERO: Wei = Wei(0);

    /// Create from a raw wei value
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// Create from whole ether
    pub fn from_ether(ether: u64) -> Self {
        Self(ether as u128 * WEI_PER_ETHER)
    }

    /// Raw wei value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a non-negative base-10 integer wei amount
    pub fn parse_wei(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(EscrowError::invalid_parameter("deposit_value", "amount is empty"));
        }
        if s.starts_with('-') {
            return Err(EscrowError::invalid_parameter(
                "deposit_value",
                format!("{:?} is negative", input),
            ));
        }
        let digits = s.strip_prefix('+').unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EscrowError::invalid_parameter(
                "deposit_value",
                format!("{:?} is not an integer amount of wei", input),
            ));
        }
        digits.parse::<u128>().map(Self).map_err(|_| {
            EscrowError::invalid_parameter("deposit_value", format!("{:?} is out of range", input))
        })
    }

    /// Parse a decimal ether amount such as `"1.5"` into wei
    ///
    /// At most 18 fractional digits are accepted; the conversion is exact.
    pub fn parse_ether(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.starts_with('-') {
            return Err(EscrowError::invalid_parameter(
                "deposit_value",
                format!("{:?} is negative", input),
            ));
        }
        let s = s.strip_prefix('+').unwrap_or(s);
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(EscrowError::invalid_parameter(
                "deposit_value",
                format!("{:?} is not a decimal ether amount", input),
            ));
        }
        if frac.len() > ETHER_DECIMALS as usize {
            return Err(EscrowError::invalid_parameter(
                "deposit_value",
                format!("{:?} has more than {} decimal places", input, ETHER_DECIMALS),
            ));
        }

        let overflow = || {
            EscrowError::invalid_parameter("deposit_value", format!("{:?} is out of range", input))
        };
        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(WEI_PER_ETHER)
                .ok_or_else(overflow)?
        };
        let frac_wei = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = ETHER_DECIMALS as usize);
            padded.parse::<u128>().map_err(|_| overflow())?
        };
        whole_wei.checked_add(frac_wei).map(Self).ok_or_else(overflow)
    }

    /// Exact ether rendering with trailing zeros trimmed, e.g. `"1.5"`
    pub fn format_ether(&self) -> String {
        let whole = self.0 / WEI_PER_ETHER;
        let frac = self.0 % WEI_PER_ETHER;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:018}", frac);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }

    /// Checked addition
    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Wei {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<u64> for Wei {
    fn from(value: u64) -> Self {
        Self(value as u128)
    }
}

// Serialized as a decimal string so JSON consumers never round it.
impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Accepted on-disk shapes for an amount
#[derive(Deserialize)]
#[serde(untagged)]
enum WeiRepr {
    Number(u64),
    Text(String),
    /// `{"type":"BigNumber","hex":"0x0de0b6b3a7640000"}` written by older front-ends
    BigNumber { hex: String },
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;

        match WeiRepr::deserialize(deserializer)? {
            WeiRepr::Number(n) => Ok(Wei(n as u128)),
            WeiRepr::Text(s) => Wei::parse_wei(&s).map_err(D::Error::custom),
            WeiRepr::BigNumber { hex } => {
                let digits = hex
                    .strip_prefix("0x")
                    .or_else(|| hex.strip_prefix("0X"))
                    .unwrap_or(&hex);
                u128::from_str_radix(digits, 16)
                    .map(Wei)
                    .map_err(|e| D::Error::custom(format!("invalid hex amount {:?}: {}", hex, e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wei() {
        assert_eq!(Wei::parse_wei("1000000000000000000").unwrap(), Wei::from_ether(1));
        assert_eq!(Wei::parse_wei(" 42 ").unwrap(), Wei(42));
        assert_eq!(Wei::parse_wei("0").unwrap(), Wei::ZERO);
    }

    #[test]
    fn test_parse_wei_rejects_negative_and_fractional() {
        for bad in ["-1", "1.5", "", "abc", "1e18", "+"] {
            let err = Wei::parse_wei(bad).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER", "input {:?}", bad);
        }
    }

    #[test]
    fn test_parse_wei_overflow() {
        let too_big = format!("{}0", u128::MAX);
        assert!(Wei::parse_wei(&too_big).is_err());
    }

    #[test]
    fn test_parse_ether() {
        assert_eq!(Wei::parse_ether("1").unwrap(), Wei::from_ether(1));
        assert_eq!(Wei::parse_ether("1.5").unwrap(), Wei(1_500_000_000_000_000_000));
        assert_eq!(Wei::parse_ether("0.000000000000000001").unwrap(), Wei(1));
        assert_eq!(Wei::parse_ether(".25").unwrap(), Wei(250_000_000_000_000_000));
    }

    #[test]
    fn test_parse_ether_rejects_bad_input() {
        assert!(Wei::parse_ether("-1").is_err());
        assert!(Wei::parse_ether("1.0000000000000000001").is_err());
        assert!(Wei::parse_ether("one").is_err());
        assert!(Wei::parse_ether(".").is_err());
        assert!(Wei::parse_ether("1.2.3").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(Wei::from_ether(3).format_ether(), "3");
        assert_eq!(Wei(1_500_000_000_000_000_000).format_ether(), "1.5");
        assert_eq!(Wei(1).format_ether(), "0.000000000000000001");
    }

    #[test]
    fn test_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Wei::from_ether(1)).unwrap();
        assert_eq!(json, "\"1000000000000000000\"");
    }

    #[test]
    fn test_deserializes_all_known_shapes() {
        let one_eth = Wei::from_ether(1);
        assert_eq!(serde_json::from_str::<Wei>("1000000000000000000").unwrap(), one_eth);
        assert_eq!(serde_json::from_str::<Wei>("\"1000000000000000000\"").unwrap(), one_eth);
        let legacy = r#"{"type":"BigNumber","hex":"0x0de0b6b3a7640000"}"#;
        assert_eq!(serde_json::from_str::<Wei>(legacy).unwrap(), one_eth);
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Wei>("-5").is_err());
        assert!(serde_json::from_str::<Wei>("\"-5\"").is_err());
    }

    #[test]
    fn test_large_values_survive_json() {
        let big = Wei(u128::MAX);
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(serde_json::from_str::<Wei>(&json).unwrap(), big);
    }
}
