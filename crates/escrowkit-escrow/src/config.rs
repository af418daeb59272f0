//! Controller configuration

use std::path::PathBuf;
use std::time::Duration;

use escrowkit_ledger::DEFAULT_STORAGE_KEY;
use escrowkit_types::{EscrowError, Result};
use serde::{Deserialize, Serialize};

/// Escrow controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Directory of the durable approval store
    pub data_dir: PathBuf,
    /// Key the approval records are stored under
    pub storage_key: String,
    /// Bound on waiting for a confirmed approval; `None` waits indefinitely
    pub approval_timeout_secs: Option<u64>,
    /// Ether credited to the depositor by the local demo
    pub demo_funding_eth: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::var("ESCROWKIT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            storage_key: std::env::var("ESCROWKIT_STORAGE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_string()),
            approval_timeout_secs: std::env::var("ESCROWKIT_APPROVAL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            demo_funding_eth: std::env::var("ESCROWKIT_DEMO_FUNDING_ETH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl EscrowConfig {
    /// Create config from environment variables, rejecting unparsable values
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            approval_timeout_secs: match std::env::var("ESCROWKIT_APPROVAL_TIMEOUT_SECS") {
                Ok(raw) => Some(parse_var("ESCROWKIT_APPROVAL_TIMEOUT_SECS", &raw)?),
                Err(_) => None,
            },
            demo_funding_eth: match std::env::var("ESCROWKIT_DEMO_FUNDING_ETH") {
                Ok(raw) => parse_var("ESCROWKIT_DEMO_FUNDING_ETH", &raw)?,
                Err(_) => defaults.demo_funding_eth,
            },
            ..defaults
        })
    }

    /// Config rooted at `data_dir`, everything else at defaults
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            approval_timeout_secs: None,
            demo_funding_eth: 10,
        }
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }

    /// Path of the sled database
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("approvals")
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .map(|dir| dir.join("escrowkit"))
        .unwrap_or_else(|| PathBuf::from(".escrowkit"))
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| EscrowError::invalid_parameter(name, e.to_string()))
}
