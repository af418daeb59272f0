//! Wallet provider boundary.
//!
//! A provider grants accounts (the `eth_requestAccounts` round trip, which may
//! involve a user consent prompt) and hands out signers for granted accounts.
//! The first granted account is the active identity.

use async_trait::async_trait;
use escrowkit_types::{Address, EscrowError, Result};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::vault::SignerHandle;

/// External wallet that grants and signs for accounts.
#[async_trait]
pub trait WalletProvider: Send + Sync + 'static {
    /// Request account access. Returns granted accounts in order; the first is active.
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Signer for a granted account.
    async fn signer_for(&self, account: &Address) -> Result<SignerHandle>;

    /// Stream of account-list changes reported by the provider.
    fn account_changes(&self) -> broadcast::Receiver<Vec<Address>>;
}

#[derive(Debug, Clone)]
struct LocalAccount {
    label: String,
    address: Address,
}

/// In-process wallet with deterministic accounts derived from labels.
pub struct LocalWallet {
    accounts: RwLock<Vec<LocalAccount>>,
    changes: broadcast::Sender<Vec<Address>>,
}

impl LocalWallet {
    /// Create a wallet with no granted accounts.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            accounts: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Create a wallet granting `labels` in order.
    pub fn with_accounts(labels: &[&str]) -> Result<Self> {
        let wallet = Self::new();
        for label in labels {
            wallet.grant(label)?;
        }
        Ok(wallet)
    }

    /// Grant access to the account for `label`, appending it to the list.
    pub fn grant(&self, label: &str) -> Result<Address> {
        let address = SignerHandle::for_label(label)?.address();
        {
            let mut accounts = self.accounts.write();
            if !accounts.iter().any(|a| a.address == address) {
                accounts.push(LocalAccount {
                    label: label.to_string(),
                    address,
                });
            }
        }
        self.notify();
        Ok(address)
    }

    /// Make the account for `label` active, granting it if needed.
    pub fn switch_account(&self, label: &str) -> Result<Address> {
        let address = SignerHandle::for_label(label)?.address();
        {
            let mut accounts = self.accounts.write();
            accounts.retain(|a| a.address != address);
            accounts.insert(
                0,
                LocalAccount {
                    label: label.to_string(),
                    address,
                },
            );
        }
        tracing::debug!(active = %address, "Local wallet switched active account");
        self.notify();
        Ok(address)
    }

    /// Withdraw every grant.
    pub fn revoke_all(&self) {
        self.accounts.write().clear();
        self.notify();
    }

    fn addresses(&self) -> Vec<Address> {
        self.accounts.read().iter().map(|a| a.address).collect()
    }

    fn notify(&self) {
        // No receivers is fine
        let _ = self.changes.send(self.addresses());
    }
}

impl Default for LocalWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.addresses())
    }

    async fn signer_for(&self, account: &Address) -> Result<SignerHandle> {
        let label = self
            .accounts
            .read()
            .iter()
            .find(|a| &a.address == account)
            .map(|a| a.label.clone())
            .ok_or_else(|| {
                EscrowError::identity_unavailable(format!("account {} is not granted", account))
            })?;
        Ok(SignerHandle::for_label(&label)?)
    }

    fn account_changes(&self) -> broadcast::Receiver<Vec<Address>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accounts_in_grant_order() {
        let wallet = LocalWallet::with_accounts(&["alice", "bob"]).unwrap();
        let accounts = wallet.request_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0], SignerHandle::for_label("alice").unwrap().address());
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let wallet = LocalWallet::new();
        wallet.grant("alice").unwrap();
        wallet.grant("alice").unwrap();
        assert_eq!(wallet.request_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_signer_for_ungranted_account() {
        let wallet = LocalWallet::with_accounts(&["alice"]).unwrap();
        let bob = SignerHandle::for_label("bob").unwrap().address();
        let err = wallet.signer_for(&bob).await.unwrap_err();
        assert_eq!(err.error_code(), "IDENTITY_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_switch_account_reports_change() {
        let wallet = LocalWallet::with_accounts(&["alice", "bob"]).unwrap();
        let mut changes = wallet.account_changes();
        let bob = wallet.switch_account("bob").unwrap();
        let reported = changes.recv().await.unwrap();
        assert_eq!(reported[0], bob);
        assert_eq!(reported.len(), 2);
    }
}
