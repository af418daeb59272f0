//! Identity session: the active signing identity for this process.

use std::sync::atomic::{AtomicBool, Ordering};

use escrowkit_types::{Address, EscrowError, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::provider::WalletProvider;
use crate::vault::SignerHandle;

/// The resolved active identity.
///
/// Resolved once per process. If the provider later reports that the active
/// account changed, the session is invalidated and refuses to lend its signer;
/// it is never silently re-resolved.
pub struct IdentitySession {
    address: Address,
    signer: SignerHandle,
    changes: Mutex<broadcast::Receiver<Vec<Address>>>,
    valid: AtomicBool,
}

impl IdentitySession {
    /// Request account access and bind the first granted account.
    pub async fn resolve<P>(provider: &P) -> Result<Self>
    where
        P: WalletProvider + ?Sized,
    {
        // Subscribe first so a change racing the grant is not missed
        let changes = provider.account_changes();
        let accounts = provider.request_accounts().await?;
        let address = *accounts
            .first()
            .ok_or_else(|| EscrowError::identity_unavailable("wallet granted no accounts"))?;
        let signer = provider.signer_for(&address).await?;
        if signer.address() != address {
            return Err(EscrowError::identity_unavailable(format!(
                "provider returned signer {} for account {}",
                signer.address(),
                address
            )));
        }

        tracing::info!(address = %address, "Identity session resolved");
        Ok(Self {
            address,
            signer,
            changes: Mutex::new(changes),
            valid: AtomicBool::new(true),
        })
    }

    /// Active identity, lowercase hex.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Drain pending provider notifications and report whether the session still holds.
    pub fn refresh_validity(&self) -> bool {
        if !self.valid.load(Ordering::Acquire) {
            return false;
        }
        let mut changes = self.changes.lock();
        loop {
            match changes.try_recv() {
                Ok(accounts) => {
                    if accounts.first() != Some(&self.address) {
                        self.invalidate();
                        return false;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed account notifications, invalidating session");
                    self.invalidate();
                    return false;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return true,
            }
        }
    }

    /// Whether the session is still valid (without draining notifications).
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the session unusable.
    pub fn invalidate(&self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            tracing::warn!(address = %self.address, "Identity session invalidated by account change");
        }
    }

    /// Borrow the signer for one operation.
    pub fn signer(&self) -> Result<&SignerHandle> {
        if !self.refresh_validity() {
            return Err(EscrowError::identity_unavailable(format!(
                "session for {} was invalidated by an account change",
                self.address
            )));
        }
        Ok(&self.signer)
    }
}

impl std::fmt::Debug for IdentitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySession")
            .field("address", &self.address)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
