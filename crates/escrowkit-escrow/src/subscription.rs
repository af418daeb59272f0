//! Cancellable watcher task handle.

use escrowkit_types::Address;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running approval watch for one contract.
///
/// Dropping the subscription cancels the task.
#[derive(Debug)]
pub struct Subscription {
    contract: Address,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(contract: Address, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            contract,
            token,
            task: Some(task),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Still listening for events
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the watch and wait for the task to exit
    pub async fn unsubscribe(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(contract = %self.contract, error = %e, "Approval watcher ended abnormally");
            }
        }
        tracing::debug!(contract = %self.contract, "Approval watch unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
