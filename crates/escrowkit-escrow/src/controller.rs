//! The escrow lifecycle controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use escrowkit_chain::{
    approval_failure, ApprovedStream, ContractHandle, DeployParams, Deployer, ExternalLedger,
    PendingTransaction,
};
use escrowkit_ledger::{ApprovalLedger, SledStore};
use escrowkit_types::{Address, ApprovedRecord, ContractEvent, Escrow, EscrowError, Result};
use escrowkit_wallet::{IdentitySession, WalletProvider};
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EscrowConfig;
use crate::events::ControllerEvent;
use crate::registry::EscrowRegistry;
use crate::subscription::Subscription;
use crate::watcher::{ApprovalStatus, ApprovalWatcher};

/// Registry, ledger and watcher states. Always mutated under one lock.
struct EscrowBook {
    registry: EscrowRegistry,
    ledger: ApprovalLedger,
    watchers: HashMap<Address, ApprovalWatcher>,
}

impl EscrowBook {
    /// Commit an observed `Approved` event.
    ///
    /// Returns the record only for the first accepted event of a contract.
    /// The sender is the account that signed the approving transaction. The
    /// ledger is written first, so a storage failure leaves the registry and
    /// watcher untouched.
    fn commit_approval(&mut self, event: &ContractEvent) -> Result<Option<ApprovedRecord>> {
        let contract = event.contract;
        match self.watchers.get(&contract) {
            Some(watcher) if watcher.accepts(event) => {}
            _ => return Ok(None),
        }

        let record = self
            .registry
            .get(&contract)
            .ok_or_else(|| EscrowError::not_found(contract))?
            .to_record(event.sender);

        match self.ledger.append(record.clone()) {
            Ok(()) => {}
            Err(e) if e.is_benign() => match self.ledger.get(&contract) {
                Some(stored) if stored != &record => {
                    tracing::warn!(
                        contract = %contract,
                        stored_value = %stored.value,
                        value = %record.value,
                        stored_sender = %stored.sender_address,
                        sender = %record.sender_address,
                        "Stored approval record differs from this approval, keeping stored record"
                    );
                }
                _ => {
                    tracing::warn!(contract = %contract, "Approval record already stored");
                }
            },
            Err(e) => return Err(e),
        }
        self.registry.mark_approved(&contract)?;
        if let Some(watcher) = self.watchers.get_mut(&contract) {
            watcher.observe(event);
        }
        Ok(Some(record))
    }

    /// `Some` once the approval is settled, `None` while still awaiting
    fn settled(&self, contract: &Address) -> Result<Option<ApprovedRecord>> {
        let watcher = self
            .watchers
            .get(contract)
            .ok_or_else(|| EscrowError::not_found(contract))?;
        match watcher.status() {
            ApprovalStatus::Awaiting { .. } => Ok(None),
            ApprovalStatus::Idle => Err(EscrowError::ApprovalPending {
                contract: contract.to_string(),
            }),
            ApprovalStatus::Approved { approved_by, .. } => {
                let record = self
                    .registry
                    .get(contract)
                    .ok_or_else(|| EscrowError::not_found(contract))?
                    .to_record(approved_by);
                Ok(Some(record))
            }
        }
    }
}

/// Drives escrows from deployment to a committed approval.
///
/// Owns the identity session, the [`EscrowRegistry`], the [`ApprovalLedger`]
/// and one watcher task per contract with an outstanding approval. A watcher
/// task ends once its approval is committed. Dropping the controller cancels
/// every watcher.
pub struct EscrowController {
    deployer: Deployer,
    session: RwLock<Option<Arc<IdentitySession>>>,
    book: Arc<Mutex<EscrowBook>>,
    handles: RwLock<HashMap<Address, ContractHandle>>,
    subscriptions: Arc<SyncMutex<HashMap<Address, Subscription>>>,
    events: broadcast::Sender<ControllerEvent>,
    watch_root: CancellationToken,
    approval_timeout: Option<Duration>,
}

impl EscrowController {
    /// Create a controller over `chain` committing approvals to `ledger`
    pub fn new(chain: Arc<dyn ExternalLedger>, ledger: ApprovalLedger) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            deployer: Deployer::new(chain),
            session: RwLock::new(None),
            book: Arc::new(Mutex::new(EscrowBook {
                registry: EscrowRegistry::new(),
                ledger,
                watchers: HashMap::new(),
            })),
            handles: RwLock::new(HashMap::new()),
            subscriptions: Arc::new(SyncMutex::new(HashMap::new())),
            events,
            watch_root: CancellationToken::new(),
            approval_timeout: None,
        }
    }

    /// Open the durable ledger described by `config` and build a controller on it
    pub fn open(chain: Arc<dyn ExternalLedger>, config: &EscrowConfig) -> Result<Self> {
        let store = Arc::new(SledStore::open(config.ledger_path())?);
        let ledger = ApprovalLedger::open(store, config.storage_key.clone())?;
        tracing::info!(
            path = %config.ledger_path().display(),
            records = ledger.len(),
            "Approval ledger opened"
        );
        Ok(Self::new(chain, ledger).with_approval_timeout(config.approval_timeout()))
    }

    /// Bound [`approve`](Self::approve) waits; `None` waits indefinitely
    pub fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout = timeout;
        self
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Request account access and bind the first granted account.
    ///
    /// Calling again replaces the session. Running watchers are bound to
    /// their contract, not the identity, and keep running.
    pub async fn resolve_identity<P>(&self, provider: &P) -> Result<Address>
    where
        P: WalletProvider + ?Sized,
    {
        let session = IdentitySession::resolve(provider).await?;
        let address = session.address();
        *self.session.write() = Some(Arc::new(session));
        Ok(address)
    }

    /// Active identity, if resolved and still valid
    pub fn identity(&self) -> Option<Address> {
        self.session
            .read()
            .as_ref()
            .filter(|s| s.refresh_validity())
            .map(|s| s.address())
    }

    fn active_session(&self) -> Result<Arc<IdentitySession>> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| EscrowError::identity_unavailable("no identity resolved"))
    }

    // ========================================================================
    // Deployment
    // ========================================================================

    /// Deploy a new escrow and register it as Pending.
    ///
    /// Input is validated before anything is sent. A rejected deployment
    /// leaves the registry untouched.
    pub async fn deploy(&self, arbiter: &str, beneficiary: &str, deposit_value: &str) -> Result<Escrow> {
        let params = DeployParams::parse(arbiter, beneficiary, deposit_value)?;
        let session = self.active_session()?;
        let signer = session.signer()?;
        let handle = self.deployer.deploy_params(signer, params).await?;

        let escrow = Escrow::pending(
            handle.address(),
            params.arbiter,
            params.beneficiary,
            params.deposit_value,
            session.address(),
        );
        {
            let mut book = self.book.lock().await;
            book.registry.add(escrow.clone())?;
            book.watchers
                .insert(escrow.contract_address, ApprovalWatcher::new(escrow.contract_address));
        }
        self.handles.write().insert(escrow.contract_address, handle);

        self.emit(ControllerEvent::Deployed {
            contract: escrow.contract_address,
            arbiter: escrow.arbiter,
            beneficiary: escrow.beneficiary,
            value: escrow.deposit_value,
            timestamp: Utc::now(),
        });
        Ok(escrow)
    }

    // ========================================================================
    // Approval
    // ========================================================================

    /// Start watching `contract` and issue `approve()` as the active identity.
    ///
    /// Returns once the transaction is submitted. The registry entry moves to
    /// Approved only when the confirmed `Approved` event arrives.
    pub async fn request_approval(&self, contract: &Address) -> Result<PendingTransaction> {
        let session = self.active_session()?;
        let signer = session.signer()?;
        let handle = self
            .handles
            .read()
            .get(contract)
            .cloned()
            .ok_or_else(|| EscrowError::not_found(contract))?;
        let requested_by = session.address();

        {
            // The watch task needs the book to commit, so no event is handled before both are in place
            let mut book = self.book.lock().await;
            let watcher = book
                .watchers
                .entry(*contract)
                .or_insert_with(|| ApprovalWatcher::new(*contract));
            if watcher.begin(requested_by) {
                self.ensure_watching(&handle);
            } else {
                tracing::debug!(contract = %contract, "Approval requested for an already approved escrow");
            }
        }

        let pending = match handle.request_approval(signer).await {
            Ok(pending) => pending,
            Err(e) => {
                let err = approval_failure(contract, e);
                self.report_failure(contract, &err);
                return Err(err);
            }
        };

        tracing::info!(contract = %contract, tx = %pending.hash(), by = %requested_by, "Approval requested");
        self.emit(ControllerEvent::ApprovalRequested {
            contract: *contract,
            tx_hash: pending.hash(),
            requested_by,
            timestamp: Utc::now(),
        });
        Ok(pending)
    }

    /// Request approval, wait for the transaction, then for the committed record.
    ///
    /// A rejected or reverted transaction fails with `ApprovalFailed`; the
    /// watcher keeps waiting and nothing is retried.
    pub async fn approve(&self, contract: &Address) -> Result<ApprovedRecord> {
        let updates = self.events.subscribe();
        let pending = self.request_approval(contract).await?;
        if let Err(e) = pending.wait().await {
            let err = approval_failure(contract, e);
            self.report_failure(contract, &err);
            return Err(err);
        }
        self.await_commit(updates, contract, self.approval_timeout).await
    }

    /// Wait until the approval of `contract` is committed.
    ///
    /// Fails with `ApprovalPending` if no approval is outstanding or `timeout`
    /// elapses first.
    pub async fn wait_for_approval(
        &self,
        contract: &Address,
        timeout: Option<Duration>,
    ) -> Result<ApprovedRecord> {
        let updates = self.events.subscribe();
        self.await_commit(updates, contract, timeout).await
    }

    pub async fn approval_status(&self, contract: &Address) -> Result<ApprovalStatus> {
        self.book
            .lock()
            .await
            .watchers
            .get(contract)
            .map(|w| w.status())
            .ok_or_else(|| EscrowError::not_found(contract))
    }

    /// Stop watching `contract`. Returns `false` if no watch was running.
    ///
    /// An outstanding request goes back to Idle; an event confirmed after
    /// this point is not observed.
    pub async fn unsubscribe(&self, contract: &Address) -> bool {
        let subscription = self.subscriptions.lock().remove(contract);
        let Some(subscription) = subscription else {
            return false;
        };
        subscription.unsubscribe().await;

        let abandoned = {
            let mut book = self.book.lock().await;
            match book.watchers.get_mut(contract) {
                Some(watcher) if !watcher.is_terminal() => {
                    watcher.reset();
                    true
                }
                _ => false,
            }
        };
        if abandoned {
            self.emit(ControllerEvent::WatchCancelled {
                contract: *contract,
                timestamp: Utc::now(),
            });
        }
        true
    }

    /// Number of running watcher tasks
    pub fn active_watches(&self) -> usize {
        self.subscriptions
            .lock()
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Escrows in deployment order
    pub async fn escrows(&self) -> Vec<Escrow> {
        self.book.lock().await.registry.list().to_vec()
    }

    pub async fn escrow(&self, contract: &Address) -> Result<Escrow> {
        self.book
            .lock()
            .await
            .registry
            .get(contract)
            .cloned()
            .ok_or_else(|| EscrowError::not_found(contract))
    }

    /// Every durable record, including those restored at startup
    pub async fn approved_records(&self) -> Vec<ApprovedRecord> {
        self.book.lock().await.ledger.records().to_vec()
    }

    /// Live lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Cancel every watcher and wait for the tasks to exit
    pub async fn shutdown(self) {
        self.watch_root.cancel();
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().drain().map(|(_, s)| s).collect();
        for subscription in subscriptions {
            subscription.unsubscribe().await;
        }
        tracing::debug!("Escrow controller shut down");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Caller holds the book lock
    fn ensure_watching(&self, handle: &ContractHandle) {
        let contract = handle.address();
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|_, s| s.is_active());
        if subscriptions.get(&contract).is_some_and(|s| s.is_active()) {
            return;
        }

        let token = self.watch_root.child_token();
        let task = tokio::spawn(watch_approvals(
            handle.on_approved(),
            self.book.clone(),
            self.subscriptions.clone(),
            self.events.clone(),
            token.clone(),
        ));
        subscriptions.insert(contract, Subscription::new(contract, token, task));
    }

    async fn await_commit(
        &self,
        mut updates: broadcast::Receiver<ControllerEvent>,
        contract: &Address,
        timeout: Option<Duration>,
    ) -> Result<ApprovedRecord> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.next_commit(&mut updates, contract))
                .await
                .unwrap_or_else(|_| {
                    Err(EscrowError::ApprovalPending {
                        contract: contract.to_string(),
                    })
                }),
            None => self.next_commit(&mut updates, contract).await,
        }
    }

    /// Re-check the book after every controller event until the approval settles
    async fn next_commit(
        &self,
        updates: &mut broadcast::Receiver<ControllerEvent>,
        contract: &Address,
    ) -> Result<ApprovedRecord> {
        loop {
            if let Some(record) = self.book.lock().await.settled(contract)? {
                return Ok(record);
            }
            match updates.recv().await {
                Ok(ControllerEvent::ApprovalFailed {
                    contract: failed,
                    reason,
                    ..
                }) if failed == *contract => {
                    return Err(EscrowError::ApprovalFailed {
                        contract: contract.to_string(),
                        reason,
                    });
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(EscrowError::internal("controller event channel closed"));
                }
            }
        }
    }

    fn report_failure(&self, contract: &Address, err: &EscrowError) {
        tracing::warn!(contract = %contract, error = %err, "Approval failed");
        let reason = match err {
            EscrowError::ApprovalFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        self.emit(ControllerEvent::ApprovalFailed {
            contract: *contract,
            reason,
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for EscrowController {
    fn drop(&mut self) {
        self.watch_root.cancel();
    }
}

impl std::fmt::Debug for EscrowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowController")
            .field("identity", &self.identity())
            .field("approval_timeout", &self.approval_timeout)
            .finish_non_exhaustive()
    }
}

/// Watcher task: commit the first accepted `Approved` event, then stop.
async fn watch_approvals(
    mut stream: ApprovedStream,
    book: Arc<Mutex<EscrowBook>>,
    subscriptions: Arc<SyncMutex<HashMap<Address, Subscription>>>,
    events: broadcast::Sender<ControllerEvent>,
    token: CancellationToken,
) {
    let contract = stream.contract();
    tracing::debug!(contract = %contract, "Approval watch started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            next = stream.next() => {
                let Some(event) = next else {
                    tracing::warn!(contract = %contract, "Event channel closed, approval watch ending");
                    break;
                };

                // Publish while holding the book so waiters never see the commit without the event
                let mut book = book.lock().await;
                let outcome = book.commit_approval(&event);
                match outcome {
                    Ok(Some(record)) => {
                        tracing::info!(
                            contract = %contract,
                            sender = %record.sender_address,
                            value = %record.value,
                            block = event.block_number,
                            "Escrow approved"
                        );
                        // Deregister before the book is released so a settled approval never shows a live watch
                        let finished = subscriptions.lock().remove(&contract);
                        let _ = events.send(ControllerEvent::Approved {
                            contract,
                            record,
                            block_number: event.block_number,
                            timestamp: Utc::now(),
                        });
                        drop(book);
                        drop(finished);
                        break;
                    }
                    Ok(None) => {
                        tracing::debug!(contract = %contract, block = event.block_number, "Ignoring approval event");
                    }
                    Err(e) => {
                        tracing::error!(contract = %contract, error = %e, "Failed to commit approval");
                        let _ = events.send(ControllerEvent::ApprovalFailed {
                            contract,
                            reason: e.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }
    }
    tracing::debug!(contract = %contract, "Approval watch stopped");
}
