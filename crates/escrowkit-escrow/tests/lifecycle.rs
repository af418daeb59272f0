//! End-to-end escrow lifecycle against the local chain.

use std::sync::Arc;
use std::time::Duration;

use escrowkit_chain::{ExternalLedger, LocalChain, SignedTransaction, TxPayload};
use escrowkit_escrow::{ApprovalStatus, ControllerEvent, EscrowConfig, EscrowController};
use escrowkit_ledger::{ApprovalLedger, MemoryStore, DEFAULT_STORAGE_KEY};
use escrowkit_types::{Address, EscrowError, EscrowState, Wei};
use escrowkit_wallet::{LocalWallet, SignerHandle};

const ONE_ETHER: &str = "1000000000000000000";

struct Harness {
    chain: Arc<LocalChain>,
    wallet: LocalWallet,
    controller: EscrowController,
    arbiter: Address,
    beneficiary: Address,
}

fn label_address(label: &str) -> Address {
    SignerHandle::for_label(label).unwrap().address()
}

async fn harness_on(chain: Arc<LocalChain>, controller: EscrowController) -> Harness {
    let wallet = LocalWallet::with_accounts(&["arbiter"]).unwrap();
    let arbiter = controller.resolve_identity(&wallet).await.unwrap();
    chain.fund(arbiter, Wei::from_ether(100));
    Harness {
        chain,
        wallet,
        controller,
        arbiter,
        beneficiary: label_address("beneficiary"),
    }
}

async fn harness() -> Harness {
    let chain = Arc::new(LocalChain::new());
    let ledger = ApprovalLedger::open(Arc::new(MemoryStore::new()), DEFAULT_STORAGE_KEY).unwrap();
    let controller = EscrowController::new(chain.clone(), ledger);
    harness_on(chain, controller).await
}

impl Harness {
    async fn deploy(&self, value: &str) -> Address {
        self.controller
            .deploy(&self.arbiter.to_string(), &self.beneficiary.to_string(), value)
            .await
            .unwrap()
            .contract_address
    }
}

#[tokio::test]
async fn test_deploy_then_approve_commits_one_record() {
    let h = harness().await;
    let contract = h.deploy(ONE_ETHER).await;

    let escrows = h.controller.escrows().await;
    assert_eq!(escrows.len(), 1);
    assert_eq!(escrows[0].state, EscrowState::Pending);
    assert_eq!(h.controller.approval_status(&contract).await.unwrap(), ApprovalStatus::Idle);

    let record = h.controller.approve(&contract).await.unwrap();
    assert_eq!(record.tx, contract);
    assert_eq!(record.arbiter, h.arbiter);
    assert_eq!(record.beneficiary, h.beneficiary);
    assert_eq!(record.sender_address, h.arbiter);
    assert_eq!(record.value, Wei::from_ether(1));

    assert_eq!(h.controller.escrow(&contract).await.unwrap().state, EscrowState::Approved);
    assert_eq!(h.controller.approved_records().await, vec![record]);
    assert_eq!(h.chain.balance_of(&h.beneficiary).await.unwrap(), Wei::from_ether(1));
}

#[tokio::test]
async fn test_state_changes_only_after_confirmed_event() {
    let h = harness().await;
    let contract = h.deploy("5").await;

    h.chain.set_auto_mine(false);
    let pending = h.controller.request_approval(&contract).await.unwrap();

    assert!(matches!(
        h.controller.approval_status(&contract).await.unwrap(),
        ApprovalStatus::Awaiting { .. }
    ));
    assert_eq!(h.controller.escrow(&contract).await.unwrap().state, EscrowState::Pending);
    assert!(h.controller.approved_records().await.is_empty());

    h.chain.mine();
    pending.wait().await.unwrap();
    let record = h
        .controller
        .wait_for_approval(&contract, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.tx, contract);
    assert!(h.controller.approval_status(&contract).await.unwrap().is_terminal());
}

#[tokio::test]
async fn test_redelivered_event_commits_once() {
    let h = harness().await;
    let contract = h.deploy(ONE_ETHER).await;
    h.controller.approve(&contract).await.unwrap();

    assert_eq!(h.chain.redeliver(&contract), 1);
    assert_eq!(h.chain.redeliver(&contract), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.controller.approved_records().await.len(), 1);
    assert_eq!(h.controller.escrow(&contract).await.unwrap().state, EscrowState::Approved);
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EscrowConfig::with_data_dir(dir.path());
    let chain = Arc::new(LocalChain::new());

    let first = {
        let controller = EscrowController::open(chain.clone(), &config).unwrap();
        let h = harness_on(chain.clone(), controller).await;
        let a = h.deploy(ONE_ETHER).await;
        let b = h.deploy("42").await;
        h.controller.approve(&a).await.unwrap();
        h.controller.approve(&b).await.unwrap();
        let records = h.controller.approved_records().await;
        h.controller.shutdown().await;
        records
    };

    let restarted = EscrowController::open(chain, &config).unwrap();
    let restored = restarted.approved_records().await;
    assert_eq!(restored.len(), 2);
    for record in &first {
        assert!(restored.contains(record));
    }
    assert!(restarted.escrows().await.is_empty());
}

#[tokio::test]
async fn test_invalid_deposit_creates_no_entry() {
    let h = harness().await;
    for bad in ["-1", "1.5", "ten"] {
        let err = h
            .controller
            .deploy(&h.arbiter.to_string(), &h.beneficiary.to_string(), bad)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidParameter { .. }), "input {:?}", bad);
    }
    let err = h
        .controller
        .deploy("0xA1", &h.beneficiary.to_string(), "1")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_PARAMETER");

    assert!(h.controller.escrows().await.is_empty());
    assert_eq!(h.chain.block_number(), 0);
}

#[tokio::test]
async fn test_escrows_approved_out_of_order_are_independent() {
    let h = harness().await;
    let first = h.deploy("100").await;
    let second = h.deploy("200").await;
    assert_ne!(first, second);

    h.controller.approve(&second).await.unwrap();
    assert_eq!(h.controller.escrow(&first).await.unwrap().state, EscrowState::Pending);
    assert_eq!(h.controller.escrow(&second).await.unwrap().state, EscrowState::Approved);

    h.controller.approve(&first).await.unwrap();
    let records = h.controller.approved_records().await;
    assert_eq!(records.iter().map(|r| r.tx).collect::<Vec<_>>(), vec![second, first]);
    assert_eq!(records[0].value, Wei(200));
    assert_eq!(records[1].value, Wei(100));

    let order: Vec<Address> = h.controller.escrows().await.iter().map(|e| e.contract_address).collect();
    assert_eq!(order, vec![first, second]);
}

#[tokio::test]
async fn test_non_arbiter_approval_fails_and_keeps_waiting() {
    let h = harness().await;
    let contract = h
        .controller
        .deploy(
            &label_address("someone-else").to_string(),
            &h.beneficiary.to_string(),
            "7",
        )
        .await
        .unwrap()
        .contract_address;
    let mut events = h.controller.subscribe();

    let err = h.controller.approve(&contract).await.unwrap_err();
    match err {
        EscrowError::ApprovalFailed { contract: failed, reason } => {
            assert_eq!(failed, contract.to_string());
            assert!(reason.contains("only the arbiter"));
        }
        other => panic!("unexpected error {:?}", other),
    }

    assert!(matches!(
        h.controller.approval_status(&contract).await.unwrap(),
        ApprovalStatus::Awaiting { .. }
    ));
    assert_eq!(h.controller.escrow(&contract).await.unwrap().state, EscrowState::Pending);
    assert!(h.controller.approved_records().await.is_empty());

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::ApprovalFailed { contract: c, .. } = event {
            saw_failure |= c == contract;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn test_declined_deployment_creates_no_entry() {
    let h = harness().await;
    h.chain.reject_next("user declined signing");

    let err = h
        .controller
        .deploy(&h.arbiter.to_string(), &h.beneficiary.to_string(), ONE_ETHER)
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::RemoteRejected { .. }));
    assert!(!err.is_retriable());
    assert!(h.controller.escrows().await.is_empty());
}

#[tokio::test]
async fn test_insufficient_funds_is_remote_rejection() {
    let h = harness().await;
    let err = h
        .controller
        .deploy(
            &h.arbiter.to_string(),
            &h.beneficiary.to_string(),
            &Wei::from_ether(1_000).to_string(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "REMOTE_REJECTED");
    assert!(h.controller.escrows().await.is_empty());
}

#[tokio::test]
async fn test_unsubscribe_stops_watch() {
    let h = harness().await;
    let contract = h.deploy("9").await;

    h.chain.set_auto_mine(false);
    h.controller.request_approval(&contract).await.unwrap();
    assert_eq!(h.controller.active_watches(), 1);

    assert!(h.controller.unsubscribe(&contract).await);
    assert!(!h.controller.unsubscribe(&contract).await);
    assert_eq!(h.controller.active_watches(), 0);
    assert_eq!(h.controller.approval_status(&contract).await.unwrap(), ApprovalStatus::Idle);

    h.chain.mine();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.controller.escrow(&contract).await.unwrap().state, EscrowState::Pending);
    assert!(h.controller.approved_records().await.is_empty());

    let err = h.controller.wait_for_approval(&contract, None).await.unwrap_err();
    assert!(matches!(err, EscrowError::ApprovalPending { .. }));
}

#[tokio::test]
async fn test_wait_times_out_as_pending() {
    let h = harness().await;
    let contract = h.deploy("9").await;
    h.chain.set_auto_mine(false);
    h.controller.request_approval(&contract).await.unwrap();

    let err = h
        .controller
        .wait_for_approval(&contract, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "APPROVAL_PENDING");
}

#[tokio::test]
async fn test_account_switch_blocks_new_transactions() {
    let h = harness().await;
    let contract = h.deploy("3").await;

    h.chain.set_auto_mine(false);
    let pending = h.controller.request_approval(&contract).await.unwrap();

    h.wallet.switch_account("depositor").unwrap();
    let err = h
        .controller
        .deploy(&h.arbiter.to_string(), &h.beneficiary.to_string(), "1")
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::IdentityUnavailable { .. }));
    assert_eq!(h.controller.identity(), None);

    // The watcher is bound to the contract and still completes
    h.chain.mine();
    pending.wait().await.unwrap();
    let record = h
        .controller
        .wait_for_approval(&contract, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.sender_address, h.arbiter);

    let depositor = h.controller.resolve_identity(&h.wallet).await.unwrap();
    assert_eq!(depositor, label_address("depositor"));
    assert_eq!(h.controller.identity(), Some(depositor));
}

#[tokio::test]
async fn test_unknown_contract_is_not_found() {
    let h = harness().await;
    let err = h
        .controller
        .request_approval(&Address::from_bytes([0xee; 20]))
        .await
        .unwrap_err();
    assert!(err.is_local());
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let h = harness().await;
    let mut events = h.controller.subscribe();
    let contract = h.deploy(ONE_ETHER).await;
    h.controller.approve(&contract).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.contract(), contract);
        kinds.push(event.event_type());
    }
    assert_eq!(kinds, vec!["deployed", "approval_requested", "approved"]);
}

#[tokio::test]
async fn test_watch_ends_once_approved() {
    let h = harness().await;
    for value in ["1", "2", "3", "4", "5"] {
        let contract = h.deploy(value).await;
        h.controller.approve(&contract).await.unwrap();
    }
    assert_eq!(h.controller.active_watches(), 0);
    assert_eq!(h.controller.approved_records().await.len(), 5);

    // Approving an approved escrow reverts on chain and starts no new watch
    let first = h.controller.escrows().await[0].contract_address;
    let err = h.controller.approve(&first).await.unwrap_err();
    assert!(matches!(err, EscrowError::ApprovalFailed { .. }));
    assert_eq!(h.controller.active_watches(), 0);
}

#[tokio::test]
async fn test_rerun_on_fresh_chain_reports_its_own_deposit() {
    let dir = tempfile::tempdir().unwrap();
    let config = EscrowConfig::with_data_dir(dir.path());

    let mut contracts = Vec::new();
    for value in ["1000", "2000"] {
        let chain = Arc::new(LocalChain::new());
        let controller = EscrowController::open(chain.clone(), &config).unwrap();
        let h = harness_on(chain, controller).await;
        let contract = h.deploy(value).await;

        let record = h.controller.approve(&contract).await.unwrap();
        assert_eq!(record.value.to_string(), value);
        contracts.push(contract);
        h.controller.shutdown().await;
    }

    // Same deployer and nonce on a fresh chain yields the same address
    assert_eq!(contracts[0], contracts[1]);
    let reopened = EscrowController::open(Arc::new(LocalChain::new()), &config).unwrap();
    let stored = reopened.approved_records().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].value, Wei(1000));
}

#[tokio::test]
async fn test_outside_approval_names_the_arbiter() {
    let h = harness().await;
    let outside = SignerHandle::for_label("outside-arbiter").unwrap();
    let contract = h
        .controller
        .deploy(&outside.address().to_string(), &h.beneficiary.to_string(), "9")
        .await
        .unwrap()
        .contract_address;

    // Our identity is not the arbiter, so this reverts and the watcher keeps waiting
    h.controller.approve(&contract).await.unwrap_err();
    assert_eq!(
        h.controller.approval_status(&contract).await.unwrap(),
        ApprovalStatus::Awaiting { requested_by: h.arbiter }
    );

    let tx = SignedTransaction::sign(&outside, TxPayload::Approve { contract }).unwrap();
    let hash = h.chain.submit(tx).await.unwrap();
    h.chain.confirm(&hash).await.unwrap();

    let record = h
        .controller
        .wait_for_approval(&contract, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.sender_address, outside.address());
    assert_eq!(h.controller.approved_records().await[0].sender_address, outside.address());
}
