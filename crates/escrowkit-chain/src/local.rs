//! LocalChain: an in-process external ledger with the escrow ABI built in.
//!
//! Used by the test suites and the CLI demo. It behaves like a single-node
//! chain:
//!
//! - signatures are checked against the sender address on submit
//! - transactions sit in a mempool until a block is mined (immediately when
//!   auto-mine is on, otherwise on [`LocalChain::mine`])
//! - contract addresses are `keccak256(rlp([sender, nonce]))[12..]`
//! - `Approved` is published to subscribers only after its block is mined
//!
//! Test hooks: [`LocalChain::reject_next`] simulates a user declining to sign,
//! [`LocalChain::redeliver`] replays delivered events (duplicate delivery).

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use escrowkit_types::{Address, ContractEvent, ContractEventKind, EscrowError, Result, TxHash, Wei};
use escrowkit_wallet::keccak256;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};

use crate::ledger::ExternalLedger;
use crate::transaction::{SignedTransaction, TxPayload, TxReceipt, TxStatus};

/// On-chain state of one escrow instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowContractState {
    pub depositor: Address,
    pub arbiter: Address,
    pub beneficiary: Address,
    /// Value still held by the contract
    pub balance: Wei,
    pub is_approved: bool,
}

#[derive(Default)]
struct ChainState {
    block_number: u64,
    balances: HashMap<Address, Wei>,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, EscrowContractState>,
    mempool: Vec<(TxHash, SignedTransaction)>,
    receipts: HashMap<TxHash, TxReceipt>,
    reject_next: Option<String>,
    manual_mining: bool,
    submitted: u64,
}

/// In-process single-node ledger
pub struct LocalChain {
    state: Mutex<ChainState>,
    /// Per-contract live event broadcasters
    topics: DashMap<Address, broadcast::Sender<ContractEvent>>,
    /// Every event published so far, per contract
    history: DashMap<Address, Vec<ContractEvent>>,
    mined: Notify,
}

impl Default for LocalChain {
    fn default() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            topics: DashMap::new(),
            history: DashMap::new(),
            mined: Notify::new(),
        }
    }
}

impl LocalChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit native balance to an account
    pub fn fund(&self, account: Address, amount: Wei) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(account).or_default();
        *balance = balance.checked_add(amount).unwrap_or(Wei(u128::MAX));
    }

    /// Turn automatic mining on submit on or off
    pub fn set_auto_mine(&self, enabled: bool) {
        self.state.lock().manual_mining = !enabled;
    }

    /// Refuse the next submitted transaction with `reason`
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state.lock().reject_next = Some(reason.into());
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().block_number
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().mempool.len()
    }

    /// Snapshot of a deployed contract
    pub fn contract_state(&self, contract: &Address) -> Option<EscrowContractState> {
        self.state.lock().contracts.get(contract).cloned()
    }

    /// Mine every pending transaction into one block and publish its events.
    ///
    /// Returns the new block number.
    pub fn mine(&self) -> u64 {
        let (block, events) = {
            let mut state = self.state.lock();
            state.block_number += 1;
            let block = state.block_number;
            let pending = std::mem::take(&mut state.mempool);
            let mut events = Vec::new();
            for (hash, tx) in pending {
                let receipt = execute(&mut state, block, hash, tx);
                events.extend(receipt.events.iter().cloned());
                state.receipts.insert(hash, receipt);
            }
            (block, events)
        };

        for event in events {
            self.publish(event);
        }
        self.mined.notify_waiters();
        block
    }

    /// Deliver every already-published event of `contract` again.
    ///
    /// Returns the number of events redelivered.
    pub fn redeliver(&self, contract: &Address) -> usize {
        let events = self
            .history
            .get(contract)
            .map(|h| h.value().clone())
            .unwrap_or_default();
        if let Some(topic) = self.topics.get(contract) {
            for event in &events {
                let _ = topic.send(event.clone());
            }
        }
        events.len()
    }

    fn publish(&self, event: ContractEvent) {
        tracing::debug!(contract = %event.contract, block = event.block_number, "Publishing contract event");
        self.history
            .entry(event.contract)
            .or_default()
            .push(event.clone());
        if let Some(topic) = self.topics.get(&event.contract) {
            // No subscribers is fine
            let _ = topic.send(event);
        }
    }
}

/// Apply one transaction to the chain state
fn execute(state: &mut ChainState, block: u64, tx_hash: TxHash, tx: SignedTransaction) -> TxReceipt {
    let from = tx.from;
    let mut receipt = TxReceipt {
        tx_hash,
        from,
        block_number: block,
        status: TxStatus::Success,
        contract_address: None,
        events: Vec::new(),
    };

    let outcome = match tx.payload {
        TxPayload::Deploy {
            arbiter,
            beneficiary,
            value,
        } => deploy_contract(state, from, arbiter, beneficiary, value).map(|address| {
            receipt.contract_address = Some(address);
        }),
        TxPayload::Approve { contract } => approve_contract(state, from, contract).map(|()| {
            receipt.events.push(ContractEvent {
                contract,
                kind: ContractEventKind::Approved,
                sender: from,
                tx_hash,
                block_number: block,
            });
        }),
    };

    *state.nonces.entry(from).or_default() += 1;
    if let Err(reason) = outcome {
        receipt.status = TxStatus::Reverted { reason };
    }
    receipt
}

fn deploy_contract(
    state: &mut ChainState,
    from: Address,
    arbiter: Address,
    beneficiary: Address,
    value: Wei,
) -> std::result::Result<Address, String> {
    let available = state.balances.get(&from).copied().unwrap_or_default();
    let remaining = available
        .checked_sub(value)
        .ok_or_else(|| format!("insufficient funds: have {} wei, need {} wei", available, value))?;
    let nonce = state.nonces.get(&from).copied().unwrap_or(0);
    let address = create_address(&from, nonce);

    state.balances.insert(from, remaining);
    state.contracts.insert(
        address,
        EscrowContractState {
            depositor: from,
            arbiter,
            beneficiary,
            balance: value,
            is_approved: false,
        },
    );
    Ok(address)
}

fn approve_contract(
    state: &mut ChainState,
    from: Address,
    contract: Address,
) -> std::result::Result<(), String> {
    let escrow = state
        .contracts
        .get_mut(&contract)
        .ok_or_else(|| format!("no contract at {}", contract))?;
    if from != escrow.arbiter {
        return Err("only the arbiter can approve".to_string());
    }
    if escrow.is_approved {
        return Err("escrow already approved".to_string());
    }
    let payout = escrow.balance;
    let beneficiary = escrow.beneficiary;
    escrow.balance = Wei::ZERO;
    escrow.is_approved = true;

    let balance = state.balances.entry(beneficiary).or_default();
    *balance = balance.checked_add(payout).unwrap_or(Wei(u128::MAX));
    Ok(())
}

/// Address of a contract created by `sender` at `nonce`
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    // rlp([sender, nonce]); the payload is always shorter than 56 bytes
    let nonce_bytes: Vec<u8> = nonce
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect();
    let mut item = Vec::with_capacity(9);
    match nonce_bytes.as_slice() {
        [] => item.push(0x80),
        [b] if *b < 0x80 => item.push(*b),
        bytes => {
            item.push(0x80 + bytes.len() as u8);
            item.extend_from_slice(bytes);
        }
    }

    let mut rlp = Vec::with_capacity(32);
    rlp.push(0xc0 + (21 + item.len()) as u8);
    rlp.push(0x80 + 20);
    rlp.extend_from_slice(sender.as_bytes());
    rlp.extend_from_slice(&item);

    let hash = keccak256(&rlp);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::from_bytes(out)
}

#[async_trait]
impl ExternalLedger for LocalChain {
    async fn submit(&self, tx: SignedTransaction) -> Result<TxHash> {
        let operation = tx.payload.operation();
        {
            let mut state = self.state.lock();
            if let Some(reason) = state.reject_next.take() {
                return Err(EscrowError::remote_rejected(operation, reason));
            }
        }
        tx.verify()?;
        let digest = tx.hash()?;

        let (hash, auto_mine) = {
            let mut state = self.state.lock();
            // Identical signed payloads still get distinct hashes
            state.submitted += 1;
            let mut preimage = digest.as_bytes().to_vec();
            preimage.extend_from_slice(&state.submitted.to_be_bytes());
            let hash = TxHash::from_bytes(keccak256(&preimage));
            state.mempool.push((hash, tx));
            (hash, !state.manual_mining)
        };

        if auto_mine {
            self.mine();
        }
        Ok(hash)
    }

    async fn confirm(&self, tx_hash: &TxHash) -> Result<TxReceipt> {
        loop {
            // Register before checking so a block mined in between still wakes us
            let notified = self.mined.notified();
            {
                let state = self.state.lock();
                if let Some(receipt) = state.receipts.get(tx_hash) {
                    return match &receipt.status {
                        TxStatus::Success => Ok(receipt.clone()),
                        TxStatus::Reverted { reason } => Err(EscrowError::remote_rejected(
                            format!("transaction {}", tx_hash),
                            reason.clone(),
                        )),
                    };
                }
                if !state.mempool.iter().any(|(h, _)| h == tx_hash) {
                    return Err(EscrowError::remote_rejected(
                        format!("transaction {}", tx_hash),
                        "unknown transaction",
                    ));
                }
            }
            notified.await;
        }
    }

    fn subscribe(&self, contract: &Address) -> broadcast::Receiver<ContractEvent> {
        self.topics
            .entry(*contract)
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }

    async fn balance_of(&self, account: &Address) -> Result<Wei> {
        Ok(self
            .state
            .lock()
            .balances
            .get(account)
            .copied()
            .unwrap_or_default())
    }
}
