//! Demo command - the full escrow lifecycle on the local chain

use std::sync::Arc;

use colored::*;
use escrowkit_chain::{ExternalLedger, LocalChain};
use escrowkit_escrow::{ControllerEvent, EscrowConfig, EscrowController};
use escrowkit_types::Wei;
use escrowkit_wallet::{LocalWallet, SignerHandle};

use crate::display;

/// Options for [`run_demo`]
pub struct DemoOptions {
    pub depositor_label: String,
    pub arbiter_label: String,
    pub beneficiary_label: String,
    pub eth: String,
    pub escrows: u32,
}

/// Deploy escrows as the depositor, then switch to the arbiter and approve them
pub async fn run_demo(config: &EscrowConfig, options: DemoOptions) -> anyhow::Result<()> {
    println!("{}", "Escrow Lifecycle Demo".bright_white().bold());
    println!();

    let deposit = Wei::parse_ether(&options.eth)?;
    let chain = Arc::new(LocalChain::new());
    let wallet = LocalWallet::with_accounts(&[options.depositor_label.as_str()])?;
    let controller = EscrowController::open(chain.clone(), config)?;
    let mut events = controller.subscribe();

    // Step 1: identity
    display::section("Step 1: Resolve identity");
    let depositor = controller.resolve_identity(&wallet).await?;
    chain.fund(depositor, Wei::from_ether(config.demo_funding_eth));
    display::success(&format!("Depositor {} ({})", options.depositor_label, depositor));
    display::kv("Balance", &format!("{} ETH", chain.balance_of(&depositor).await?.format_ether()));

    // Step 2: deploy
    display::section("Step 2: Deploy escrows");
    let arbiter = SignerHandle::for_label(&options.arbiter_label)?.address();
    let beneficiary = SignerHandle::for_label(&options.beneficiary_label)?.address();
    let mut contracts = Vec::new();
    for _ in 0..options.escrows {
        match controller
            .deploy(&arbiter.to_string(), &beneficiary.to_string(), &deposit.to_string())
            .await
        {
            Ok(escrow) => {
                display::success(&format!("Deployed {}", escrow.contract_address));
                contracts.push(escrow.contract_address);
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.error_code(), "Demo deployment failed");
                display::error(&format!("Deployment failed: {}", e));
            }
        }
    }
    for escrow in controller.escrows().await {
        display::escrow(&escrow);
    }

    // Step 3: approve as the arbiter
    display::section("Step 3: Approve as arbiter");
    wallet.switch_account(&options.arbiter_label)?;
    if controller.identity().is_none() {
        display::warning("Wallet account changed, depositor session invalidated");
    }
    let approver = controller.resolve_identity(&wallet).await?;
    display::info(&format!("Arbiter {} ({})", options.arbiter_label, approver));

    for contract in contracts.iter().rev() {
        match controller.approve(contract).await {
            Ok(record) => {
                display::success(&format!("Approved {} ({} wei)", record.tx, record.value));
                let stored = controller.approved_records().await;
                if let Some(earlier) = stored.iter().find(|r| r.tx == record.tx && **r != record) {
                    tracing::warn!(contract = %contract, stored_value = %earlier.value, "Ledger holds a record from an earlier run");
                    display::warning(&format!(
                        "Ledger already held a record for {} from an earlier run ({} wei); it was kept",
                        contract, earlier.value
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(contract = %contract, error = %e, "Demo approval failed");
                display::error(&format!("Approval of {} failed: {}", contract, e));
            }
        }
    }

    // Step 4: results
    display::section("Step 4: Results");
    for escrow in controller.escrows().await {
        display::escrow(&escrow);
    }
    println!();
    println!("{}", "Approved records".bright_white().bold());
    for record in controller.approved_records().await {
        display::record(&record);
    }
    display::kv(
        "Beneficiary balance",
        &format!("{} ETH", chain.balance_of(&beneficiary).await?.format_ether()),
    );

    println!();
    println!("{}", "Lifecycle events".bright_white().bold());
    while let Ok(event) = events.try_recv() {
        let label = match &event {
            ControllerEvent::Approved { .. } => event.event_type().bright_green(),
            ControllerEvent::ApprovalFailed { .. } => event.event_type().bright_red(),
            _ => event.event_type().bright_cyan(),
        };
        println!("  {} {:20} {}", "●".bright_black(), label, event.contract());
    }

    controller.shutdown().await;
    println!();
    display::info(&format!("Records stored in {}", config.ledger_path().display()));
    Ok(())
}
