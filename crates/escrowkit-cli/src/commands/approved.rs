//! Approved commands - inspect and clear the durable ledger

use std::sync::Arc;

use colored::*;
use escrowkit_escrow::EscrowConfig;
use escrowkit_ledger::{ApprovalLedger, SledStore};

use crate::display;

fn open_ledger(config: &EscrowConfig) -> anyhow::Result<ApprovalLedger> {
    let store = Arc::new(SledStore::open(config.ledger_path())?);
    Ok(ApprovalLedger::open(store, config.storage_key.clone())?)
}

/// Print every stored approval record
pub fn list(config: &EscrowConfig, json: bool) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(ledger.records())?);
        return Ok(());
    }

    println!("{}", "Approved Escrows".bright_white().bold());
    println!("{}", "─".repeat(60));
    if ledger.is_empty() {
        println!("  {}", "No approved escrows yet".yellow());
        return Ok(());
    }
    for record in ledger.records() {
        display::record(record);
    }
    println!();
    display::info(&format!("{} record(s) under key {}", ledger.len(), ledger.key()));
    Ok(())
}

/// Remove every stored approval record
pub fn clear(config: &EscrowConfig, yes: bool) -> anyhow::Result<()> {
    let mut ledger = open_ledger(config)?;
    if !yes {
        display::warning(&format!(
            "This deletes {} record(s); re-run with --yes to confirm",
            ledger.len()
        ));
        return Ok(());
    }
    let removed = ledger.clear()?;
    display::success(&format!("Cleared {} approved record(s)", removed));
    Ok(())
}
