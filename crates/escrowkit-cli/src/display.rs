//! Display utilities for the CLI

use colored::*;
use escrowkit_types::{ApprovedRecord, Escrow, EscrowState};

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", "━".repeat(60).bright_black());
    println!(" {}", title.bright_white().bold());
    println!("{}", "━".repeat(60).bright_black());
}

/// Print a success message
pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    println!("  {} {}", "✗".bright_red(), message.bright_red());
}

/// Print an info message
pub fn info(message: &str) {
    println!("  {} {}", "→".bright_blue(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message.yellow());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("      {}: {}", key, value.bright_cyan());
}

/// Print one registry entry
pub fn escrow(escrow: &Escrow) {
    let state = match escrow.state {
        EscrowState::Pending => "Pending".yellow(),
        EscrowState::Approved => "Approved".bright_green(),
    };
    println!("  {} {}  {}", "●".bright_cyan(), escrow.contract_address, state);
    kv("Arbiter", &escrow.arbiter.to_string());
    kv("Beneficiary", &escrow.beneficiary.to_string());
    kv("Value", &format!("{} ETH", escrow.deposit_value.format_ether()));
}

/// Print one durable approval record
pub fn record(record: &ApprovedRecord) {
    println!("  {} {}", "✓".bright_green(), record.tx.to_string().bright_white());
    kv("Arbiter", &record.arbiter.to_string());
    kv("Beneficiary", &record.beneficiary.to_string());
    kv("Approved by", &record.sender_address.to_string());
    kv("Value", &format!("{} wei", record.value));
}
