//! Status command

use colored::*;
use escrowkit_escrow::EscrowConfig;

use crate::display;

pub fn show(config: &EscrowConfig) -> anyhow::Result<()> {
    println!("{}", "Configuration".bright_white().bold());
    println!("{}", "─".repeat(50));
    display::kv("Data dir", &config.data_dir.display().to_string());
    display::kv("Ledger", &config.ledger_path().display().to_string());
    display::kv("Storage key", &config.storage_key);
    display::kv(
        "Approval timeout",
        &config
            .approval_timeout_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "none (wait indefinitely)".to_string()),
    );
    display::kv("Demo funding", &format!("{} ETH", config.demo_funding_eth));
    Ok(())
}
