//! List supported networks

use anyhow::Result;
use colored::Colorize;

use crate::commands::AppContext;

pub fn run(ctx: &AppContext) -> Result<()> {
    println!();
    println!("{}", "Supported Networks".yellow().bold());
    println!();

    for chain in ctx.registry.iter() {
        println!("{}", chain.network.to_string().cyan());
        println!("  Name:     {}", chain.chain_name);
        println!("  Chain ID: {} ({})", chain.chain_id, chain.chain_id_hex());
        println!(
            "  Currency: {} ({}, {} decimals)",
            chain.currency.symbol, chain.currency.name, chain.currency.decimals
        );
        println!("  Ledger:   {}", chain.ledger_address);
        println!("  RPC:      {}", chain.rpc_url);
        println!("  Explorer: {}", chain.explorer_url);
        println!();
    }

    println!(
        "{}",
        format!(
            "Overrides: {}",
            ctx.config_dir.join("networks.json").display()
        )
        .dimmed()
    );
    Ok(())
}
