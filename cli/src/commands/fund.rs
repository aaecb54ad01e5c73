//! Add liquidity to a ledger with a plain value transfer

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use crate::commands::{AppContext, WalletTask};
use crate::config::Network;
use crate::ports::{LedgerPort, WalletPort};

pub struct Fund {
    pub network: Network,
    pub amount: String,
}

impl WalletTask for Fund {
    type Output = ();

    async fn run<W: WalletPort>(self, ctx: &AppContext, wallet: Arc<W>) -> Result<()> {
        let network = self.network;
        let value = ctx.parse_amount(network, &self.amount)?;
        let chain = ctx.chain(network)?;
        let orchestrator = ctx.orchestrator(wallet)?;

        println!("{}", format!("Funding ledger on {}...", network).cyan());
        let context = ctx
            .bounded("Network switch", orchestrator.switcher().ensure(chain))
            .await?;
        let pending = ctx
            .bounded("Funding transaction", context.ledger.fund(value))
            .await?;
        let receipt = ctx
            .bounded("Funding confirmation", context.ledger.wait_finalized(&pending))
            .await?;
        let balance = ctx
            .bounded("Ledger balance", context.ledger.get_balance())
            .await?;
        drop(context);

        println!();
        println!("{}", "Liquidity added!".green().bold());
        println!();
        println!("Transaction:    {}", receipt.tx_hash);
        println!("Block:          {}", receipt.block_number);
        println!("Ledger balance: {}", ctx.display_amount(network, balance));
        println!("{}", chain.tx_url(&receipt.tx_hash).dimmed());

        Ok(())
    }
}
