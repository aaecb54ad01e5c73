//! Show ledger liquidity and signer balances

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use zk_ledger::{Address, Amount};

use crate::commands::{AppContext, WalletTask};
use crate::config::{ChainConfig, Network};
use crate::orchestrator::SwapOrchestrator;
use crate::ports::{LedgerPort, WalletPort};

pub struct Balance {
    /// Only this network; every configured one when absent
    pub network: Option<Network>,
}

struct ChainBalances {
    liquidity: Amount,
    signer: Amount,
    verifier: Address,
}

async fn query<W: WalletPort>(
    ctx: &AppContext,
    orchestrator: &SwapOrchestrator<W>,
    chain: &ChainConfig,
) -> Result<ChainBalances> {
    let context = ctx
        .bounded("Network switch", orchestrator.switcher().ensure(chain))
        .await?;
    let liquidity = ctx
        .bounded("Ledger balance", context.ledger.get_balance())
        .await?;
    let signer = ctx
        .bounded("Signer balance", context.ledger.signer_balance())
        .await?;
    let verifier = ctx
        .bounded("Verifier lookup", context.ledger.verifier())
        .await?;
    Ok(ChainBalances {
        liquidity,
        signer,
        verifier,
    })
}

impl WalletTask for Balance {
    type Output = ();

    async fn run<W: WalletPort>(self, ctx: &AppContext, wallet: Arc<W>) -> Result<()> {
        let signer = ctx.bounded("Account lookup", wallet.account()).await?;
        let orchestrator = ctx.orchestrator(wallet)?;

        match self.network {
            Some(network) => {
                let chain = ctx.chain(network)?;
                let balances = query(ctx, &orchestrator, chain).await?;

                println!();
                println!("{}", network.to_string().yellow().bold());
                println!("  Ledger:    {}", chain.ledger_address);
                println!("  Verifier:  {}", balances.verifier);
                println!("  Liquidity: {}", ctx.display_amount(network, balances.liquidity));
                println!("  Signer:    {}", ctx.display_amount(network, balances.signer));
            }
            None => {
                println!();
                println!("{} {}", "Balances for".yellow().bold(), signer);
                println!();
                println!("  {:<16} {:>24} {:>24}", "network", "ledger liquidity", "signer");
                for chain in ctx.registry.iter() {
                    match query(ctx, &orchestrator, chain).await {
                        Ok(balances) => println!(
                            "  {:<16} {:>24} {:>24}",
                            chain.network.to_string(),
                            ctx.display_amount(chain.network, balances.liquidity),
                            ctx.display_amount(chain.network, balances.signer),
                        ),
                        Err(e) => println!(
                            "  {:<16} {}",
                            chain.network.to_string(),
                            format!("unavailable: {:#}", e).dimmed()
                        ),
                    }
                }
            }
        }

        Ok(())
    }
}
