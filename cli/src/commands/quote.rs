//! Preview the amount a swap would deliver

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::commands::AppContext;
use crate::config::Network;
use crate::fee::FeeCalculator;

pub fn run(ctx: &AppContext, from: Network, to: Network, amount: &str) -> Result<()> {
    if from == to {
        bail!("Source and target network are both {}", from);
    }

    let source = ctx.chain(from)?;
    let target = ctx.chain(to)?;
    let input = ctx.parse_amount(from, amount)?;

    let fees = FeeCalculator::new(ctx.settings.fee_bps, ctx.settings.quote_precision)
        .context("Invalid fee settings")?;
    let quote = fees
        .quote_between(input, source.currency.decimals, target.currency.decimals)
        .context("Amount too small to bridge")?;

    println!();
    println!("{} {} → {}", "Quote".yellow().bold(), from, to);
    println!();
    println!("  You send:    {}", ctx.display_amount(from, quote.input));
    println!(
        "  Bridge fee:  {} ({}%)",
        ctx.display_amount(from, quote.fee),
        f64::from(fees.fee_bps()) / 100.0
    );
    println!("  You receive: {}", ctx.display_amount(to, quote.output).green().bold());
    println!();

    Ok(())
}
