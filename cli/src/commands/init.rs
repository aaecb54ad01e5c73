//! Create the config directory and, for the devnet backend, a fresh devnet

use anyhow::{bail, Context, Result};
use colored::Colorize;
use zk_ledger::Address;

use crate::commands::AppContext;
use crate::config::{Backend, Network, VerifierKind, SIGNER_KEY_ENV};
use crate::devnet::{DevnetWallet, DEFAULT_SIGNER};

pub struct InitOptions {
    pub force: bool,
    pub backend: Option<Backend>,
    pub verifier: Option<VerifierKind>,
    pub signer: Option<String>,
    /// Native balance given to the signer on every chain
    pub balance: String,
    /// Initial ledger liquidity on every chain
    pub liquidity: String,
}

pub async fn run(mut ctx: AppContext, opts: InitOptions) -> Result<()> {
    if let Some(backend) = opts.backend {
        ctx.settings.backend = backend;
    }
    if ctx.settings.backend == Backend::Rpc {
        return init_rpc(&ctx);
    }

    let devnet_path = ctx.devnet_path();
    if devnet_path.exists() && !opts.force {
        bail!(
            "Devnet already exists at {}. Use --force to recreate it.",
            devnet_path.display()
        );
    }

    if let Some(verifier) = opts.verifier {
        ctx.settings.verifier = verifier;
    }
    ctx.settings
        .save(&ctx.config_dir)
        .context("Failed to write settings")?;

    let signer: Address = opts
        .signer
        .as_deref()
        .unwrap_or(DEFAULT_SIGNER)
        .parse()
        .context("Invalid signer address")?;

    // Every built-in currency has the same decimals
    let balance = ctx.parse_amount(Network::Sepolia, &opts.balance)?;
    let liquidity = ctx.parse_amount(Network::Sepolia, &opts.liquidity)?;

    println!("{}", "Bootstrapping local devnet...".cyan());
    let wallet =
        DevnetWallet::bootstrap(&ctx.registry, ctx.settings.verifier, signer, balance, liquidity)?;
    ctx.save_devnet(&wallet).await?;

    println!();
    println!("{}", "Devnet ready!".green().bold());
    println!();
    println!("Config dir:  {}", ctx.config_dir.display());
    println!("Signer:      {}", signer);
    println!("Verifier:    {:?}", ctx.settings.verifier);
    println!();
    for chain in ctx.registry.iter() {
        println!(
            "  {:<16} chain {:<18} ledger {}  liquidity {}",
            chain.network.to_string(),
            chain.chain_id,
            chain.ledger_address,
            ctx.display_amount(chain.network, liquidity)
        );
    }
    println!();
    println!(
        "{}",
        "Next: zkbridge swap --from <network> --to <network> --amount <value>".dimmed()
    );

    Ok(())
}

/// Deployed ledgers need no local state beyond the settings
fn init_rpc(ctx: &AppContext) -> Result<()> {
    ctx.settings
        .save(&ctx.config_dir)
        .context("Failed to write settings")?;

    println!();
    println!("{}", "RPC backend configured".green().bold());
    println!();
    println!("Config dir:  {}", ctx.config_dir.display());
    println!();
    for chain in ctx.registry.iter() {
        println!(
            "  {:<16} chain {:<18} ledger {}  rpc {}",
            chain.network.to_string(),
            chain.chain_id,
            chain.ledger_address,
            chain.rpc_url
        );
    }
    println!();
    println!(
        "{}",
        format!(
            "Override ledger addresses and endpoints in networks.json; export {} to sign.",
            SIGNER_KEY_ENV
        )
        .dimmed()
    );
    Ok(())
}
