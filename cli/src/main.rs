//! zkbridge CLI - commitment/nullifier swaps between independent EVM ledgers

#![allow(dead_code)] // Public API items may not be used internally

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod crypto;
mod devnet;
mod fee;
mod logging;
mod network;
mod orchestrator;
mod ports;
mod rpc;
mod secure_storage;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod fuzz_tests;


use commands::*;
use config::{Backend, Network, VerifierKind};

#[derive(Parser)]
#[command(name = "zkbridge")]
#[command(author = "zkbridge Team")]
#[command(version = "0.1.0")]
#[command(about = "Move value between independent EVM ledgers with commitments and nullifiers")]
#[command(long_about = r#"
zkbridge deposits value into a ledger on one network under a commitment,
then withdraws the same value minus a 1% fee from the ledger on another
network by presenting a one-time nullifier and a proof.

The ledgers share nothing. If a swap stops after its deposit, the encrypted
recovery note lets you finish the withdrawal later.

Quick Start:
  1. zkbridge init                                      Create a local devnet
                                                        (--backend rpc for deployed ledgers)
  2. zkbridge quote --from sepolia --to base-sepolia --amount 1
  3. zkbridge swap  --from sepolia --to base-sepolia --amount 1
  4. zkbridge balance                                   Check ledgers and balances
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config and devnet directory (default: ~/.zkbridge)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create settings and, on the devnet backend, a ledger on every network
    Init {
        /// Replace an existing devnet
        #[arg(short, long)]
        force: bool,

        /// Run swaps on the local devnet or on deployed ledgers over JSON-RPC
        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Withdrawal proof policy of the deployed ledgers
        #[arg(long, value_enum)]
        verifier: Option<VerifierKind>,

        /// Signer address (default: the well-known devnet account)
        #[arg(long)]
        signer: Option<String>,

        /// Native balance of the signer on every network
        #[arg(long, default_value = "100")]
        balance: String,

        /// Initial liquidity of every ledger
        #[arg(long, default_value = "10")]
        liquidity: String,
    },

    /// List supported networks
    Networks,

    /// Show what a swap would deliver after fees
    Quote {
        #[arg(long, value_enum)]
        from: Network,

        #[arg(long, value_enum)]
        to: Network,

        /// Amount in the source currency (e.g. 1.5)
        #[arg(short, long)]
        amount: String,
    },

    /// Add liquidity to a network's ledger
    Fund {
        #[arg(short, long, value_enum)]
        network: Network,

        #[arg(short, long)]
        amount: String,
    },

    /// Show ledger liquidity and signer balances
    Balance {
        /// Query a single network through its ledger
        #[arg(short, long, value_enum)]
        network: Option<Network>,
    },

    /// Deposit on one network and withdraw on another
    Swap {
        #[arg(long, value_enum)]
        from: Network,

        #[arg(long, value_enum)]
        to: Network,

        /// Amount in the source currency (e.g. 1.5)
        #[arg(short, long)]
        amount: String,

        /// Recipient on the target network (default: the signer)
        #[arg(short, long)]
        recipient: Option<String>,

        /// Keep the recovery note after success
        #[arg(long)]
        keep_note: bool,
    },

    /// Finish an interrupted swap from its recovery note
    Resume {
        /// Note file or commitment prefix
        note: String,

        #[arg(long)]
        keep_note: bool,
    },

    /// Decrypt and show a recovery note
    InspectNote {
        /// Note file or commitment prefix
        note: String,

        /// Also look up the deposit and nullifier on the ledgers
        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.json_logs)?;

    let ctx = AppContext::load(cli.config_dir)?;

    match cli.command {
        Commands::Init { force, backend, verifier, signer, balance, liquidity } => {
            init::run(ctx, init::InitOptions {
                force,
                backend,
                verifier,
                signer,
                balance,
                liquidity,
            })
            .await?;
        }
        Commands::Networks => {
            networks::run(&ctx)?;
        }
        Commands::Quote { from, to, amount } => {
            quote::run(&ctx, from, to, &amount)?;
        }
        Commands::Fund { network, amount } => {
            ctx.dispatch(fund::Fund { network, amount }).await?;
        }
        Commands::Balance { network } => {
            ctx.dispatch(balance::Balance { network }).await?;
        }
        Commands::Swap { from, to, amount, recipient, keep_note } => {
            ctx.dispatch(swap::SwapOptions {
                from,
                to,
                amount,
                recipient,
                keep_note,
            })
            .await?;
        }
        Commands::Resume { note, keep_note } => {
            let resume = resume::Resume::open(&ctx, &note, keep_note)?;
            ctx.dispatch(resume).await?;
        }
        Commands::InspectNote { note, check } => {
            let note = inspect_note::show(&ctx, &note)?;
            if check {
                ctx.dispatch(inspect_note::CheckNote { note }).await?;
            }
        }
    }

    Ok(())
}
