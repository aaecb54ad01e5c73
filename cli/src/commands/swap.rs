//! Swap value from one network's ledger to another's

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use zk_ledger::Address;

use crate::commands::{print_transition, AppContext, WalletTask};
use crate::config::Network;
use crate::crypto::parse_recipient;
use crate::orchestrator::{ErrorKind, SwapHandle, SwapReceipt, SwapRequest, SwapState};
use crate::ports::WalletPort;
use crate::secure_storage::{new_note_password, NoteVault};

pub struct SwapOptions {
    pub from: Network,
    pub to: Network,
    pub amount: String,
    pub recipient: Option<String>,
    /// Keep the recovery note after a successful swap
    pub keep_note: bool,
}

impl WalletTask for SwapOptions {
    type Output = ();

    async fn run<W: WalletPort>(self, ctx: &AppContext, wallet: Arc<W>) -> Result<()> {
        run(ctx, self, wallet).await
    }
}

async fn run<W: WalletPort>(ctx: &AppContext, opts: SwapOptions, wallet: Arc<W>) -> Result<()> {
    if opts.from == opts.to {
        bail!("Source and target network are both {}", opts.from);
    }

    let recipient: Address = match opts.recipient.as_deref() {
        Some(input) => parse_recipient(input)?,
        None => ctx.bounded("Account lookup", wallet.account()).await?,
    };
    let input_amount = ctx.parse_amount(opts.from, &opts.amount)?;

    let orchestrator = ctx.orchestrator(wallet)?;
    let quote = orchestrator
        .quote(opts.from, opts.to, input_amount)
        .context("Amount too small to bridge")?;

    println!();
    println!("{} {} → {}", "Swap".yellow().bold(), opts.from, opts.to);
    println!("  Send:      {}", ctx.display_amount(opts.from, quote.input));
    println!("  Receive:   {}", ctx.display_amount(opts.to, quote.output));
    println!("  Recipient: {}", recipient);
    println!();

    let password = new_note_password()?;
    let vault = ctx.vault();

    let handle = orchestrator.start_swap(SwapRequest {
        source: opts.from,
        target: opts.to,
        input_amount,
        recipient,
    });
    let outcome = follow(handle, &vault, &password).await?;
    report(ctx, &vault, outcome, opts.keep_note)
}

enum Event {
    State(Option<SwapState>),
    Interrupt,
}

/// Print transitions as they happen, keep the encrypted note current and
/// turn Ctrl-C into a cancellation request
pub(crate) async fn follow(
    mut handle: SwapHandle,
    vault: &NoteVault,
    password: &str,
) -> Result<Result<SwapReceipt, crate::orchestrator::SwapFailure>> {
    let mut interrupted = false;

    loop {
        let event = tokio::select! {
            state = handle.next_transition() => Event::State(state),
            _ = tokio::signal::ctrl_c(), if !interrupted => Event::Interrupt,
        };

        match event {
            Event::Interrupt => {
                interrupted = true;
                println!("{}", "Cancelling... (funds already deposited stay recoverable)".yellow());
                handle.cancel();
            }
            Event::State(None) => break,
            Event::State(Some(state)) => {
                print_transition(&state);
                if matches!(state, SwapState::ProofGenerated | SwapState::Deposited) {
                    if let Some(note) = handle.recovery_note() {
                        let path = vault.save(&note, password)?;
                        if state == SwapState::ProofGenerated {
                            println!("    {}", format!("Recovery note: {}", path.display()).dimmed());
                        }
                    }
                }
            }
        }
    }

    Ok(handle.wait().await)
}

pub(crate) fn report(
    ctx: &AppContext,
    vault: &NoteVault,
    outcome: Result<SwapReceipt, crate::orchestrator::SwapFailure>,
    keep_note: bool,
) -> Result<()> {
    match outcome {
        Ok(receipt) => {
            let note_path = vault.path_for(&receipt.commitment);
            if !keep_note && note_path.exists() {
                vault.remove(&note_path)?;
            }

            println!();
            println!("{}", "Swap complete!".green().bold());
            println!();
            if let Some(deposit) = &receipt.deposit {
                println!("Deposit:    {} ({})", deposit.tx_hash, receipt.source);
            }
            println!("Withdrawal: {} ({})", receipt.withdrawal.tx_hash, receipt.target);
            println!("Received:   {}", ctx.display_amount(receipt.target, receipt.quote.output));
            if let Ok(chain) = ctx.chain(receipt.target) {
                println!("{}", chain.tx_url(&receipt.withdrawal.tx_hash).dimmed());
            }
            Ok(())
        }
        Err(failure) => {
            println!();
            match failure.error.kind() {
                ErrorKind::Input => {}
                ErrorKind::Settlement => println!(
                    "{}",
                    "The withdrawal was rolled back. Retry with 'zkbridge resume <note>'.".yellow()
                ),
                _ => println!(
                    "{}",
                    "If the deposit landed, finish later with 'zkbridge resume <note>'.".yellow()
                ),
            }
            bail!("Swap failed: {}", failure)
        }
    }
}
