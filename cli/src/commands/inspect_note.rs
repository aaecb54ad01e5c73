//! Decrypt a recovery note and show where its swap stands

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use crate::commands::{AppContext, WalletTask};
use crate::orchestrator::RecoveryNote;
use crate::ports::{LedgerPort, WalletPort};
use crate::secure_storage::{note_password, NoteVault};

/// Decrypt and print a note; returns it so `check` can look it up on chain
pub fn show(ctx: &AppContext, reference: &str) -> Result<RecoveryNote> {
    let vault = ctx.vault();
    let path = vault.resolve(reference)?;
    let sealed = NoteVault::read(&path)?;

    println!();
    println!("{}", "Recovery Note".yellow().bold());
    println!("  File:       {}", path.display());
    println!("  Sealed:     {}", sealed.created_at);
    println!("  Commitment: {}", sealed.commitment);

    let note = sealed.open(&note_password()?)?;

    println!("  Nullifier:  {}", note.nullifier_hash);
    println!("  Route:      {} → {}", note.source, note.target);
    println!("  Amount:     {}", ctx.display_amount(note.source, note.amount));
    println!("  Recipient:  {}", note.recipient);
    println!("  Proof:      {} bytes", note.proof.len());
    match (&note.deposited_at, &note.deposit_tx) {
        (Some(at), Some(tx)) => println!("  Deposited:  {} (tx {})", at.to_rfc3339(), tx),
        _ => println!("  Deposited:  {}", "not recorded".dimmed()),
    }

    Ok(note)
}

/// Where a note's swap stands on its two ledgers
pub struct CheckNote {
    pub note: RecoveryNote,
}

impl WalletTask for CheckNote {
    type Output = ();

    async fn run<W: WalletPort>(self, ctx: &AppContext, wallet: Arc<W>) -> Result<()> {
        let note = self.note;
        let orchestrator = ctx.orchestrator(wallet)?;

        let source = ctx
            .bounded("Network switch", orchestrator.switcher().ensure(ctx.chain(note.source)?))
            .await?;
        let deposit = ctx
            .bounded("Deposit lookup", source.ledger.deposit_of(note.commitment))
            .await?;
        drop(source);

        let target = ctx
            .bounded("Network switch", orchestrator.switcher().ensure(ctx.chain(note.target)?))
            .await?;
        let spent = ctx
            .bounded("Nullifier lookup", target.ledger.is_nullifier_spent(note.nullifier_hash))
            .await?;
        drop(target);

        println!();
        match deposit {
            Some(record) => println!(
                "  Source deposit:   {} ({})",
                "found".green(),
                ctx.display_amount(note.source, record.amount)
            ),
            None => println!("  Source deposit:   {}", "missing".red()),
        }
        if spent {
            println!("  Target nullifier: {}", "spent (withdrawn)".green());
        } else {
            println!("  Target nullifier: {}", "unspent".yellow());
        }

        Ok(())
    }
}
