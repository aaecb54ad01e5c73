//! Finish a swap from its recovery note

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use crate::commands::swap::{follow, report};
use crate::commands::{AppContext, WalletTask};
use crate::orchestrator::RecoveryNote;
use crate::ports::WalletPort;
use crate::secure_storage::{note_password, NoteVault};

/// A decrypted note plus the password it was sealed with, ready to resume
pub struct Resume {
    note: RecoveryNote,
    password: String,
    keep_note: bool,
}

impl Resume {
    /// Resolve and decrypt the note before any wallet is opened
    pub fn open(ctx: &AppContext, reference: &str, keep_note: bool) -> Result<Self> {
        let path = ctx.vault().resolve(reference)?;
        let password = note_password()?;
        let note = NoteVault::load(&path, &password)?;
        Ok(Self {
            note,
            password,
            keep_note,
        })
    }
}

impl WalletTask for Resume {
    type Output = ();

    async fn run<W: WalletPort>(self, ctx: &AppContext, wallet: Arc<W>) -> Result<()> {
        let Resume {
            note,
            password,
            keep_note,
        } = self;
        let vault = ctx.vault();

        println!();
        println!(
            "{} {} → {}",
            "Resuming swap".yellow().bold(),
            note.source,
            note.target
        );
        println!("  Commitment: {}", note.commitment);
        println!("  Amount:     {}", ctx.display_amount(note.source, note.amount));
        println!();

        let orchestrator = ctx.orchestrator(wallet)?;
        let handle = orchestrator.resume_swap(note);
        let outcome = follow(handle, &vault, &password).await?;
        report(ctx, &vault, outcome, keep_note)
    }
}
