//! Swap orchestration
//!
//! Drives one deposit-then-withdraw attempt across two independent ledgers:
//!
//! ```text
//! Idle -> ProofGenerated -> Depositing -> Deposited -> AwaitingConfirmation
//!      -> Withdrawing -> Complete
//! ```
//!
//! Any step can end in `Failed`, tagged with the step it happened in. Nothing
//! is retried automatically. The recovery note is published as soon as the
//! proof exists, so a swap abandoned after its deposit can be finished later
//! with `resume_swap`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use zk_ledger::{Address, Amount, Hash32, LedgerError, ShortHex};

use crate::config::{BridgeSettings, ChainConfig, ChainRegistry, Network};
use crate::crypto::{self, CryptoError, Proof};
use crate::fee::{FeeCalculator, FeeError, Quote};
use crate::network::{NetworkSwitcher, SwitchError};
use crate::ports::{ChainError, LedgerPort, TxReceipt, WalletPort};

// ============================================================================
// States and errors
// ============================================================================

/// The non-terminal states; a failure records which one it happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStep {
    Idle,
    ProofGenerated,
    Depositing,
    Deposited,
    AwaitingConfirmation,
    Withdrawing,
}

impl fmt::Display for SwapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    ProofGenerated,
    Depositing,
    Deposited,
    AwaitingConfirmation,
    Withdrawing,
    Complete,
    Failed(SwapFailure),
}

impl SwapState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapState::Complete | SwapState::Failed(_))
    }

    pub fn step(&self) -> Option<SwapStep> {
        match self {
            SwapState::Idle => Some(SwapStep::Idle),
            SwapState::ProofGenerated => Some(SwapStep::ProofGenerated),
            SwapState::Depositing => Some(SwapStep::Depositing),
            SwapState::Deposited => Some(SwapStep::Deposited),
            SwapState::AwaitingConfirmation => Some(SwapStep::AwaitingConfirmation),
            SwapState::Withdrawing => Some(SwapStep::Withdrawing),
            SwapState::Complete | SwapState::Failed(_) => None,
        }
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapState::Complete => f.write_str("Complete"),
            SwapState::Failed(failure) => write!(f, "Failed({})", failure),
            other => match other.step() {
                Some(step) => fmt::Display::fmt(&step, f),
                None => Ok(()),
            },
        }
    }
}

/// Broad class of a swap error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any network interaction
    Input,
    /// A ledger invariant refused the call
    Invariant,
    /// Rolled back on settlement; retrying with the same note is legitimate
    Settlement,
    /// Wallet or transport trouble
    Environment,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),

    #[error("output amount is not positive after fees")]
    NonPositiveOutput,

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("source and target are both {0}")]
    SameNetwork(Network),

    #[error("ledger rejected the call: {0}")]
    Ledger(LedgerError),

    #[error("failed to switch to chain {chain_id}: {reason}")]
    NetworkSwitchFailed { chain_id: u64, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("swap cancelled")]
    Cancelled,

    #[error("no deposit found for commitment {0}")]
    DepositNotFound(Hash32),
}

impl SwapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwapError::InvalidAmount
            | SwapError::InvalidAddress(_)
            | SwapError::NonPositiveOutput
            | SwapError::UnknownNetwork(_)
            | SwapError::SameNetwork(_) => ErrorKind::Input,
            SwapError::Ledger(LedgerError::TransferFailed { .. }) => ErrorKind::Settlement,
            SwapError::Ledger(_) | SwapError::DepositNotFound(_) => ErrorKind::Invariant,
            SwapError::NetworkSwitchFailed { .. } | SwapError::Transport(_) | SwapError::Timeout(_) => {
                ErrorKind::Environment
            }
            SwapError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<CryptoError> for SwapError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidAmount => SwapError::InvalidAmount,
            CryptoError::InvalidAddress(reason) => SwapError::InvalidAddress(reason),
        }
    }
}

impl From<FeeError> for SwapError {
    fn from(e: FeeError) -> Self {
        match e {
            FeeError::NonPositiveOutput { .. } => SwapError::NonPositiveOutput,
            FeeError::InvalidAmount(_) | FeeError::FeeTooHigh(_) => SwapError::InvalidAmount,
        }
    }
}

impl From<SwitchError> for SwapError {
    fn from(e: SwitchError) -> Self {
        match e {
            SwitchError::NetworkSwitchFailed { chain_id, reason } => {
                SwapError::NetworkSwitchFailed { chain_id, reason }
            }
            SwitchError::Timeout(after) => SwapError::Timeout(after),
        }
    }
}

impl From<ChainError> for SwapError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Reverted(reason) => SwapError::Ledger(reason),
            other => SwapError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} (during {step})")]
pub struct SwapFailure {
    pub step: SwapStep,
    pub error: SwapError,
}

/// Snapshot of a running swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStatus {
    pub state: SwapState,
    pub error: Option<SwapError>,
}

impl From<SwapState> for SwapStatus {
    fn from(state: SwapState) -> Self {
        let error = match &state {
            SwapState::Failed(failure) => Some(failure.error.clone()),
            _ => None,
        };
        Self { state, error }
    }
}

// ============================================================================
// Requests, notes, receipts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub source: Network,
    pub target: Network,
    pub input_amount: Amount,
    pub recipient: Address,
}

/// Material needed to finish a swap whose deposit already landed.
/// Carries the proof, so it must only be stored encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryNote {
    pub commitment: Hash32,
    pub nullifier_hash: Hash32,
    pub proof: Proof,
    pub amount: Amount,
    pub recipient: Address,
    pub source: Network,
    pub target: Network,
    pub created_at: DateTime<Utc>,
    pub deposited_at: Option<DateTime<Utc>>,
    pub deposit_tx: Option<Hash32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub commitment: Hash32,
    pub nullifier_hash: Hash32,
    pub quote: Quote,
    pub source: Network,
    pub target: Network,
    /// Absent when the swap was resumed from a note
    pub deposit: Option<TxReceipt>,
    pub withdrawal: TxReceipt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapConfig {
    pub settlement_delay: Duration,
    pub call_timeout: Duration,
}

impl From<&BridgeSettings> for SwapConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            settlement_delay: settings.settlement_delay(),
            call_timeout: settings.call_timeout(),
        }
    }
}

// ============================================================================
// Progress reporting
// ============================================================================

struct Progress {
    step: SwapStep,
    status: watch::Sender<SwapStatus>,
    transitions: mpsc::UnboundedSender<SwapState>,
    note: watch::Sender<Option<RecoveryNote>>,
    cancel: watch::Receiver<bool>,
}

impl Progress {
    fn enter(&mut self, state: SwapState) {
        if let Some(step) = state.step() {
            self.step = step;
        }
        info!(state = %state, "swap transition");
        let _ = self.transitions.send(state.clone());
        self.status.send_replace(SwapStatus::from(state));
    }

    fn publish_note(&self, note: &RecoveryNote) {
        self.note.send_replace(Some(note.clone()));
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// handle was dropped without cancelling.
    async fn cancelled(&mut self) {
        loop {
            let flagged = *self.cancel.borrow_and_update();
            if flagged {
                return;
            }
            if self.cancel.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    async fn interruptible<T>(
        &mut self,
        work: impl Future<Output = Result<T, SwapError>>,
    ) -> Result<T, SwapError> {
        if self.is_cancelled() {
            return Err(SwapError::Cancelled);
        }
        tokio::select! {
            result = work => result,
            _ = self.cancelled() => Err(SwapError::Cancelled),
        }
    }
}

/// Caller's view of a spawned swap
pub struct SwapHandle {
    status: watch::Receiver<SwapStatus>,
    transitions: mpsc::UnboundedReceiver<SwapState>,
    note: watch::Receiver<Option<RecoveryNote>>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<SwapReceipt, SwapFailure>>,
}

impl SwapHandle {
    pub fn status(&self) -> SwapStatus {
        self.status.borrow().clone()
    }

    /// Next state in emission order; `None` once the swap task is done and
    /// every state has been read
    pub async fn next_transition(&mut self) -> Option<SwapState> {
        self.transitions.recv().await
    }

    pub fn recovery_note(&self) -> Option<RecoveryNote> {
        self.note.borrow().clone()
    }

    /// Request cancellation. Only honoured before the withdrawal starts.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub async fn wait(self) -> Result<SwapReceipt, SwapFailure> {
        let step = self.status.borrow().state.step().unwrap_or(SwapStep::Idle);
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SwapFailure {
                step,
                error: SwapError::Transport(format!("swap task aborted: {}", e)),
            }),
        }
    }

    /// Drain every transition, then wait for the outcome
    pub async fn finish(mut self) -> (Result<SwapReceipt, SwapFailure>, Vec<SwapState>) {
        let mut seen = Vec::new();
        while let Some(state) = self.transitions.recv().await {
            seen.push(state);
        }
        (self.wait().await, seen)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct SwapOrchestrator<W: WalletPort> {
    registry: ChainRegistry,
    switcher: NetworkSwitcher<W>,
    fees: FeeCalculator,
    config: SwapConfig,
}

impl<W: WalletPort> SwapOrchestrator<W> {
    pub fn new(
        registry: ChainRegistry,
        switcher: NetworkSwitcher<W>,
        fees: FeeCalculator,
        config: SwapConfig,
    ) -> Self {
        Self {
            registry,
            switcher,
            fees,
            config,
        }
    }

    pub fn from_settings(
        registry: ChainRegistry,
        wallet: Arc<W>,
        settings: &BridgeSettings,
    ) -> Result<Self, FeeError> {
        let fees = FeeCalculator::new(settings.fee_bps, settings.quote_precision)?;
        let switcher =
            NetworkSwitcher::new(wallet, settings.switch_settle(), settings.call_timeout());
        Ok(Self::new(registry, switcher, fees, SwapConfig::from(settings)))
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    pub fn switcher(&self) -> &NetworkSwitcher<W> {
        &self.switcher
    }

    /// Quote what `input` on `source` delivers on `target`
    pub fn quote(&self, source: Network, target: Network, input: Amount) -> Result<Quote, SwapError> {
        let source = self.chain(source)?;
        let target = self.chain(target)?;
        Ok(self.fees.quote_between(
            input,
            source.currency.decimals,
            target.currency.decimals,
        )?)
    }

    /// Spawn a swap and return a handle to observe or cancel it
    pub fn start_swap(self: &Arc<Self>, request: SwapRequest) -> SwapHandle {
        let (observers, mut progress) = channels();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.drive_swap(&request, &mut progress).await });
        observers.attach(task)
    }

    /// Spawn the remaining half of a swap from its recovery note
    pub fn resume_swap(self: &Arc<Self>, note: RecoveryNote) -> SwapHandle {
        let (observers, mut progress) = channels();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.drive_resume(note, &mut progress).await });
        observers.attach(task)
    }

    /// Run a swap on the current task
    pub async fn run_swap(&self, request: &SwapRequest) -> Result<SwapReceipt, SwapFailure> {
        let (_observers, mut progress) = channels();
        self.drive_swap(request, &mut progress).await
    }

    async fn drive_swap(
        &self,
        request: &SwapRequest,
        progress: &mut Progress,
    ) -> Result<SwapReceipt, SwapFailure> {
        progress.enter(SwapState::Idle);
        let outcome = self.execute(request, progress).await;
        conclude(outcome, progress)
    }

    async fn drive_resume(
        &self,
        note: RecoveryNote,
        progress: &mut Progress,
    ) -> Result<SwapReceipt, SwapFailure> {
        progress.publish_note(&note);
        progress.enter(SwapState::Deposited);
        let outcome = self.resume(&note, progress).await;
        conclude(outcome, progress)
    }

    async fn execute(
        &self,
        request: &SwapRequest,
        progress: &mut Progress,
    ) -> Result<SwapReceipt, SwapError> {
        // Everything up to ProofGenerated is local
        let (source, target) = self.route(request.source, request.target)?;
        let bridge_note = crypto::generate(request.input_amount, &request.recipient)?;
        let quote = self.fees.quote_between(
            request.input_amount,
            source.currency.decimals,
            target.currency.decimals,
        )?;

        let mut note = RecoveryNote {
            commitment: bridge_note.commitment,
            nullifier_hash: bridge_note.nullifier_hash,
            proof: bridge_note.proof.clone(),
            amount: request.input_amount,
            recipient: request.recipient,
            source: request.source,
            target: request.target,
            created_at: Utc::now(),
            deposited_at: None,
            deposit_tx: None,
        };
        drop(bridge_note);
        progress.publish_note(&note);
        progress.enter(SwapState::ProofGenerated);

        if progress.is_cancelled() {
            return Err(SwapError::Cancelled);
        }
        progress.enter(SwapState::Depositing);
        let context = progress.interruptible(self.ensure(source)).await?;
        let pending = self
            .bounded(context.ledger.deposit(note.commitment, request.input_amount))
            .await??;
        let deposit = self.bounded(context.ledger.wait_finalized(&pending)).await??;
        drop(context);
        if !deposit.success {
            return Err(SwapError::Transport(format!(
                "deposit {} did not succeed",
                deposit.tx_hash
            )));
        }

        note.deposited_at = Some(Utc::now());
        note.deposit_tx = Some(deposit.tx_hash);
        progress.publish_note(&note);
        info!(
            commitment = %note.commitment.short(),
            tx = %deposit.tx_hash,
            network = %request.source,
            "deposit finalized"
        );
        progress.enter(SwapState::Deposited);

        progress.enter(SwapState::AwaitingConfirmation);
        let delay = self.config.settlement_delay;
        progress
            .interruptible(async move {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;

        progress.enter(SwapState::Withdrawing);
        let withdrawal = self.withdraw(target, &note, quote.output).await?;

        Ok(SwapReceipt {
            commitment: note.commitment,
            nullifier_hash: note.nullifier_hash,
            quote,
            source: request.source,
            target: request.target,
            deposit: Some(deposit),
            withdrawal,
        })
    }

    async fn resume(
        &self,
        note: &RecoveryNote,
        progress: &mut Progress,
    ) -> Result<SwapReceipt, SwapError> {
        let (source, target) = self.route(note.source, note.target)?;
        let quote = self.fees.quote_between(
            note.amount,
            source.currency.decimals,
            target.currency.decimals,
        )?;

        let context = progress.interruptible(self.ensure(source)).await?;
        let record = self
            .bounded(context.ledger.deposit_of(note.commitment))
            .await??
            .ok_or(SwapError::DepositNotFound(note.commitment))?;
        drop(context);
        if record.amount != note.amount {
            warn!(
                commitment = %note.commitment.short(),
                recorded = %record.amount,
                noted = %note.amount,
                "deposit amount differs from note"
            );
            return Err(SwapError::DepositNotFound(note.commitment));
        }

        progress.enter(SwapState::AwaitingConfirmation);
        let remaining = self.remaining_delay(note.deposited_at);
        progress
            .interruptible(async move {
                tokio::time::sleep(remaining).await;
                Ok(())
            })
            .await?;

        progress.enter(SwapState::Withdrawing);
        let withdrawal = self.withdraw(target, note, quote.output).await?;

        Ok(SwapReceipt {
            commitment: note.commitment,
            nullifier_hash: note.nullifier_hash,
            quote,
            source: note.source,
            target: note.target,
            deposit: None,
            withdrawal,
        })
    }

    async fn withdraw(
        &self,
        target: &ChainConfig,
        note: &RecoveryNote,
        output: Amount,
    ) -> Result<TxReceipt, SwapError> {
        let context = self.ensure(target).await?;
        let pending = self
            .bounded(context.ledger.withdraw(
                output,
                note.recipient,
                note.nullifier_hash,
                note.proof.as_bytes(),
            ))
            .await??;
        let receipt = self.bounded(context.ledger.wait_finalized(&pending)).await??;
        if !receipt.success {
            return Err(SwapError::Transport(format!(
                "withdrawal {} did not succeed",
                receipt.tx_hash
            )));
        }

        info!(
            nullifier = %note.nullifier_hash.short(),
            tx = %receipt.tx_hash,
            network = %target.network,
            %output,
            "withdrawal finalized"
        );
        Ok(receipt)
    }

    /// Settlement wait still owed for a deposit finalized at `deposited_at`.
    /// An unknown deposit time owes the full delay.
    fn remaining_delay(&self, deposited_at: Option<DateTime<Utc>>) -> Duration {
        let delay = self.config.settlement_delay;
        match deposited_at {
            Some(at) => {
                let elapsed = (Utc::now() - at).to_std().unwrap_or_default();
                delay.saturating_sub(elapsed)
            }
            None => delay,
        }
    }

    fn route(&self, source: Network, target: Network) -> Result<(&ChainConfig, &ChainConfig), SwapError> {
        if source == target {
            return Err(SwapError::SameNetwork(source));
        }
        Ok((self.chain(source)?, self.chain(target)?))
    }

    fn chain(&self, network: Network) -> Result<&ChainConfig, SwapError> {
        self.registry
            .get(network)
            .ok_or_else(|| SwapError::UnknownNetwork(network.to_string()))
    }

    async fn ensure(
        &self,
        chain: &ChainConfig,
    ) -> Result<crate::network::ActiveContext<W::Ledger>, SwapError> {
        Ok(self.switcher.ensure(chain).await?)
    }

    async fn bounded<T>(&self, call: impl Future<Output = T>) -> Result<T, SwapError> {
        tokio::time::timeout(self.config.call_timeout, call)
            .await
            .map_err(|_| SwapError::Timeout(self.config.call_timeout))
    }
}

/// Receiving ends of a swap's progress channels
struct Observers {
    status: watch::Receiver<SwapStatus>,
    transitions: mpsc::UnboundedReceiver<SwapState>,
    note: watch::Receiver<Option<RecoveryNote>>,
    cancel: watch::Sender<bool>,
}

impl Observers {
    fn attach(self, task: JoinHandle<Result<SwapReceipt, SwapFailure>>) -> SwapHandle {
        SwapHandle {
            status: self.status,
            transitions: self.transitions,
            note: self.note,
            cancel: self.cancel,
            task,
        }
    }
}

fn channels() -> (Observers, Progress) {
    let (status_tx, status_rx) = watch::channel(SwapStatus::from(SwapState::Idle));
    let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
    let (note_tx, note_rx) = watch::channel(None);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let progress = Progress {
        step: SwapStep::Idle,
        status: status_tx,
        transitions: transitions_tx,
        note: note_tx,
        cancel: cancel_rx,
    };
    let observers = Observers {
        status: status_rx,
        transitions: transitions_rx,
        note: note_rx,
        cancel: cancel_tx,
    };

    (observers, progress)
}

fn conclude(
    outcome: Result<SwapReceipt, SwapError>,
    progress: &mut Progress,
) -> Result<SwapReceipt, SwapFailure> {
    match outcome {
        Ok(receipt) => {
            progress.enter(SwapState::Complete);
            Ok(receipt)
        }
        Err(error) => {
            let failure = SwapFailure {
                step: progress.step,
                error,
            };
            warn!(step = %failure.step, error = %failure.error, "swap failed");
            progress.enter(SwapState::Failed(failure.clone()));
            Err(failure)
        }
    }
}
