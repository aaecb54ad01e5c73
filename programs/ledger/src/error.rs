use thiserror::Error;

use crate::types::{Address, Amount, Hash32};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger contract failures. Each one reverts the whole call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Value must be greater than zero")]
    ZeroValue,

    #[error("Commitment {0} has already been deposited")]
    DuplicateCommitment(Hash32),

    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    #[error("Nullifier {0} has already been used")]
    NullifierAlreadyUsed(Hash32),

    #[error("Withdrawal proof rejected by verifier")]
    ProofRejected,

    #[error("Native transfer to {recipient} failed: {reason}")]
    TransferFailed { recipient: Address, reason: String },

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
}
