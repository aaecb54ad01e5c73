//! zk-ledger: per-chain deposit/withdraw ledger for the zkbridge protocol
//!
//! ## Flow
//! 1. A client derives a commitment, a nullifier hash and a proof from a
//!    fresh secret (see [`abi`])
//! 2. `deposit` locks native value under the commitment on the source chain
//! 3. `withdraw` on the target chain pays out against the nullifier hash and
//!    the proof, as judged by the injected [`Verifier`]
//!
//! There is no cross-chain message. Each deployment is an independent
//! [`Ledger`]; consistency comes from the client's sequencing and from the
//! secret staying private until withdrawal.

pub mod abi;
pub mod error;
pub mod ledger;
pub mod types;
pub mod verifier;

pub use error::*;
pub use ledger::*;
pub use types::*;
pub use verifier::*;
