//! Withdrawal proof verification
//!
//! The ledger never interprets proofs itself. It hands the public withdrawal
//! inputs and the proof blob to the verifier it was constructed with.
//!
//! Policies:
//! - ACCEPT-ALL: accepts every proof (test deployments)
//! - OPENING: decodes the proof and checks it opens to the presented
//!   recipient and nullifier hash, for no more than the committed amount

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::abi::decode_proof;
use crate::types::{Address, Amount, Hash32};

/// Public inputs of a withdrawal, as presented to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalInputs {
    pub amount: Amount,
    pub recipient: Address,
    pub nullifier_hash: Hash32,
}

/// Acceptance policy for withdrawal proofs
pub trait Verifier: Send + Sync {
    /// Address the verifier is deployed at
    fn address(&self) -> Address;

    fn verify(&self, inputs: &WithdrawalInputs, proof: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptAll {
    address: Address,
}

impl AcceptAll {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl Verifier for AcceptAll {
    fn address(&self) -> Address {
        self.address
    }

    fn verify(&self, _inputs: &WithdrawalInputs, _proof: &[u8]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningVerifier {
    address: Address,
}

impl OpeningVerifier {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl Verifier for OpeningVerifier {
    fn address(&self) -> Address {
        self.address
    }

    fn verify(&self, inputs: &WithdrawalInputs, proof: &[u8]) -> bool {
        let Some(opening) = decode_proof(proof) else {
            return false;
        };

        if opening.recipient != inputs.recipient || inputs.amount > opening.amount {
            return false;
        }

        let expected = opening.nullifier_hash();
        expected
            .as_slice()
            .ct_eq(inputs.nullifier_hash.as_slice())
            .into()
    }
}

/// Closed set of verifier deployments, so ledger state can be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VerifierPolicy {
    AcceptAll { address: Address },
    Opening { address: Address },
}

impl Verifier for VerifierPolicy {
    fn address(&self) -> Address {
        match self {
            Self::AcceptAll { address } | Self::Opening { address } => *address,
        }
    }

    fn verify(&self, inputs: &WithdrawalInputs, proof: &[u8]) -> bool {
        match self {
            Self::AcceptAll { address } => AcceptAll::new(*address).verify(inputs, proof),
            Self::Opening { address } => OpeningVerifier::new(*address).verify(inputs, proof),
        }
    }
}
