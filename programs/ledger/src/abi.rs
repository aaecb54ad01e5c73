//! Hash derivations and the proof blob, in Solidity `abi.encode` layout
//!
//! commitment     = keccak256(abi.encode(bytes32 secret, uint256 amount, address recipient))
//! nullifier hash = keccak256(abi.encode(bytes32 secret, address recipient))
//! proof          = abi.encode(uint256 amount, address recipient, bytes32 secret)

use alloy_primitives::keccak256;
use alloy_sol_types::SolValue;
use zeroize::Zeroize;

use crate::types::{Address, Amount, Hash32};

/// Encoded proof length: three words
pub const PROOF_LEN: usize = 96;

fn hash_wiped(mut encoded: Vec<u8>) -> Hash32 {
    let hash = keccak256(&encoded);
    encoded.zeroize();
    hash
}

pub fn commitment_hash(secret: &[u8; 32], amount: Amount, recipient: &Address) -> Hash32 {
    hash_wiped((Hash32::new(*secret), amount, *recipient).abi_encode())
}

pub fn nullifier_hash(secret: &[u8; 32], recipient: &Address) -> Hash32 {
    hash_wiped((Hash32::new(*secret), *recipient).abi_encode())
}

pub fn encode_proof(amount: Amount, recipient: &Address, secret: &[u8; 32]) -> Vec<u8> {
    (amount, *recipient, Hash32::new(*secret)).abi_encode()
}

/// The values a proof blob opens to
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct ProofOpening {
    #[zeroize(skip)]
    pub amount: Amount,
    #[zeroize(skip)]
    pub recipient: Address,
    pub secret: [u8; 32],
}

impl ProofOpening {
    /// Commitment this opening corresponds to
    pub fn commitment(&self) -> Hash32 {
        commitment_hash(&self.secret, self.amount, &self.recipient)
    }

    pub fn nullifier_hash(&self) -> Hash32 {
        nullifier_hash(&self.secret, &self.recipient)
    }
}

/// Decode a proof blob; `None` unless it is exactly the canonical encoding
/// (three words, clean address padding)
pub fn decode_proof(proof: &[u8]) -> Option<ProofOpening> {
    if proof.len() != PROOF_LEN {
        return None;
    }
    let (amount, recipient, secret) = <(Amount, Address, Hash32)>::abi_decode(proof).ok()?;
    let opening = ProofOpening {
        amount,
        recipient,
        secret: secret.0,
    };
    let mut canonical = encode_proof(opening.amount, &opening.recipient, &opening.secret);
    let clean = canonical == proof;
    canonical.zeroize();
    clean.then_some(opening)
}
