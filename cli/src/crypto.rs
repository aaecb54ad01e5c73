//! Commitment generation for zkbridge swaps
//!
//! A swap is authorized by a fresh 32-byte secret. From it the client derives
//! the public commitment (deposited on the source ledger), the nullifier hash
//! and the proof blob (both presented to the target ledger).
//!
//! Security features:
//! - Secrets come from the OS CSPRNG, one per swap attempt
//! - Secret and proof bytes are zeroized on drop
//! - `Debug` never prints secret material

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};
use zk_ledger::abi::{commitment_hash, encode_proof, nullifier_hash};
use zk_ledger::{Address, Amount, Hash32};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),
}

// ============================================================================
// Secret material
// ============================================================================

/// The swap secret. Never leaves the client in the clear except inside the proof.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; 32]);

impl Secret {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Encoded withdrawal proof. Embeds the secret, so it is treated like one.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Proof(Vec<u8>);

impl Proof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proof({} bytes)", self.0.len())
    }
}

impl Serialize for Proof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Proof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Everything a client needs to deposit and later withdraw one swap
#[derive(Debug)]
pub struct BridgeNote {
    pub secret: Secret,
    pub commitment: Hash32,
    pub nullifier_hash: Hash32,
    pub proof: Proof,
}

/// Parse a recipient address: `0x` and 40 hex digits, not the zero address.
/// Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_recipient(input: &str) -> Result<Address, CryptoError> {
    let input = input.trim();
    let invalid = |reason: String| CryptoError::InvalidAddress(format!("{}: {}", input, reason));

    let digits = input
        .strip_prefix("0x")
        .ok_or_else(|| invalid("missing 0x prefix".to_string()))?;
    if digits.len() != 40 {
        return Err(invalid(format!("expected 40 hex digits, got {}", digits.len())));
    }

    let mixed_case = digits.bytes().any(|b| b.is_ascii_uppercase())
        && digits.bytes().any(|b| b.is_ascii_lowercase());
    let address = if mixed_case {
        Address::parse_checksummed(input, None).map_err(|e| invalid(e.to_string()))?
    } else {
        input.parse::<Address>().map_err(|e| invalid(e.to_string()))?
    };

    if address.is_zero() {
        return Err(CryptoError::InvalidAddress("zero address".to_string()));
    }
    Ok(address)
}

/// Generate a fresh note for `amount` payable to `recipient`
pub fn generate(amount: Amount, recipient: &Address) -> Result<BridgeNote, CryptoError> {
    derive(Secret::random(), amount, recipient)
}

/// Derive the note for a given secret
pub fn derive(secret: Secret, amount: Amount, recipient: &Address) -> Result<BridgeNote, CryptoError> {
    if amount.is_zero() {
        return Err(CryptoError::InvalidAmount);
    }
    if recipient.is_zero() {
        return Err(CryptoError::InvalidAddress("zero address".to_string()));
    }

    let commitment = commitment_hash(secret.as_bytes(), amount, recipient);
    let nullifier_hash = nullifier_hash(secret.as_bytes(), recipient);
    let proof = Proof(encode_proof(amount, recipient, secret.as_bytes()));

    Ok(BridgeNote {
        secret,
        commitment,
        nullifier_hash,
        proof,
    })
}
