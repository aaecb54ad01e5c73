//! Value types shared by the ledger and its clients
//!
//! Addresses, hashes and amounts are the `alloy-primitives` types, so they
//! carry EVM semantics (EIP-55 display, 256-bit amounts) and serialize as
//! hex strings usable as JSON map keys.

use alloy_primitives::hex;

pub use alloy_primitives::{keccak256, Address, B256 as Hash32, U256};

/// Amounts are denominated in the smallest native unit (18 decimals on EVM chains)
pub type Amount = U256;

/// Abbreviated rendering for log lines
pub trait ShortHex {
    /// First 8 bytes as hex
    fn short(&self) -> String;
}

impl ShortHex for Hash32 {
    fn short(&self) -> String {
        hex::encode(&self[..8])
    }
}
