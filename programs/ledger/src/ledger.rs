//! Ledger contract state machine
//!
//! One instance per network. Holds liquidity, deposit records keyed by
//! commitment and the append-only nullifier registry. Instances on
//! different networks share nothing.
//!
//! Invariants:
//! - a commitment is recorded at most once
//! - a nullifier hash authorizes at most one withdrawal
//! - a failed withdrawal leaves balance, nullifiers and records untouched

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::abi::decode_proof;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{Address, Amount, Hash32, ShortHex};
use crate::verifier::{Verifier, WithdrawalInputs};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub commitment: Hash32,
    pub amount: Amount,
    pub depositor: Address,
    pub withdrawn: bool,
}

/// Persistent contract storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub balance: Amount,
    pub deposits: BTreeMap<Hash32, DepositRecord>,
    pub nullifiers: BTreeSet<Hash32>,
    pub deposit_count: u64,
    pub withdrawal_count: u64,
}

/// Moves native value out of the contract.
///
/// The ledger calls this last; an error reverts the withdrawal.
pub trait NativeTransfer {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger<V> {
    address: Address,
    verifier: V,
    state: LedgerState,
}

impl<V: Verifier> Ledger<V> {
    /// Deploy an empty ledger with an immutable verifier
    pub fn new(address: Address, verifier: V) -> Self {
        Self::from_state(address, verifier, LedgerState::default())
    }

    pub fn from_state(address: Address, verifier: V, state: LedgerState) -> Self {
        Self {
            address,
            verifier,
            state,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Address of the injected verifier
    pub fn verifier(&self) -> Address {
        self.verifier.address()
    }

    pub fn verifier_policy(&self) -> &V {
        &self.verifier
    }

    pub fn get_balance(&self) -> Amount {
        self.state.balance
    }

    pub fn deposit_of(&self, commitment: &Hash32) -> Option<&DepositRecord> {
        self.state.deposits.get(commitment)
    }

    pub fn is_nullifier_spent(&self, nullifier_hash: &Hash32) -> bool {
        self.state.nullifiers.contains(nullifier_hash)
    }

    /// Lock `value` under `commitment`
    pub fn deposit(
        &mut self,
        commitment: Hash32,
        value: Amount,
        depositor: Address,
    ) -> LedgerResult<()> {
        if value.is_zero() {
            return Err(LedgerError::ZeroValue);
        }
        if self.state.deposits.contains_key(&commitment) {
            warn!(ledger = %self.address, commitment = %commitment.short(), "duplicate commitment");
            return Err(LedgerError::DuplicateCommitment(commitment));
        }

        let balance = self
            .state
            .balance
            .checked_add(value)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.state.balance = balance;
        self.state.deposits.insert(
            commitment,
            DepositRecord {
                commitment,
                amount: value,
                depositor,
                withdrawn: false,
            },
        );
        self.state.deposit_count += 1;

        info!(
            ledger = %self.address,
            commitment = %commitment.short(),
            %value,
            %balance,
            "deposit recorded"
        );
        Ok(())
    }

    /// Plain native transfer into the contract (liquidity top-up)
    pub fn fund(&mut self, value: Amount) -> LedgerResult<()> {
        if value.is_zero() {
            return Err(LedgerError::ZeroValue);
        }
        self.state.balance = self
            .state
            .balance
            .checked_add(value)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        debug!(ledger = %self.address, %value, balance = %self.state.balance, "liquidity added");
        Ok(())
    }

    /// Pay `amount` to `recipient` against a one-time nullifier and a proof.
    ///
    /// Check order: liquidity, nullifier, proof. Effects are applied before
    /// the transfer and reverted if the transfer fails.
    pub fn withdraw<T: NativeTransfer + ?Sized>(
        &mut self,
        amount: Amount,
        recipient: Address,
        nullifier_hash: Hash32,
        proof: &[u8],
        sink: &mut T,
    ) -> LedgerResult<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroValue);
        }
        if self.state.balance < amount {
            return Err(LedgerError::InsufficientLiquidity {
                requested: amount,
                available: self.state.balance,
            });
        }
        if self.state.nullifiers.contains(&nullifier_hash) {
            warn!(ledger = %self.address, nullifier = %nullifier_hash.short(), "nullifier replay");
            return Err(LedgerError::NullifierAlreadyUsed(nullifier_hash));
        }

        let inputs = WithdrawalInputs {
            amount,
            recipient,
            nullifier_hash,
        };
        if !self.verifier.verify(&inputs, proof) {
            return Err(LedgerError::ProofRejected);
        }

        // Effects
        let previous_balance = self.state.balance;
        self.state.nullifiers.insert(nullifier_hash);
        self.state.balance -= amount;
        let opened = self.mark_opened_deposit(proof);

        // Interaction
        if let Err(reason) = sink.transfer(&recipient, amount) {
            self.state.nullifiers.remove(&nullifier_hash);
            self.state.balance = previous_balance;
            if let Some(commitment) = opened {
                if let Some(record) = self.state.deposits.get_mut(&commitment) {
                    record.withdrawn = false;
                }
            }
            warn!(ledger = %self.address, %recipient, %reason, "transfer failed, withdrawal reverted");
            return Err(LedgerError::TransferFailed { recipient, reason });
        }

        self.state.withdrawal_count += 1;
        info!(
            ledger = %self.address,
            nullifier = %nullifier_hash.short(),
            %recipient,
            %amount,
            balance = %self.state.balance,
            "withdrawal paid"
        );
        Ok(())
    }

    /// Flag the local deposit record the proof opens to, if this ledger holds it.
    /// Returns the commitment that was flipped.
    fn mark_opened_deposit(&mut self, proof: &[u8]) -> Option<Hash32> {
        let commitment = decode_proof(proof)?.commitment();
        let record = self.state.deposits.get_mut(&commitment)?;
        if record.withdrawn {
            return None;
        }
        record.withdrawn = true;
        Some(commitment)
    }
}
