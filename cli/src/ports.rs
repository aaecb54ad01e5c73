//! Boundaries to the outside world
//!
//! `WalletPort` is the signing environment (account, active chain, chain
//! registration). `LedgerPort` is a handle to one deployed ledger contract,
//! bound to the chain it was derived for. The orchestrator only talks to
//! these traits; `devnet` provides the in-process implementation and `rpc`
//! the JSON-RPC one.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zk_ledger::{Address, Amount, DepositRecord, Hash32, LedgerError};

use crate::config::{ChainConfig, ChainParams};

/// A submitted, not yet finalized transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_hash: Hash32,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: Hash32,
    pub chain_id: u64,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The contract reverted; carries the ledger's reason
    #[error("execution reverted: {0}")]
    Reverted(LedgerError),

    #[error("handle bound to chain {bound} but active chain is {active}")]
    WrongChain { bound: u64, active: u64 },

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("unknown transaction {0}")]
    UnknownTransaction(Hash32),

    #[error("no ledger deployed at {address} on chain {chain_id}")]
    NotDeployed { chain_id: u64, address: Address },

    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Handle to one ledger contract on one chain
pub trait LedgerPort: Send + Sync {
    fn chain_id(&self) -> u64;

    fn deposit(
        &self,
        commitment: Hash32,
        value: Amount,
    ) -> impl Future<Output = Result<PendingTx, ChainError>> + Send;

    fn withdraw(
        &self,
        amount: Amount,
        recipient: Address,
        nullifier_hash: Hash32,
        proof: &[u8],
    ) -> impl Future<Output = Result<PendingTx, ChainError>> + Send;

    /// Plain value transfer into the contract
    fn fund(&self, value: Amount) -> impl Future<Output = Result<PendingTx, ChainError>> + Send;

    fn wait_finalized(
        &self,
        tx: &PendingTx,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    fn get_balance(&self) -> impl Future<Output = Result<Amount, ChainError>> + Send;

    fn verifier(&self) -> impl Future<Output = Result<Address, ChainError>> + Send;

    /// Native balance of the signing account on this handle's chain
    fn signer_balance(&self) -> impl Future<Output = Result<Amount, ChainError>> + Send;

    fn deposit_of(
        &self,
        commitment: Hash32,
    ) -> impl Future<Output = Result<Option<DepositRecord>, ChainError>> + Send;

    fn is_nullifier_spent(
        &self,
        nullifier_hash: Hash32,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// The wallet does not know the chain; it must be added first
    #[error("unrecognized chain {0}")]
    UnrecognizedChain(u64),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("wallet request failed: {0}")]
    Request(String),
}

/// The signing environment
pub trait WalletPort: Send + Sync + 'static {
    type Ledger: LedgerPort + 'static;

    fn account(&self) -> impl Future<Output = Result<Address, WalletError>> + Send;

    /// Chain the environment currently signs for, if any
    fn chain_id(&self) -> impl Future<Output = Result<Option<u64>, WalletError>> + Send;

    fn switch_chain(&self, chain_id: u64) -> impl Future<Output = Result<(), WalletError>> + Send;

    fn add_chain(&self, params: &ChainParams)
        -> impl Future<Output = Result<(), WalletError>> + Send;

    /// Derive a ledger handle bound to the environment's current chain
    fn ledger(
        &self,
        config: &ChainConfig,
    ) -> impl Future<Output = Result<Self::Ledger, WalletError>> + Send;
}
