//! Local devnet: an in-process signing environment with one ledger per chain
//!
//! Stands in for a browser wallet plus RPC endpoints. Every configured
//! network gets its own `Ledger<VerifierPolicy>` and native account
//! balances; nothing is shared between chains. The wallet tracks which
//! chains it has been told about and which one is active, and ledger
//! handles refuse to operate once the active chain moves away from the
//! chain they were derived for.
//!
//! State is persisted to `devnet.json` between CLI invocations.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use zk_ledger::{
    keccak256, Address, Amount, DepositRecord, Hash32, Ledger, LedgerState, NativeTransfer,
    VerifierPolicy,
};

use crate::config::{
    write_private, ChainConfig, ChainParams, ChainRegistry, Network, VerifierKind,
    DEFAULT_VERIFIER_ADDRESS,
};
use crate::ports::{ChainError, LedgerPort, PendingTx, TxReceipt, WalletError, WalletPort};

/// Signer used by a fresh devnet
pub const DEFAULT_SIGNER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevnetChain {
    pub network: Network,
    pub ledger: Ledger<VerifierPolicy>,
    pub accounts: BTreeMap<Address, Amount>,
    pub block_number: u64,
    pub nonce: u64,
    pub receipts: BTreeMap<Hash32, TxReceipt>,
    /// Accounts whose native transfers revert
    #[serde(default)]
    pub rejecting: BTreeSet<Address>,
}

impl DevnetChain {
    fn balance_of(&self, address: &Address) -> Amount {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    fn debit(&mut self, from: Address, value: Amount) -> Result<(), ChainError> {
        let available = self.balance_of(&from);
        if available < value {
            return Err(ChainError::InsufficientFunds {
                needed: value,
                available,
            });
        }
        self.accounts.insert(from, available - value);
        Ok(())
    }

    fn mine(&mut self, chain_id: u64) -> PendingTx {
        self.nonce += 1;
        self.block_number += 1;

        let mut preimage = [0u8; 24];
        preimage[..8].copy_from_slice(&chain_id.to_be_bytes());
        preimage[8..16].copy_from_slice(&self.block_number.to_be_bytes());
        preimage[16..].copy_from_slice(&self.nonce.to_be_bytes());
        let tx_hash = keccak256(preimage);

        self.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                chain_id,
                block_number: self.block_number,
                success: true,
            },
        );
        PendingTx { tx_hash, chain_id }
    }
}

/// Pays withdrawals out into the chain's native accounts
struct Payout<'a> {
    accounts: &'a mut BTreeMap<Address, Amount>,
    rejecting: &'a BTreeSet<Address>,
}

impl NativeTransfer for Payout<'_> {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), String> {
        if self.rejecting.contains(to) {
            return Err("recipient reverted on receive".to_string());
        }
        let balance = self.accounts.entry(*to).or_insert(Amount::ZERO);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| "recipient balance overflow".to_string())?;
        Ok(())
    }
}

/// Everything persisted in `devnet.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevnetState {
    pub account: Address,
    pub active_chain: Option<u64>,
    /// Chains the wallet has been told about
    pub known_chains: BTreeSet<u64>,
    pub chains: BTreeMap<u64, DevnetChain>,
}

impl DevnetState {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            active_chain: None,
            known_chains: BTreeSet::new(),
            chains: BTreeMap::new(),
        }
    }
}

/// Scripted failures for exercising error paths
#[derive(Debug, Default)]
struct Faults {
    switch_error: Option<String>,
    add_error: Option<String>,
    latency: Duration,
}

#[derive(Debug)]
struct Inner {
    state: DevnetState,
    faults: Faults,
    added: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct DevnetWallet {
    inner: Arc<Mutex<Inner>>,
}

impl DevnetWallet {
    pub fn new(account: Address) -> Self {
        Self::from_state(DevnetState::new(account))
    }

    pub fn from_state(state: DevnetState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                faults: Faults::default(),
                added: Vec::new(),
            })),
        }
    }

    /// Fresh devnet with a ledger on every registry network. The signer gets
    /// `signer_balance` and each ledger starts with `liquidity`.
    pub fn bootstrap(
        registry: &ChainRegistry,
        verifier: VerifierKind,
        signer: Address,
        signer_balance: Amount,
        liquidity: Amount,
    ) -> Result<Self> {
        let verifier_address: Address = DEFAULT_VERIFIER_ADDRESS
            .parse()
            .context("Invalid default verifier address")?;
        let policy = match verifier {
            VerifierKind::AcceptAll => VerifierPolicy::AcceptAll {
                address: verifier_address,
            },
            VerifierKind::Opening => VerifierPolicy::Opening {
                address: verifier_address,
            },
        };

        let mut state = DevnetState::new(signer);
        for config in registry.iter() {
            let mut ledger = Ledger::new(config.ledger_address, policy);
            if !liquidity.is_zero() {
                ledger
                    .fund(liquidity)
                    .with_context(|| format!("Failed to fund ledger on {}", config.network))?;
            }

            let mut accounts = BTreeMap::new();
            accounts.insert(signer, signer_balance);

            state.chains.insert(
                config.chain_id,
                DevnetChain {
                    network: config.network,
                    ledger,
                    accounts,
                    block_number: 0,
                    nonce: 0,
                    receipts: BTreeMap::new(),
                    rejecting: BTreeSet::new(),
                },
            );
        }

        info!(chains = state.chains.len(), %signer, "devnet bootstrapped");
        Ok(Self::from_state(state))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| {
            format!(
                "No devnet found at {}. Run 'zkbridge init' first.",
                path.display()
            )
        })?;
        let state: DevnetState =
            serde_json::from_str(&json).context("Failed to parse devnet state")?;
        Ok(Self::from_state(state))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;
        write_private(path, &json).context("Failed to write devnet state")
    }

    pub async fn snapshot(&self) -> DevnetState {
        self.inner.lock().await.state.clone()
    }

    /// Mark a chain as already known to the wallet
    pub async fn trust_chain(&self, chain_id: u64) {
        self.inner.lock().await.state.known_chains.insert(chain_id);
    }

    pub async fn mint(&self, chain_id: u64, to: Address, value: Amount) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().await;
        let chain = chain_mut(&mut inner.state, chain_id)?;
        let balance = chain.accounts.entry(to).or_insert(Amount::ZERO);
        *balance = balance.saturating_add(value);
        Ok(())
    }

    pub async fn reject_transfers_to(&self, chain_id: u64, address: Address) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().await;
        chain_mut(&mut inner.state, chain_id)?.rejecting.insert(address);
        Ok(())
    }

    pub async fn accept_transfers_to(&self, chain_id: u64, address: &Address) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().await;
        chain_mut(&mut inner.state, chain_id)?.rejecting.remove(address);
        Ok(())
    }

    pub async fn native_balance(&self, chain_id: u64, address: &Address) -> Amount {
        self.inner
            .lock()
            .await
            .state
            .chains
            .get(&chain_id)
            .map(|c| c.balance_of(address))
            .unwrap_or_default()
    }

    pub async fn ledger_state(&self, chain_id: u64) -> Option<LedgerState> {
        self.inner
            .lock()
            .await
            .state
            .chains
            .get(&chain_id)
            .map(|c| c.ledger.state().clone())
    }

    /// Chains registered through `add_chain`, in call order
    pub async fn added_chains(&self) -> Vec<u64> {
        self.inner.lock().await.added.clone()
    }

    pub async fn fail_switches(&self, reason: Option<&str>) {
        self.inner.lock().await.faults.switch_error = reason.map(str::to_string);
    }

    pub async fn fail_add_chain(&self, reason: Option<&str>) {
        self.inner.lock().await.faults.add_error = reason.map(str::to_string);
    }

    /// Delay every ledger call by `latency`
    pub async fn set_latency(&self, latency: Duration) {
        self.inner.lock().await.faults.latency = latency;
    }

    async fn latency(&self) -> Duration {
        self.inner.lock().await.faults.latency
    }
}

fn chain_mut(state: &mut DevnetState, chain_id: u64) -> Result<&mut DevnetChain, ChainError> {
    state
        .chains
        .get_mut(&chain_id)
        .ok_or_else(|| ChainError::Rpc(format!("chain {} is not running", chain_id)))
}

impl WalletPort for DevnetWallet {
    type Ledger = DevnetLedger;

    async fn account(&self) -> Result<Address, WalletError> {
        Ok(self.inner.lock().await.state.account)
    }

    async fn chain_id(&self) -> Result<Option<u64>, WalletError> {
        Ok(self.inner.lock().await.state.active_chain)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().await;
        if let Some(reason) = &inner.faults.switch_error {
            return Err(WalletError::Rejected(reason.clone()));
        }
        if !inner.state.known_chains.contains(&chain_id) {
            return Err(WalletError::UnrecognizedChain(chain_id));
        }
        inner.state.active_chain = Some(chain_id);
        debug!(chain_id, "wallet switched chain");
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().await;
        if let Some(reason) = &inner.faults.add_error {
            return Err(WalletError::Request(reason.clone()));
        }
        inner.state.known_chains.insert(params.chain_id);
        inner.added.push(params.chain_id);
        info!(chain_id = params.chain_id, name = %params.chain_name, "wallet added chain");
        Ok(())
    }

    async fn ledger(&self, config: &ChainConfig) -> Result<DevnetLedger, WalletError> {
        let inner = self.inner.lock().await;
        if inner.state.active_chain != Some(config.chain_id) {
            return Err(WalletError::Request(format!(
                "wallet is not connected to chain {}",
                config.chain_id
            )));
        }
        Ok(DevnetLedger {
            wallet: self.clone(),
            chain_id: config.chain_id,
            address: config.ledger_address,
        })
    }
}

/// Ledger handle bound to one chain
#[derive(Debug, Clone)]
pub struct DevnetLedger {
    wallet: DevnetWallet,
    chain_id: u64,
    address: Address,
}

impl DevnetLedger {
    /// Run `f` against this handle's chain once the wallet confirms it is
    /// still the active one
    async fn with_chain<R, F>(&self, f: F) -> Result<R, ChainError>
    where
        F: FnOnce(&mut DevnetChain, Address) -> Result<R, ChainError> + Send,
    {
        let latency = self.wallet.latency().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.wallet.inner.lock().await;
        let active = inner.state.active_chain.unwrap_or(0);
        if active != self.chain_id {
            return Err(ChainError::WrongChain {
                bound: self.chain_id,
                active,
            });
        }

        let signer = inner.state.account;
        let chain = chain_mut(&mut inner.state, self.chain_id)?;
        if chain.ledger.address() != self.address {
            return Err(ChainError::NotDeployed {
                chain_id: self.chain_id,
                address: self.address,
            });
        }
        f(chain, signer)
    }
}

impl LedgerPort for DevnetLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn deposit(&self, commitment: Hash32, value: Amount) -> Result<PendingTx, ChainError> {
        let chain_id = self.chain_id;
        self.with_chain(move |chain, signer| {
            let available = chain.balance_of(&signer);
            if available < value {
                return Err(ChainError::InsufficientFunds {
                    needed: value,
                    available,
                });
            }
            chain
                .ledger
                .deposit(commitment, value, signer)
                .map_err(ChainError::Reverted)?;
            chain.debit(signer, value)?;
            Ok(chain.mine(chain_id))
        })
        .await
    }

    async fn withdraw(
        &self,
        amount: Amount,
        recipient: Address,
        nullifier_hash: Hash32,
        proof: &[u8],
    ) -> Result<PendingTx, ChainError> {
        let chain_id = self.chain_id;
        self.with_chain(move |chain, _signer| {
            let mut payout = Payout {
                accounts: &mut chain.accounts,
                rejecting: &chain.rejecting,
            };
            chain
                .ledger
                .withdraw(amount, recipient, nullifier_hash, proof, &mut payout)
                .map_err(ChainError::Reverted)?;
            Ok(chain.mine(chain_id))
        })
        .await
    }

    async fn fund(&self, value: Amount) -> Result<PendingTx, ChainError> {
        let chain_id = self.chain_id;
        self.with_chain(move |chain, signer| {
            chain.debit(signer, value)?;
            if let Err(e) = chain.ledger.fund(value) {
                let refund = chain.accounts.entry(signer).or_insert(Amount::ZERO);
                *refund = refund.saturating_add(value);
                return Err(ChainError::Reverted(e));
            }
            Ok(chain.mine(chain_id))
        })
        .await
    }

    async fn wait_finalized(&self, tx: &PendingTx) -> Result<TxReceipt, ChainError> {
        let tx_hash = tx.tx_hash;
        if tx.chain_id != self.chain_id {
            return Err(ChainError::UnknownTransaction(tx_hash));
        }
        self.with_chain(move |chain, _| {
            chain
                .receipts
                .get(&tx_hash)
                .copied()
                .ok_or(ChainError::UnknownTransaction(tx_hash))
        })
        .await
    }

    async fn get_balance(&self) -> Result<Amount, ChainError> {
        self.with_chain(|chain, _| Ok(chain.ledger.get_balance())).await
    }

    async fn verifier(&self) -> Result<Address, ChainError> {
        self.with_chain(|chain, _| Ok(chain.ledger.verifier())).await
    }

    async fn signer_balance(&self) -> Result<Amount, ChainError> {
        self.with_chain(|chain, signer| Ok(chain.balance_of(&signer))).await
    }

    async fn deposit_of(&self, commitment: Hash32) -> Result<Option<DepositRecord>, ChainError> {
        self.with_chain(move |chain, _| Ok(chain.ledger.deposit_of(&commitment).cloned()))
            .await
    }

    async fn is_nullifier_spent(&self, nullifier_hash: Hash32) -> Result<bool, ChainError> {
        self.with_chain(move |chain, _| Ok(chain.ledger.is_nullifier_spent(&nullifier_hash)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: Amount = Amount::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

    fn units(n: u64) -> Amount {
        Amount::from(n) * ONE
    }

    fn signer() -> Address {
        DEFAULT_SIGNER.parse().unwrap()
    }

    async fn connected(network: Network) -> (DevnetWallet, ChainConfig) {
        let registry = ChainRegistry::builtin();
        let wallet =
            DevnetWallet::bootstrap(&registry, VerifierKind::AcceptAll, signer(), units(10), ONE)
                .unwrap();
        let config = registry.get(network).unwrap().clone();
        wallet.trust_chain(config.chain_id).await;
        wallet.switch_chain(config.chain_id).await.unwrap();
        (wallet, config)
    }

    #[tokio::test]
    async fn test_switch_to_unknown_chain_needs_add() {
        let registry = ChainRegistry::builtin();
        let config = registry.get(Network::Sepolia).unwrap();
        let wallet = DevnetWallet::new(signer());

        assert_eq!(
            wallet.switch_chain(config.chain_id).await,
            Err(WalletError::UnrecognizedChain(config.chain_id))
        );
        wallet.add_chain(&config.params()).await.unwrap();
        wallet.switch_chain(config.chain_id).await.unwrap();
        assert_eq!(wallet.chain_id().await.unwrap(), Some(config.chain_id));
        assert_eq!(wallet.added_chains().await, vec![config.chain_id]);
    }

    #[tokio::test]
    async fn test_deposit_debits_signer() {
        let (wallet, config) = connected(Network::MantleSepolia).await;
        let ledger = wallet.ledger(&config).await.unwrap();

        let tx = ledger.deposit(Hash32::new([1; 32]), ONE).await.unwrap();
        let receipt = ledger.wait_finalized(&tx).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 1);

        assert_eq!(ledger.get_balance().await.unwrap(), units(2));
        assert_eq!(ledger.signer_balance().await.unwrap(), units(9));
        assert_eq!(wallet.native_balance(config.chain_id, &signer()).await, units(9));
    }

    #[tokio::test]
    async fn test_deposit_beyond_signer_balance() {
        let (wallet, config) = connected(Network::MantleSepolia).await;
        let ledger = wallet.ledger(&config).await.unwrap();

        let err = ledger.deposit(Hash32::new([1; 32]), units(11)).await.unwrap_err();
        assert!(matches!(err, ChainError::InsufficientFunds { .. }));
        assert_eq!(ledger.get_balance().await.unwrap(), ONE);
    }

    #[tokio::test]
    async fn test_stale_handle_rejected() {
        let registry = ChainRegistry::builtin();
        let (wallet, mantle) = connected(Network::MantleSepolia).await;
        let stale = wallet.ledger(&mantle).await.unwrap();

        let flow = registry.get(Network::FlowTestnet).unwrap();
        wallet.trust_chain(flow.chain_id).await;
        wallet.switch_chain(flow.chain_id).await.unwrap();

        let err = stale.get_balance().await.unwrap_err();
        assert_eq!(
            err,
            ChainError::WrongChain {
                bound: mantle.chain_id,
                active: flow.chain_id
            }
        );
    }

    #[tokio::test]
    async fn test_handle_requires_active_chain() {
        let registry = ChainRegistry::builtin();
        let (wallet, _) = connected(Network::MantleSepolia).await;
        let flow = registry.get(Network::FlowTestnet).unwrap();
        assert!(wallet.ledger(flow).await.is_err());
    }

    #[tokio::test]
    async fn test_withdraw_to_rejecting_recipient_reverts() {
        let (wallet, config) = connected(Network::FlowTestnet).await;
        let recipient: Address = "0x2222222222222222222222222222222222222222".parse().unwrap();
        wallet.reject_transfers_to(config.chain_id, recipient).await.unwrap();

        let ledger = wallet.ledger(&config).await.unwrap();
        let nullifier = Hash32::new([7; 32]);
        let err = ledger
            .withdraw(ONE / Amount::from(2), recipient, nullifier, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Reverted(zk_ledger::LedgerError::TransferFailed { .. })
        ));
        assert!(!ledger.is_nullifier_spent(nullifier).await.unwrap());
        assert_eq!(ledger.get_balance().await.unwrap(), ONE);
    }

    #[tokio::test]
    async fn test_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devnet.json");

        let (wallet, config) = connected(Network::Sepolia).await;
        let ledger = wallet.ledger(&config).await.unwrap();
        ledger.deposit(Hash32::new([3; 32]), ONE).await.unwrap();
        wallet.save(&path).await.unwrap();

        let reloaded = DevnetWallet::load(&path).unwrap();
        assert_eq!(reloaded.chain_id().await.unwrap(), Some(config.chain_id));
        let state = reloaded.ledger_state(config.chain_id).await.unwrap();
        assert_eq!(state.deposit_count, 1);
        assert!(state.deposits.contains_key(&Hash32::new([3; 32])));
    }
}
