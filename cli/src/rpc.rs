//! JSON-RPC backend: deployed ledger contracts signed for by a local key
//!
//! Chains become known to the wallet through `add_chain`, which connects to
//! the chain's first RPC URL and checks that the endpoint serves the
//! expected chain id. Reverts come back without a structured reason, so
//! `deposit`, `withdraw` and `fund` check the ledger's guards with view
//! calls first and report the `LedgerError` the contract would revert with.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::{
    network::EthereumWallet,
    primitives::Bytes,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol,
};
use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zk_ledger::{Address, Amount, DepositRecord, Hash32, LedgerError};

use crate::config::{ChainConfig, ChainParams, SIGNER_KEY_ENV};
use crate::ports::{ChainError, LedgerPort, PendingTx, TxReceipt, WalletError, WalletPort};

sol! {
    #[sol(rpc)]
    interface IZkLedger {
        function deposit(bytes32 commitment) external payable;

        function withdraw(
            uint256 amount,
            address recipient,
            bytes32 nullifierHash,
            bytes calldata proof
        ) external;

        function getBalance() external view returns (uint256);
        function verifier() external view returns (address);

        function deposits(bytes32 commitment) external view returns (
            uint256 amount,
            address depositor,
            bool withdrawn
        );

        function nullifiers(bytes32 nullifierHash) external view returns (bool);
    }
}

fn rpc_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

#[derive(Default)]
struct Session {
    providers: BTreeMap<u64, DynProvider>,
    active: Option<u64>,
}

/// Signing environment backed by a private key and per-chain HTTP providers
#[derive(Clone)]
pub struct RpcWallet {
    signer: PrivateKeySigner,
    session: Arc<Mutex<Session>>,
    receipt_poll: Duration,
}

impl RpcWallet {
    pub fn new(private_key: &str, receipt_poll: Duration) -> Result<Self, WalletError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| WalletError::Request(format!("Invalid private key: {}", e)))?;
        Ok(Self {
            signer,
            session: Arc::new(Mutex::new(Session::default())),
            receipt_poll,
        })
    }

    /// Wallet for the key in `ZKBRIDGE_PRIVATE_KEY`
    pub fn from_env(receipt_poll: Duration) -> anyhow::Result<Self> {
        let key = std::env::var(SIGNER_KEY_ENV)
            .with_context(|| format!("{} must hold the signer's private key", SIGNER_KEY_ENV))?;
        Ok(Self::new(&key, receipt_poll)?)
    }

    fn connect(&self, rpc_url: &str) -> Result<DynProvider, WalletError> {
        let wallet = EthereumWallet::from(self.signer.clone());
        Ok(DynProvider::new(
            ProviderBuilder::new().wallet(wallet).connect_http(rpc_url.parse().map_err(|e| {
                WalletError::Request(format!("Invalid RPC URL '{}': {}", rpc_url, e))
            })?),
        ))
    }
}

impl WalletPort for RpcWallet {
    type Ledger = RpcLedger;

    async fn account(&self) -> Result<Address, WalletError> {
        Ok(self.signer.address())
    }

    async fn chain_id(&self) -> Result<Option<u64>, WalletError> {
        Ok(self.session.lock().await.active)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let mut session = self.session.lock().await;
        if !session.providers.contains_key(&chain_id) {
            return Err(WalletError::UnrecognizedChain(chain_id));
        }
        session.active = Some(chain_id);
        debug!(chain_id, "wallet switched chain");
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError> {
        let rpc_url = params.rpc_urls.first().ok_or_else(|| {
            WalletError::Request(format!("no RPC URL for chain {}", params.chain_id))
        })?;
        let provider = self.connect(rpc_url)?;

        let served = provider
            .get_chain_id()
            .await
            .map_err(|e| WalletError::Request(format!("{}: {}", rpc_url, e)))?;
        if served != params.chain_id {
            return Err(WalletError::Request(format!(
                "{} serves chain {}, expected {}",
                rpc_url, served, params.chain_id
            )));
        }

        self.session
            .lock()
            .await
            .providers
            .insert(params.chain_id, provider);
        info!(chain_id = params.chain_id, name = %params.chain_name, "wallet added chain");
        Ok(())
    }

    async fn ledger(&self, config: &ChainConfig) -> Result<RpcLedger, WalletError> {
        let provider = {
            let session = self.session.lock().await;
            if session.active != Some(config.chain_id) {
                return Err(WalletError::Request(format!(
                    "wallet is not connected to chain {}",
                    config.chain_id
                )));
            }
            session
                .providers
                .get(&config.chain_id)
                .cloned()
                .ok_or(WalletError::UnrecognizedChain(config.chain_id))?
        };

        let code = provider
            .get_code_at(config.ledger_address)
            .await
            .map_err(|e| WalletError::Request(e.to_string()))?;
        if code.is_empty() {
            let missing = ChainError::NotDeployed {
                chain_id: config.chain_id,
                address: config.ledger_address,
            };
            return Err(WalletError::Request(missing.to_string()));
        }

        Ok(RpcLedger {
            provider,
            session: self.session.clone(),
            chain_id: config.chain_id,
            address: config.ledger_address,
            account: self.signer.address(),
            receipt_poll: self.receipt_poll,
        })
    }
}

/// Handle to a deployed ledger contract
#[derive(Clone)]
pub struct RpcLedger {
    provider: DynProvider,
    session: Arc<Mutex<Session>>,
    chain_id: u64,
    address: Address,
    account: Address,
    receipt_poll: Duration,
}

impl RpcLedger {
    async fn ensure_active(&self) -> Result<(), ChainError> {
        let active = self.session.lock().await.active.unwrap_or(0);
        if active != self.chain_id {
            return Err(ChainError::WrongChain {
                bound: self.chain_id,
                active,
            });
        }
        Ok(())
    }

    async fn ensure_affordable(&self, value: Amount) -> Result<(), ChainError> {
        let available = self
            .provider
            .get_balance(self.account)
            .await
            .map_err(rpc_err)?;
        if available < value {
            return Err(ChainError::InsufficientFunds {
                needed: value,
                available,
            });
        }
        Ok(())
    }

    fn submitted(&self, tx_hash: Hash32, action: &str) -> PendingTx {
        debug!(chain_id = self.chain_id, tx = %tx_hash, action, "transaction submitted");
        PendingTx {
            tx_hash,
            chain_id: self.chain_id,
        }
    }

    fn convert_receipt(&self, receipt: &TransactionReceipt) -> TxReceipt {
        TxReceipt {
            tx_hash: receipt.transaction_hash,
            chain_id: self.chain_id,
            block_number: receipt.block_number.unwrap_or(0),
            success: receipt.status(),
        }
    }
}

impl LedgerPort for RpcLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn deposit(&self, commitment: Hash32, value: Amount) -> Result<PendingTx, ChainError> {
        self.ensure_active().await?;
        if value.is_zero() {
            return Err(ChainError::Reverted(LedgerError::ZeroValue));
        }

        let ledger = IZkLedger::new(self.address, &self.provider);
        let existing = ledger.deposits(commitment).call().await.map_err(rpc_err)?;
        if existing.depositor != Address::ZERO {
            return Err(ChainError::Reverted(LedgerError::DuplicateCommitment(
                commitment,
            )));
        }
        self.ensure_affordable(value).await?;

        let pending = ledger
            .deposit(commitment)
            .value(value)
            .send()
            .await
            .map_err(rpc_err)?;
        Ok(self.submitted(*pending.tx_hash(), "deposit"))
    }

    async fn withdraw(
        &self,
        amount: Amount,
        recipient: Address,
        nullifier_hash: Hash32,
        proof: &[u8],
    ) -> Result<PendingTx, ChainError> {
        self.ensure_active().await?;
        if amount.is_zero() {
            return Err(ChainError::Reverted(LedgerError::ZeroValue));
        }

        let ledger = IZkLedger::new(self.address, &self.provider);
        let available = ledger.getBalance().call().await.map_err(rpc_err)?;
        if available < amount {
            return Err(ChainError::Reverted(LedgerError::InsufficientLiquidity {
                requested: amount,
                available,
            }));
        }
        if ledger.nullifiers(nullifier_hash).call().await.map_err(rpc_err)? {
            return Err(ChainError::Reverted(LedgerError::NullifierAlreadyUsed(
                nullifier_hash,
            )));
        }

        let pending = ledger
            .withdraw(amount, recipient, nullifier_hash, Bytes::copy_from_slice(proof))
            .send()
            .await
            .map_err(rpc_err)?;
        Ok(self.submitted(*pending.tx_hash(), "withdraw"))
    }

    async fn fund(&self, value: Amount) -> Result<PendingTx, ChainError> {
        self.ensure_active().await?;
        if value.is_zero() {
            return Err(ChainError::Reverted(LedgerError::ZeroValue));
        }
        self.ensure_affordable(value).await?;

        let tx = TransactionRequest::default().to(self.address).value(value);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(rpc_err)?;
        Ok(self.submitted(*pending.tx_hash(), "fund"))
    }

    async fn wait_finalized(&self, tx: &PendingTx) -> Result<TxReceipt, ChainError> {
        if tx.chain_id != self.chain_id {
            return Err(ChainError::UnknownTransaction(tx.tx_hash));
        }
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx.tx_hash)
                .await
                .map_err(rpc_err)?;
            if let Some(receipt) = receipt {
                return Ok(self.convert_receipt(&receipt));
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }

    async fn get_balance(&self) -> Result<Amount, ChainError> {
        self.ensure_active().await?;
        IZkLedger::new(self.address, &self.provider)
            .getBalance()
            .call()
            .await
            .map_err(rpc_err)
    }

    async fn verifier(&self) -> Result<Address, ChainError> {
        self.ensure_active().await?;
        IZkLedger::new(self.address, &self.provider)
            .verifier()
            .call()
            .await
            .map_err(rpc_err)
    }

    async fn signer_balance(&self) -> Result<Amount, ChainError> {
        self.provider
            .get_balance(self.account)
            .await
            .map_err(rpc_err)
    }

    async fn deposit_of(&self, commitment: Hash32) -> Result<Option<DepositRecord>, ChainError> {
        self.ensure_active().await?;
        let record = IZkLedger::new(self.address, &self.provider)
            .deposits(commitment)
            .call()
            .await
            .map_err(rpc_err)?;
        if record.depositor == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(DepositRecord {
            commitment,
            amount: record.amount,
            depositor: record.depositor,
            withdrawn: record.withdrawn,
        }))
    }

    async fn is_nullifier_spent(&self, nullifier_hash: Hash32) -> Result<bool, ChainError> {
        self.ensure_active().await?;
        IZkLedger::new(self.address, &self.provider)
            .nullifiers(nullifier_hash)
            .call()
            .await
            .map_err(rpc_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainRegistry, Network};

    /// First well-known development account
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> RpcWallet {
        RpcWallet::new(DEV_KEY, Duration::from_millis(10)).unwrap()
    }

    #[tokio::test]
    async fn test_account_from_private_key() {
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(wallet().account().await.unwrap(), expected);
    }

    #[test]
    fn test_invalid_private_key() {
        let err = RpcWallet::new("0x1234", Duration::ZERO).err().unwrap();
        assert!(matches!(err, WalletError::Request(_)));
    }

    #[tokio::test]
    async fn test_unknown_chain_needs_add() {
        let wallet = wallet();
        assert_eq!(wallet.chain_id().await.unwrap(), None);
        assert_eq!(
            wallet.switch_chain(11155111).await,
            Err(WalletError::UnrecognizedChain(11155111))
        );
    }

    #[tokio::test]
    async fn test_ledger_requires_active_chain() {
        let registry = ChainRegistry::builtin();
        let sepolia = registry.get(Network::Sepolia).unwrap();
        assert!(matches!(
            wallet().ledger(sepolia).await,
            Err(WalletError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_add_chain_rejects_bad_endpoints() {
        let registry = ChainRegistry::builtin();
        let mut params = registry.get(Network::Sepolia).unwrap().params();
        let wallet = wallet();

        params.rpc_urls = vec!["not a url".to_string()];
        assert!(matches!(wallet.add_chain(&params).await, Err(WalletError::Request(_))));

        params.rpc_urls.clear();
        assert!(matches!(wallet.add_chain(&params).await, Err(WalletError::Request(_))));

        // Nothing listens on port 1
        params.rpc_urls = vec!["http://127.0.0.1:1".to_string()];
        assert!(matches!(wallet.add_chain(&params).await, Err(WalletError::Request(_))));

        assert_eq!(
            wallet.switch_chain(params.chain_id).await,
            Err(WalletError::UnrecognizedChain(params.chain_id))
        );
    }
}
