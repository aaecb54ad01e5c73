//! Network context switching
//!
//! The signing environment has one process-wide active chain. A swap needs
//! two of them in sequence, so every chain-bound step goes through
//! `NetworkSwitcher::ensure`, which returns an `ActiveContext` holding the
//! switcher's session lock. While a context is alive no other caller can
//! move the active chain, and its ledger handle is derived after the switch
//! so it is never bound to a previous chain.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::ChainConfig;
use crate::ports::{WalletError, WalletPort};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("failed to switch to chain {chain_id}: {reason}")]
    NetworkSwitchFailed { chain_id: u64, reason: String },

    #[error("wallet did not respond within {0:?}")]
    Timeout(Duration),
}

/// A ledger handle plus exclusive use of the active chain
pub struct ActiveContext<L> {
    pub chain: ChainConfig,
    pub ledger: L,
    _session: OwnedMutexGuard<()>,
}

impl<L> ActiveContext<L> {
    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }
}

pub struct NetworkSwitcher<W> {
    wallet: Arc<W>,
    session: Arc<Mutex<()>>,
    settle: Duration,
    call_timeout: Duration,
}

impl<W: WalletPort> NetworkSwitcher<W> {
    pub fn new(wallet: Arc<W>, settle: Duration, call_timeout: Duration) -> Self {
        Self {
            wallet,
            session: Arc::new(Mutex::new(())),
            settle,
            call_timeout,
        }
    }

    pub fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    /// Make `chain` the active chain and return a fresh context bound to it
    pub async fn ensure(&self, chain: &ChainConfig) -> Result<ActiveContext<W::Ledger>, SwitchError> {
        let session = self.session.clone().lock_owned().await;
        let chain_id = chain.chain_id;
        let failed = |reason: String| SwitchError::NetworkSwitchFailed { chain_id, reason };

        let current = self.bounded(self.wallet.chain_id()).await?.map_err(|e| failed(e.to_string()))?;

        if current != Some(chain_id) {
            debug!(from = ?current, to = chain_id, network = %chain.network, "switching chain");
            match self.bounded(self.wallet.switch_chain(chain_id)).await? {
                Ok(()) => {}
                Err(WalletError::UnrecognizedChain(_)) => {
                    info!(chain_id, network = %chain.network, "chain unknown to wallet, adding");
                    self.bounded(self.wallet.add_chain(&chain.params()))
                        .await?
                        .map_err(|e| failed(format!("add chain: {}", e)))?;
                    self.bounded(self.wallet.switch_chain(chain_id))
                        .await?
                        .map_err(|e| failed(format!("switch after add: {}", e)))?;
                }
                Err(e) => {
                    warn!(chain_id, error = %e, "chain switch refused");
                    return Err(failed(e.to_string()));
                }
            }

            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }
        }

        let ledger = self
            .bounded(self.wallet.ledger(chain))
            .await?
            .map_err(|e| failed(e.to_string()))?;

        let active = self.bounded(self.wallet.chain_id()).await?.map_err(|e| failed(e.to_string()))?;
        if active != Some(chain_id) {
            return Err(failed(format!("wallet reports chain {:?} after switch", active)));
        }

        debug!(chain_id, network = %chain.network, "context ready");
        Ok(ActiveContext {
            chain: chain.clone(),
            ledger,
            _session: session,
        })
    }

    async fn bounded<T>(&self, call: impl Future<Output = T>) -> Result<T, SwitchError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| SwitchError::Timeout(self.call_timeout))
    }
}
