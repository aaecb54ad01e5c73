//! CLI command implementations

pub mod balance;
pub mod fund;
pub mod init;
pub mod inspect_note;
pub mod networks;
pub mod quote;
pub mod resume;
pub mod swap;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use zk_ledger::Amount;

use crate::config::{
    default_config_dir, devnet_file, notes_dir, Backend, BridgeSettings, ChainConfig,
    ChainRegistry, Network,
};
use crate::devnet::DevnetWallet;
use crate::fee::{format_units, parse_units};
use crate::orchestrator::{SwapOrchestrator, SwapState};
use crate::ports::WalletPort;
use crate::rpc::RpcWallet;
use crate::secure_storage::NoteVault;

/// A command body that runs against whichever wallet backend is configured
pub trait WalletTask {
    type Output;

    fn run<W: WalletPort>(
        self,
        ctx: &AppContext,
        wallet: Arc<W>,
    ) -> impl Future<Output = Result<Self::Output>>;
}

/// Configuration shared by every command
pub struct AppContext {
    pub config_dir: PathBuf,
    pub registry: ChainRegistry,
    pub settings: BridgeSettings,
}

impl AppContext {
    pub fn load(config_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };
        let registry = ChainRegistry::load(&config_dir)?;
        let settings = BridgeSettings::load(&config_dir)?;
        Ok(Self {
            config_dir,
            registry,
            settings,
        })
    }

    pub fn chain(&self, network: Network) -> Result<&ChainConfig> {
        self.registry
            .get(network)
            .with_context(|| format!("Network {} is not configured", network))
    }

    pub fn devnet_path(&self) -> PathBuf {
        devnet_file(&self.config_dir)
    }

    pub fn open_devnet(&self) -> Result<Arc<DevnetWallet>> {
        DevnetWallet::load(&self.devnet_path()).map(Arc::new)
    }

    pub async fn save_devnet(&self, wallet: &DevnetWallet) -> Result<()> {
        wallet.save(&self.devnet_path()).await
    }

    pub fn vault(&self) -> NoteVault {
        NoteVault::new(notes_dir(&self.config_dir))
    }

    /// Run `task` on the configured backend. The devnet is saved afterwards
    /// even when the task fails, so deposits made before a failure persist.
    pub async fn dispatch<T: WalletTask>(&self, task: T) -> Result<T::Output> {
        match self.settings.backend {
            Backend::Devnet => {
                let wallet = self.open_devnet()?;
                let outcome = task.run(self, wallet.clone()).await;
                self.save_devnet(&wallet).await?;
                outcome
            }
            Backend::Rpc => {
                let wallet = RpcWallet::from_env(self.settings.receipt_poll())?;
                task.run(self, Arc::new(wallet)).await
            }
        }
    }

    /// Await a wallet or ledger call, giving up after the call timeout
    pub async fn bounded<T, E, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let limit = self.settings.call_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.with_context(|| format!("{} failed", what)),
            Err(_) => Err(anyhow!("{} timed out after {:?}", what, limit)),
        }
    }

    pub fn orchestrator<W: WalletPort>(&self, wallet: Arc<W>) -> Result<Arc<SwapOrchestrator<W>>> {
        let orchestrator =
            SwapOrchestrator::from_settings(self.registry.clone(), wallet, &self.settings)
                .context("Invalid fee settings")?;
        Ok(Arc::new(orchestrator))
    }

    /// Parse a decimal amount in `network`'s native currency
    pub fn parse_amount(&self, network: Network, amount: &str) -> Result<Amount> {
        let decimals = self.chain(network)?.currency.decimals;
        parse_units(amount, decimals).with_context(|| format!("Invalid amount '{}'", amount))
    }

    /// Render an amount with the configured precision and currency symbol
    pub fn display_amount(&self, network: Network, amount: Amount) -> String {
        match self.registry.get(network) {
            Some(chain) => format!(
                "{} {}",
                format_units(amount, chain.currency.decimals, self.settings.quote_precision),
                chain.currency.symbol
            ),
            None => amount.to_string(),
        }
    }
}

pub(crate) fn print_transition(state: &SwapState) {
    match state {
        SwapState::Complete => println!("  {} {}", "✓".green(), "Complete".green().bold()),
        SwapState::Failed(failure) => {
            println!("  {} {}", "✗".red(), format!("Failed at {}", failure.step).red().bold());
            println!("    {}", failure.error.to_string().red());
        }
        other => println!("  {} {}", "→".cyan(), other),
    }
}
