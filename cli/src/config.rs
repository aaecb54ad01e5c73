//! Configuration for the zkbridge CLI
//!
//! - `Network`: closed set of supported networks
//! - `ChainRegistry`: immutable network -> `ChainConfig` table, built-in
//!   defaults plus optional overrides from `networks.json`
//! - `BridgeSettings`: backend, timing, fee and verifier settings from `settings.json`

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zk_ledger::Address;

/// Default directory for bridge state
const BRIDGE_DIR: &str = ".zkbridge";
const SETTINGS_FILE: &str = "settings.json";
const NETWORKS_FILE: &str = "networks.json";
const DEVNET_FILE: &str = "devnet.json";
const NOTES_DIR: &str = "notes";

/// Ledger contract address shared by every deterministic deployment
pub const DEFAULT_LEDGER_ADDRESS: &str = "0x6Ba4f5b055C57BAd4C05eC0E45Ac078c5E59d9C9";

/// Verifier the ledger deployments were constructed with
pub const DEFAULT_VERIFIER_ADDRESS: &str = "0x784483390D553c712f2330d766460745b274fc42";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    MantleSepolia,
    FlowTestnet,
    RoninTestnet,
    FlareCoston2,
    SagaTest,
    SagaDemo,
    Sepolia,
    BaseSepolia,
}

impl Network {
    pub const ALL: [Network; 8] = [
        Network::MantleSepolia,
        Network::FlowTestnet,
        Network::RoninTestnet,
        Network::FlareCoston2,
        Network::SagaTest,
        Network::SagaDemo,
        Network::Sepolia,
        Network::BaseSepolia,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Network::MantleSepolia => "mantle-sepolia",
            Network::FlowTestnet => "flow-testnet",
            Network::RoninTestnet => "ronin-testnet",
            Network::FlareCoston2 => "flare-coston2",
            Network::SagaTest => "saga-test",
            Network::SagaDemo => "saga-demo",
            Network::Sepolia => "sepolia",
            Network::BaseSepolia => "base-sepolia",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Network::ALL
            .into_iter()
            .find(|n| n.key() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown network '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub network: Network,
    pub chain_name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub ledger_address: Address,
    pub currency: NativeCurrency,
    pub explorer_url: String,
}

/// Parameters a signing environment needs to register an unknown chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainConfig {
    pub fn params(&self) -> ChainParams {
        ChainParams {
            chain_id: self.chain_id,
            chain_name: self.chain_name.clone(),
            native_currency: self.currency.clone(),
            rpc_urls: vec![self.rpc_url.clone()],
            block_explorer_urls: vec![self.explorer_url.clone()],
        }
    }

    /// Chain id as the 0x-prefixed hex quantity wallets expect
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    pub fn tx_url(&self, tx_hash: &impl fmt::Display) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

struct Builtin {
    network: Network,
    chain_name: &'static str,
    chain_id: u64,
    rpc_url: &'static str,
    currency: (&'static str, &'static str),
    explorer_url: &'static str,
}

const BUILTIN: [Builtin; 8] = [
    Builtin {
        network: Network::MantleSepolia,
        chain_name: "Mantle Sepolia",
        chain_id: 5003,
        rpc_url: "https://rpc.sepolia.mantle.xyz",
        currency: ("MNT", "MNT"),
        explorer_url: "https://sepolia.mantle.xyz",
    },
    Builtin {
        network: Network::FlowTestnet,
        chain_name: "Flow Testnet",
        chain_id: 545,
        rpc_url: "https://testnet.evm.nodes.onflow.org",
        currency: ("FLOW", "FLOW"),
        explorer_url: "https://testnet.flowdiver.io",
    },
    Builtin {
        network: Network::RoninTestnet,
        chain_name: "Ronin Testnet",
        chain_id: 2021,
        rpc_url: "https://saigon-testnet.roninchain.com/rpc",
        currency: ("RON", "RON"),
        explorer_url: "https://saigon-explorer.roninchain.com",
    },
    Builtin {
        network: Network::FlareCoston2,
        chain_name: "Flare Coston2",
        chain_id: 114,
        rpc_url: "https://coston2-api.flare.network/ext/C/rpc",
        currency: ("C2FLR", "C2FLR"),
        explorer_url: "https://coston2-explorer.flare.network",
    },
    Builtin {
        network: Network::SagaTest,
        chain_name: "SagaTest",
        chain_id: 2751645467413000,
        rpc_url: "https://sagatest-2751645467413000-1.jsonrpc.sagarpc.io",
        currency: ("SAGA", "SAGA"),
        explorer_url: "https://sagatest-2751645467413000-1.jsonrpc.sagarpc.io",
    },
    Builtin {
        network: Network::SagaDemo,
        chain_name: "SagaDemo",
        chain_id: 2751645565611000,
        rpc_url: "https://sagademo-2751645565611000-1.jsonrpc.sagarpc.io",
        currency: ("SAGAD", "SAGAD"),
        explorer_url: "https://sagademo-2751645565611000-1.jsonrpc.sagarpc.io",
    },
    Builtin {
        network: Network::Sepolia,
        chain_name: "Sepolia",
        chain_id: 11155111,
        rpc_url: "https://rpc.sepolia.org",
        currency: ("SepoliaETH", "ETH"),
        explorer_url: "https://sepolia.etherscan.io",
    },
    Builtin {
        network: Network::BaseSepolia,
        chain_name: "Base Sepolia",
        chain_id: 84532,
        rpc_url: "https://sepolia.base.org",
        currency: ("SepoliaETH", "ETH"),
        explorer_url: "https://sepolia.basescan.org",
    },
];

/// Per-network overrides read from `networks.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOverride {
    pub ledger_address: Option<Address>,
    pub rpc_url: Option<String>,
    pub explorer_url: Option<String>,
}

/// Immutable lookup table of supported networks
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<Network, ChainConfig>,
}

impl ChainRegistry {
    pub fn builtin() -> Self {
        Self::with_overrides(&BTreeMap::new())
    }

    pub fn with_overrides(overrides: &BTreeMap<Network, NetworkOverride>) -> Self {
        let default_ledger: Address = DEFAULT_LEDGER_ADDRESS
            .parse()
            .unwrap_or(Address::ZERO);

        let chains = BUILTIN
            .iter()
            .map(|b| {
                let o = overrides.get(&b.network).cloned().unwrap_or_default();
                let config = ChainConfig {
                    network: b.network,
                    chain_name: b.chain_name.to_string(),
                    chain_id: b.chain_id,
                    rpc_url: o.rpc_url.unwrap_or_else(|| b.rpc_url.to_string()),
                    ledger_address: o.ledger_address.unwrap_or(default_ledger),
                    currency: NativeCurrency {
                        name: b.currency.0.to_string(),
                        symbol: b.currency.1.to_string(),
                        decimals: 18,
                    },
                    explorer_url: o.explorer_url.unwrap_or_else(|| b.explorer_url.to_string()),
                };
                (b.network, config)
            })
            .collect();

        Self { chains }
    }

    /// Built-in table with `networks.json` applied, if present
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(NETWORKS_FILE);
        if !path.exists() {
            return Ok(Self::builtin());
        }

        let json = fs::read_to_string(&path).context("Failed to read networks file")?;
        let overrides: BTreeMap<Network, NetworkOverride> =
            serde_json::from_str(&json).context("Failed to parse networks file")?;
        Ok(Self::with_overrides(&overrides))
    }

    pub fn get(&self, network: Network) -> Option<&ChainConfig> {
        self.chains.get(&network)
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VerifierKind {
    AcceptAll,
    Opening,
}

/// Where swaps are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// In-process ledgers persisted in `devnet.json`
    #[default]
    Devnet,
    /// Deployed ledgers reached over each network's JSON-RPC endpoint
    Rpc,
}

/// Environment variable holding the signer's private key for the RPC backend
pub const SIGNER_KEY_ENV: &str = "ZKBRIDGE_PRIVATE_KEY";

/// Tunables read from `settings.json`; missing fields take defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub backend: Backend,
    /// Wait between deposit finality and withdrawal
    pub settlement_delay_secs: u64,
    /// Upper bound for every wallet or ledger call
    pub call_timeout_secs: u64,
    /// Pause after a network switch before deriving a fresh handle
    pub switch_settle_ms: u64,
    /// Interval between receipt lookups on the RPC backend
    pub receipt_poll_ms: u64,
    pub fee_bps: u32,
    /// Fractional digits the receivable amount is truncated to
    pub quote_precision: u8,
    /// Verifier used when deploying devnet ledgers
    pub verifier: VerifierKind,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Devnet,
            settlement_delay_secs: 30,
            call_timeout_secs: 60,
            switch_settle_ms: 2_000,
            receipt_poll_ms: 2_000,
            fee_bps: crate::fee::FEE_BPS,
            quote_precision: crate::fee::DEFAULT_PRECISION,
            verifier: VerifierKind::AcceptAll,
        }
    }
}

impl BridgeSettings {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(&path).context("Failed to read settings file")?;
        serde_json::from_str(&json).context("Failed to parse settings file")
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context("Failed to create config directory")?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(SETTINGS_FILE), json).context("Failed to write settings file")
    }

    pub fn settlement_delay(&self) -> Duration {
        Duration::from_secs(self.settlement_delay_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn switch_settle(&self) -> Duration {
        Duration::from_millis(self.switch_settle_ms)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}

/// Get the default config directory (`~/.zkbridge`)
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(BRIDGE_DIR))
        .context("Could not find home directory")
}

pub fn devnet_file(dir: &Path) -> PathBuf {
    dir.join(DEVNET_FILE)
}

pub fn notes_dir(dir: &Path) -> PathBuf {
    dir.join(NOTES_DIR)
}

/// Write a file readable only by the owner
pub fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, contents)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)?;
    }

    Ok(())
}
