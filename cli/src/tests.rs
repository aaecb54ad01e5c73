//! Unit tests for the zkbridge CLI
//!
//! Tests cover:
//! - Network registry and overrides
//! - Settings defaults and partial files
//! - Amount parsing, display and call bounds through the command context
//! - Swap error taxonomy and state rendering

#[cfg(test)]
mod config_tests {
    use std::collections::BTreeMap;
    use std::fs;

    use crate::config::{
        Backend, BridgeSettings, ChainRegistry, Network, NetworkOverride, VerifierKind,
        DEFAULT_LEDGER_ADDRESS,
    };
    use zk_ledger::Address;

    #[test]
    fn test_builtin_chain_ids() {
        let registry = ChainRegistry::builtin();
        let expected = [
            (Network::MantleSepolia, 5003),
            (Network::FlowTestnet, 545),
            (Network::RoninTestnet, 2021),
            (Network::FlareCoston2, 114),
            (Network::SagaTest, 2751645467413000),
            (Network::SagaDemo, 2751645565611000),
            (Network::Sepolia, 11155111),
            (Network::BaseSepolia, 84532),
        ];

        for (network, chain_id) in expected {
            let chain = registry.get(network).unwrap();
            assert_eq!(chain.chain_id, chain_id, "{}", network);
            assert_eq!(chain.currency.decimals, 18);
            assert_eq!(registry.by_chain_id(chain_id).unwrap().network, network);
        }
        assert_eq!(registry.iter().count(), Network::ALL.len());
    }

    #[test]
    fn test_default_ledger_address() {
        let registry = ChainRegistry::builtin();
        let expected: Address = DEFAULT_LEDGER_ADDRESS.parse().unwrap();
        assert!(registry.iter().all(|c| c.ledger_address == expected));
    }

    #[test]
    fn test_network_keys_roundtrip() {
        for network in Network::ALL {
            assert_eq!(network.key().parse::<Network>().unwrap(), network);
            let json = serde_json::to_string(&network).unwrap();
            assert_eq!(json, format!("\"{}\"", network.key()));
        }
        assert!("mainnet".parse::<Network>().is_err());
    }

    #[test]
    fn test_chain_params() {
        let registry = ChainRegistry::builtin();
        let chain = registry.get(Network::FlareCoston2).unwrap();
        assert_eq!(chain.chain_id_hex(), "0x72");

        let params = chain.params();
        assert_eq!(params.chain_id, 114);
        assert_eq!(params.native_currency.symbol, "C2FLR");
        assert_eq!(params.rpc_urls, vec![chain.rpc_url.clone()]);
        assert_eq!(params.block_explorer_urls, vec![chain.explorer_url.clone()]);
    }

    #[test]
    fn test_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("networks.json"),
            r#"{
                "sepolia": {
                    "ledger_address": "0x00000000000000000000000000000000000000aa",
                    "rpc_url": "http://localhost:8545"
                }
            }"#,
        )
        .unwrap();

        let registry = ChainRegistry::load(dir.path()).unwrap();
        let sepolia = registry.get(Network::Sepolia).unwrap();
        assert_eq!(sepolia.ledger_address, Address::with_last_byte(0xaa));
        assert_eq!(sepolia.rpc_url, "http://localhost:8545");

        // Untouched networks keep their defaults
        let base = registry.get(Network::BaseSepolia).unwrap();
        assert_eq!(base.rpc_url, "https://sepolia.base.org");
    }

    #[test]
    fn test_with_overrides_partial() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            Network::FlowTestnet,
            NetworkOverride {
                explorer_url: Some("https://flow.local".to_string()),
                ..Default::default()
            },
        );
        let registry = ChainRegistry::with_overrides(&overrides);
        let flow = registry.get(Network::FlowTestnet).unwrap();
        assert_eq!(flow.explorer_url, "https://flow.local");
        assert_eq!(flow.tx_url(&"0xabc"), "https://flow.local/tx/0xabc");
    }

    #[test]
    fn test_missing_config_files_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(BridgeSettings::load(dir.path()).unwrap(), BridgeSettings::default());
        assert!(ChainRegistry::load(dir.path()).is_ok());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.settlement_delay().as_secs(), 30);
        assert_eq!(settings.call_timeout().as_secs(), 60);
        assert_eq!(settings.switch_settle().as_millis(), 2000);
        assert_eq!(settings.fee_bps, 100);
        assert_eq!(settings.quote_precision, 6);
        assert_eq!(settings.verifier, VerifierKind::AcceptAll);
        assert_eq!(settings.backend, Backend::Devnet);
        assert_eq!(settings.receipt_poll().as_millis(), 2000);
    }

    #[test]
    fn test_rpc_backend_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{ "backend": "rpc", "receipt_poll_ms": 500 }"#,
        )
        .unwrap();

        let settings = BridgeSettings::load(dir.path()).unwrap();
        assert_eq!(settings.backend, Backend::Rpc);
        assert_eq!(settings.receipt_poll_ms, 500);
        assert_eq!(settings.settlement_delay_secs, 30);

        fs::write(dir.path().join("settings.json"), r#"{ "backend": "mainnet" }"#).unwrap();
        assert!(BridgeSettings::load(dir.path()).is_err());
    }

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{ "settlement_delay_secs": 5, "verifier": "opening" }"#,
        )
        .unwrap();

        let settings = BridgeSettings::load(dir.path()).unwrap();
        assert_eq!(settings.settlement_delay_secs, 5);
        assert_eq!(settings.verifier, VerifierKind::Opening);
        assert_eq!(settings.fee_bps, 100);
    }

    #[test]
    fn test_settings_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BridgeSettings {
            call_timeout_secs: 7,
            ..Default::default()
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(BridgeSettings::load(dir.path()).unwrap(), settings);
    }
}

#[cfg(test)]
mod context_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use zk_ledger::Amount;

    use crate::commands::{balance, fund, AppContext, WalletTask};
    use crate::config::{Network, VerifierKind};
    use crate::devnet::{DevnetWallet, DEFAULT_SIGNER};
    use crate::ports::ChainError;

    fn short_timeout_context(dir: &tempfile::TempDir) -> AppContext {
        let mut ctx = AppContext::load(Some(dir.path().to_path_buf())).unwrap();
        ctx.settings.call_timeout_secs = 1;
        ctx.settings.switch_settle_ms = 0;
        ctx
    }

    fn devnet(ctx: &AppContext) -> Arc<DevnetWallet> {
        let ten = ctx.parse_amount(Network::Sepolia, "10").unwrap();
        let signer = DEFAULT_SIGNER.parse().unwrap();
        Arc::new(
            DevnetWallet::bootstrap(&ctx.registry, VerifierKind::AcceptAll, signer, ten, ten)
                .unwrap(),
        )
    }

    #[test]
    fn test_amounts_through_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::load(Some(dir.path().to_path_buf())).unwrap();

        let amount = ctx.parse_amount(Network::RoninTestnet, "1.25").unwrap();
        assert_eq!(amount, Amount::from(1_250_000_000_000_000_000u128));
        assert_eq!(ctx.display_amount(Network::RoninTestnet, amount), "1.250000 RON");
        assert!(ctx.parse_amount(Network::RoninTestnet, "1,25").is_err());
    }

    #[tokio::test]
    async fn test_bounded_call_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = short_timeout_context(&dir);

        let err = ctx
            .bounded("Ledger balance", std::future::pending::<Result<(), ChainError>>())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Ledger balance timed out after 1s");

        let err = ctx
            .bounded("Ledger balance", async { Err::<(), _>(ChainError::Rpc("down".into())) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Ledger balance failed");
        assert_eq!(
            err.root_cause().to_string(),
            ChainError::Rpc("down".into()).to_string()
        );

        let value = ctx
            .bounded("Ledger balance", async { Ok::<_, ChainError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_fund_and_balance_bounded_by_call_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = short_timeout_context(&dir);
        let wallet = devnet(&ctx);
        wallet.set_latency(Duration::from_secs(30)).await;

        let started = Instant::now();
        let err = fund::Fund {
            network: Network::Sepolia,
            amount: "1".to_string(),
        }
        .run(&ctx, wallet.clone())
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{:#}", err);

        let err = balance::Balance {
            network: Some(Network::Sepolia),
        }
        .run(&ctx, wallet.clone())
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{:#}", err);
        assert!(started.elapsed() < Duration::from_secs(10));

        // Nothing was funded while the ledger stalled
        wallet.set_latency(Duration::ZERO).await;
        let sepolia = ctx.chain(Network::Sepolia).unwrap().chain_id;
        let ten = ctx.parse_amount(Network::Sepolia, "10").unwrap();
        assert_eq!(wallet.ledger_state(sepolia).await.unwrap().balance, ten);
    }

    #[tokio::test]
    async fn test_fund_through_task() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = short_timeout_context(&dir);
        let wallet = devnet(&ctx);

        fund::Fund {
            network: Network::BaseSepolia,
            amount: "2.5".to_string(),
        }
        .run(&ctx, wallet.clone())
        .await
        .unwrap();

        let base = ctx.chain(Network::BaseSepolia).unwrap().chain_id;
        let expected = ctx.parse_amount(Network::BaseSepolia, "12.5").unwrap();
        assert_eq!(wallet.ledger_state(base).await.unwrap().balance, expected);
    }

    #[test]
    fn test_open_devnet_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::load(Some(dir.path().to_path_buf())).unwrap();
        let err = ctx.open_devnet().unwrap_err();
        assert!(err.to_string().contains("zkbridge init"));
    }
}

#[cfg(test)]
mod orchestrator_tests {
    use std::time::Duration;

    use crate::config::Network;
    use crate::orchestrator::{ErrorKind, SwapError, SwapFailure, SwapState, SwapStatus, SwapStep};
    use crate::ports::ChainError;
    use zk_ledger::{Hash32, LedgerError};

    #[test]
    fn test_error_kinds() {
        assert_eq!(SwapError::InvalidAmount.kind(), ErrorKind::Input);
        assert_eq!(SwapError::SameNetwork(Network::Sepolia).kind(), ErrorKind::Input);
        assert_eq!(
            SwapError::Ledger(LedgerError::NullifierAlreadyUsed(Hash32::default())).kind(),
            ErrorKind::Invariant
        );
        assert_eq!(
            SwapError::Ledger(LedgerError::TransferFailed {
                recipient: Default::default(),
                reason: "no".to_string()
            })
            .kind(),
            ErrorKind::Settlement
        );
        assert_eq!(SwapError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Environment);
        assert_eq!(SwapError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_chain_errors_map() {
        let reverted = SwapError::from(ChainError::Reverted(LedgerError::ProofRejected));
        assert_eq!(reverted, SwapError::Ledger(LedgerError::ProofRejected));

        let stale = SwapError::from(ChainError::WrongChain { bound: 1, active: 2 });
        assert!(matches!(stale, SwapError::Transport(_)));
    }

    #[test]
    fn test_state_rendering() {
        assert_eq!(SwapState::AwaitingConfirmation.to_string(), "AwaitingConfirmation");
        assert_eq!(SwapState::Complete.to_string(), "Complete");

        let failed = SwapState::Failed(SwapFailure {
            step: SwapStep::Depositing,
            error: SwapError::Cancelled,
        });
        assert_eq!(failed.to_string(), "Failed(swap cancelled (during Depositing))");
        assert!(failed.is_terminal());
        assert!(!SwapState::Withdrawing.is_terminal());

        let status = SwapStatus::from(failed);
        assert_eq!(status.error, Some(SwapError::Cancelled));
    }
}
