use alloy::primitives::Address;
use anyhow::{Result, bail};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use wave_portal_client::{
    ContractConfig, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_CONTRACT_ADDRESS,
    DEFAULT_GAS_LIMIT, DEFAULT_MAX_WS_RETRIES, PortalConfig, SendOptions,
};

/// CLI arguments for the wave portal
#[derive(Parser, Debug)]
#[command(name = "wave-portal")]
#[command(
    about = "Wave Portal - connect a wallet, list waves, send one and follow new ones",
    long_about = None
)]
pub struct CliArgs {
    /// Wallet RPC endpoint (will be converted to WebSocket). Without it no wallet is available
    #[arg(long, env = "WALLET_RPC_URL")]
    pub wallet_rpc_url: Option<String>,

    /// WavePortal contract address
    #[arg(long, env = "WAVE_PORTAL_ADDRESS", default_value_t = DEFAULT_CONTRACT_ADDRESS)]
    pub contract_address: Address,

    /// Gas limit attached to every wave
    #[arg(long, env = "WAVE_GAS_LIMIT", default_value_t = DEFAULT_GAS_LIMIT)]
    pub gas_limit: u64,

    /// Seconds to wait for a sent wave to be mined
    #[arg(long, env = "CONFIRMATION_TIMEOUT_SECS", default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub confirmation_timeout_secs: u64,

    /// WebSocket reconnection attempts
    #[arg(long, env = "MAX_WS_RETRIES", default_value_t = DEFAULT_MAX_WS_RETRIES)]
    pub max_ws_retries: u32,

    /// Prompt the wallet for an account when none is authorized yet
    #[arg(long, env = "WAVE_CONNECT")]
    pub connect: bool,

    /// Send one wave with this message after start-up
    #[arg(long, env = "WAVE_MESSAGE")]
    pub message: Option<String>,
}

/// Driver configuration with all values resolved
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub portal: PortalConfig,
    pub connect: bool,
    pub message: Option<String>,
}

impl DriverConfig {
    pub fn load(args: CliArgs) -> Result<Self> {
        if args.gas_limit == 0 {
            bail!("--gas-limit must be greater than zero");
        }
        if args.confirmation_timeout_secs == 0 {
            bail!("--confirmation-timeout-secs must be greater than zero");
        }

        let contract = ContractConfig {
            rpc_url: args.wallet_rpc_url,
            contract_address: args.contract_address,
            max_ws_retries: args.max_ws_retries,
        };
        let portal = PortalConfig {
            send: SendOptions {
                gas_limit: Some(args.gas_limit),
            },
            confirmation_timeout: Duration::from_secs(args.confirmation_timeout_secs),
            ..PortalConfig::new(contract)
        };

        info!(
            wallet_rpc_url = portal.contract.rpc_url.as_deref().unwrap_or("<none>"),
            contract_address = %portal.contract.contract_address,
            gas_limit = args.gas_limit,
            "Loaded configuration"
        );

        Ok(Self {
            portal,
            connect: args.connect,
            message: args.message,
        })
    }
}
