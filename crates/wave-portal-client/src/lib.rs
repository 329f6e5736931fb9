use alloy::primitives::{Address, address};
use std::time::Duration;

pub mod common;
pub mod connection;
pub mod error;
pub mod events;
pub mod portal;
pub mod provider;
pub mod retry;
pub mod store;
pub mod tracker;
pub mod types;
pub mod wave_portal;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use common::tx_submitter::Confirmation;
pub use connection::{ConnectionMachine, WalletConnection};
pub use error::WaveError;
pub use events::{EventHub, SubscriptionGuard, WaveHandler, handler};
pub use portal::{InjectedPortal, Portal, PortalView};
pub use provider::{Detection, InjectedWallet, WalletProvider, detect_provider};
pub use store::{Merge, WaveStore};
pub use tracker::{PendingState, PendingTransaction, TransactionTracker, TxState};
pub use types::{
    ContractEvent, SendOptions, SequenceKey, TxHandle, WaveEntry, WaveOrigin, WaveRecord,
    now_secs,
};
pub use wave_portal::{WaveContract, WaveEventStream, WavePortalClient};

// ============================================================================
// Defaults
// ============================================================================

/// Deployed WavePortal contract
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("04FEd9Ddb831999693C940D9c614a8D6De2eB813");

/// Gas limit hint attached to every `wave` call
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

/// How long to wait for a submitted wave to be mined
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_MAX_WS_RETRIES: u32 = 10;

/// Attempts for a chain read before giving up
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_READ_RETRY_DELAY_SECS: u64 = 1;

// ============================================================================
// Configuration
// ============================================================================

/// Where the wallet endpoint and the contract live.
#[derive(Clone, Debug)]
pub struct ContractConfig {
    /// Wallet JSON-RPC endpoint (HTTP or WebSocket). `None` means no wallet.
    pub rpc_url: Option<String>,
    pub contract_address: Address,
    pub max_ws_retries: u32,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            max_ws_retries: DEFAULT_MAX_WS_RETRIES,
        }
    }
}

impl ContractConfig {
    /// Create a new configuration for a deployed contract
    ///
    /// # Arguments
    /// * `rpc_url` - Wallet RPC endpoint (HTTP or WebSocket)
    /// * `contract_address` - Address of the deployed WavePortal contract
    pub fn new(rpc_url: String, contract_address: Address) -> Self {
        Self {
            rpc_url: Some(rpc_url),
            contract_address,
            ..Self::default()
        }
    }

    /// Anvil local testnet: first deployment from account #0, whose node-managed
    /// accounts are authorized without a prompt.
    pub fn anvil_config() -> Self {
        Self {
            rpc_url: Some("http://127.0.0.1:8545".to_string()),
            contract_address: address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
            ..Self::default()
        }
    }
}

/// Everything a [`Portal`] needs besides the wallet itself.
#[derive(Clone, Debug)]
pub struct PortalConfig {
    pub contract: ContractConfig,
    pub send: SendOptions,
    pub confirmation_timeout: Duration,
    /// How far the local clock of a pending wave may lead the block timestamp
    /// that confirms it.
    pub pending_clock_skew: chrono::Duration,
    pub read_retry: retry::RetryConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::new(ContractConfig::default())
    }
}

impl PortalConfig {
    pub fn new(contract: ContractConfig) -> Self {
        Self {
            contract,
            send: SendOptions::default(),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            pending_clock_skew: chrono::Duration::seconds(
                store::DEFAULT_PENDING_CLOCK_SKEW_SECS,
            ),
            read_retry: retry::RetryConfig::for_reads(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let address = "0x89c1312Cedb0B0F67e4913D2076bd4a860652B69"
            .parse::<Address>()
            .unwrap();

        let config = ContractConfig::new("http://localhost:8545".to_string(), address);

        assert_eq!(config.contract_address, address);
        assert_eq!(config.rpc_url.as_deref(), Some("http://localhost:8545"));
        assert_eq!(config.max_ws_retries, DEFAULT_MAX_WS_RETRIES);
    }

    #[test]
    fn test_default_contract_address() {
        let parsed = "0x04FEd9Ddb831999693C940D9c614a8D6De2eB813"
            .parse::<Address>()
            .unwrap();
        assert_eq!(DEFAULT_CONTRACT_ADDRESS, parsed);
        assert_eq!(ContractConfig::default().rpc_url, None);
    }

    #[test]
    fn test_portal_defaults() {
        let config = PortalConfig::default();
        assert_eq!(config.send.gas_limit, Some(DEFAULT_GAS_LIMIT));
        assert_eq!(
            config.confirmation_timeout,
            Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
        );
        assert_eq!(config.pending_clock_skew.num_seconds(), 300);
    }
}
