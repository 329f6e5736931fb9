//! Wallet detection and the account queries the connection state machine needs.
//!
//! The wallet is an EIP-1193 style endpoint reached over JSON-RPC. It owns the
//! keys: transactions are sent with `eth_sendTransaction` and signed wallet-side.

use crate::{WavePortalClient, WaveError, common::errors::USER_REJECTED_CODE};
use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[async_trait]
pub trait WalletProvider: Send + Sync + 'static {
    /// Accounts the wallet has already authorized. Never prompts the user.
    async fn authorized_accounts(&self) -> Result<Vec<Address>, WaveError>;

    /// Ask the wallet to authorize an account. May prompt the user.
    async fn request_accounts(&self) -> Result<Vec<Address>, WaveError>;
}

/// Result of inspecting the environment for a wallet.
pub enum Detection {
    Available(InjectedWallet),
    Unavailable,
}

impl Detection {
    pub fn is_available(&self) -> bool {
        matches!(self, Detection::Available(_))
    }
}

/// Look for a wallet endpoint. Absence is an expected outcome, not an error.
pub async fn detect_provider(rpc_url: Option<&str>, max_ws_retries: u32) -> Detection {
    let Some(rpc_url) = rpc_url.filter(|url| !url.trim().is_empty()) else {
        info!("No wallet endpoint configured");
        return Detection::Unavailable;
    };

    match InjectedWallet::connect(rpc_url, max_ws_retries).await {
        Ok(wallet) => {
            info!(rpc_url = %rpc_url, "Wallet detected");
            Detection::Available(wallet)
        }
        Err(e) => {
            warn!(rpc_url = %rpc_url, error = %e, "Wallet endpoint unreachable");
            Detection::Unavailable
        }
    }
}

/// A wallet reached over WebSocket JSON-RPC.
#[derive(Clone)]
pub struct InjectedWallet {
    provider: DynProvider,
}

impl InjectedWallet {
    pub async fn connect(rpc_url: &str, max_ws_retries: u32) -> Result<Self, WaveError> {
        let ws_url = rpc_url
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        let ws = WsConnect::new(ws_url).with_max_retries(max_ws_retries);

        // No local signer: the wallet signs whatever we send on an account's behalf
        let provider: DynProvider = ProviderBuilder::new()
            .connect_ws(ws)
            .await
            .map_err(|e| WaveError::ChainRead(format!("connect {rpc_url}: {e}")))?
            .erased();

        Ok(Self { provider })
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Bind the wave portal contract to this wallet's provider.
    pub fn contract_client(&self, address: Address) -> WavePortalClient<DynProvider> {
        WavePortalClient::new(self.provider.clone(), address, Arc::new(Mutex::new(())))
    }
}

#[async_trait]
impl WalletProvider for InjectedWallet {
    async fn authorized_accounts(&self) -> Result<Vec<Address>, WaveError> {
        self.provider
            .get_accounts()
            .await
            .map_err(|e| WaveError::ChainRead(format!("eth_accounts: {e}")))
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WaveError> {
        let result = self
            .provider
            .raw_request::<_, Vec<Address>>("eth_requestAccounts".into(), ())
            .await;

        match result {
            Ok(accounts) => Ok(accounts),
            Err(e) => match e.as_error_resp().map(|payload| payload.code) {
                Some(USER_REJECTED_CODE) => Err(WaveError::ConnectionRejected),
                // Node-managed wallets have no prompt; their accounts are always authorized
                Some(METHOD_NOT_FOUND_CODE) => self.authorized_accounts().await,
                _ => Err(WaveError::ChainRead(format!("eth_requestAccounts: {e}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_endpoint_is_unavailable() {
        assert!(!detect_provider(None, 0).await.is_available());
    }

    #[tokio::test]
    async fn test_blank_endpoint_is_unavailable() {
        assert!(!detect_provider(Some("  "), 0).await.is_available());
    }
}
