use crate::{WalletProvider, WaveError};
use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Wallet connection as seen by the presentation layer.
///
/// The account lives inside `Connected`, so a connection can never claim an
/// account without being connected, or the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "account", rename_all = "camelCase")]
pub enum WalletConnection {
    #[default]
    Disconnected,
    Detecting,
    Connected(Address),
    Unavailable,
}

impl WalletConnection {
    pub fn account(&self) -> Option<Address> {
        match self {
            WalletConnection::Connected(account) => Some(*account),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.account().is_some()
    }

    /// The error a send attempt should report while in this state.
    pub fn send_refusal(&self) -> Option<WaveError> {
        match self {
            WalletConnection::Connected(_) => None,
            WalletConnection::Unavailable => Some(WaveError::WalletUnavailable),
            WalletConnection::Disconnected | WalletConnection::Detecting => {
                Some(WaveError::NoWalletConnected)
            }
        }
    }
}

/// Tracks wallet-connection status and the current account.
///
/// Re-entrant: any operation can be called again from any state.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: watch::Sender<WalletConnection>,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WalletConnection::Disconnected);
        Self { state }
    }

    pub fn current(&self) -> WalletConnection {
        *self.state.borrow()
    }

    /// Observe every transition.
    pub fn watch(&self) -> watch::Receiver<WalletConnection> {
        self.state.subscribe()
    }

    /// Settle the connection from the wallet's already-authorized accounts,
    /// without prompting the user.
    pub async fn check_existing_connection<W: WalletProvider + ?Sized>(
        &self,
        wallet: Option<&W>,
    ) -> Result<WalletConnection, WaveError> {
        self.set(WalletConnection::Detecting);

        let Some(wallet) = wallet else {
            info!("Make sure you have a wallet available");
            return Ok(self.set(WalletConnection::Unavailable));
        };

        match wallet.authorized_accounts().await {
            Ok(accounts) => match accounts.first() {
                Some(&account) => {
                    info!(account = %account, "Found an authorized account");
                    Ok(self.set(WalletConnection::Connected(account)))
                }
                None => {
                    info!("No authorized account found");
                    Ok(self.set(WalletConnection::Disconnected))
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to query authorized accounts");
                self.set(WalletConnection::Disconnected);
                Err(e)
            }
        }
    }

    /// Prompt the wallet for authorization.
    ///
    /// A refusal leaves the connection as it was before the request.
    pub async fn request_connection<W: WalletProvider + ?Sized>(
        &self,
        wallet: Option<&W>,
    ) -> Result<WalletConnection, WaveError> {
        let Some(wallet) = wallet else {
            self.set(WalletConnection::Unavailable);
            return Err(WaveError::WalletUnavailable);
        };

        let previous = match self.current() {
            connected @ WalletConnection::Connected(_) => connected,
            _ => WalletConnection::Disconnected,
        };

        let outcome = wallet
            .request_accounts()
            .await
            .and_then(|accounts| accounts.first().copied().ok_or(WaveError::ConnectionRejected));

        match outcome {
            Ok(account) => {
                info!(account = %account, "Connected");
                Ok(self.set(WalletConnection::Connected(account)))
            }
            Err(e) => {
                warn!(error = %e, "Wallet connection not granted");
                self.set(previous);
                Err(e)
            }
        }
    }

    fn set(&self, next: WalletConnection) -> WalletConnection {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Wallet connection transition");
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWallet;

    #[tokio::test]
    async fn test_no_wallet_settles_unavailable() {
        let machine = ConnectionMachine::new();
        let state = machine
            .check_existing_connection::<FakeWallet>(None)
            .await
            .unwrap();

        assert_eq!(state, WalletConnection::Unavailable);
        assert_eq!(state.send_refusal(), Some(WaveError::WalletUnavailable));
    }

    #[tokio::test]
    async fn test_authorized_account_connects_without_prompt() {
        let account: Address = "0x0000000000000000000000000000000000000abc"
            .parse()
            .unwrap();
        let wallet = FakeWallet::with_authorized(vec![account]);
        let machine = ConnectionMachine::new();

        let state = machine
            .check_existing_connection(Some(&wallet))
            .await
            .unwrap();

        assert_eq!(state, WalletConnection::Connected(account));
        assert_eq!(machine.current().account(), Some(account));
        assert_eq!(wallet.prompts(), 0);
    }

    #[tokio::test]
    async fn test_first_authorized_account_wins() {
        let first = Address::repeat_byte(0x01);
        let wallet = FakeWallet::with_authorized(vec![first, Address::repeat_byte(0x02)]);
        let machine = ConnectionMachine::new();

        machine.check_existing_connection(Some(&wallet)).await.unwrap();
        assert_eq!(machine.current().account(), Some(first));
    }

    #[tokio::test]
    async fn test_no_authorized_accounts_stays_disconnected() {
        let wallet = FakeWallet::with_authorized(vec![]);
        let machine = ConnectionMachine::new();

        let state = machine
            .check_existing_connection(Some(&wallet))
            .await
            .unwrap();
        assert_eq!(state, WalletConnection::Disconnected);
        assert_eq!(state.account(), None);
    }

    #[tokio::test]
    async fn test_revocation_detected_on_next_check() {
        let account = Address::repeat_byte(0x0a);
        let wallet = FakeWallet::with_authorized(vec![account]);
        let machine = ConnectionMachine::new();

        machine.check_existing_connection(Some(&wallet)).await.unwrap();
        assert!(machine.current().is_connected());

        wallet.set_authorized(vec![]);
        machine.check_existing_connection(Some(&wallet)).await.unwrap();
        assert_eq!(machine.current(), WalletConnection::Disconnected);
    }

    #[tokio::test]
    async fn test_request_connection_accepted() {
        let account = Address::repeat_byte(0x0b);
        let wallet = FakeWallet::with_authorized(vec![]);
        wallet.grant_on_request(vec![account]);
        let machine = ConnectionMachine::new();

        let state = machine.request_connection(Some(&wallet)).await.unwrap();
        assert_eq!(state, WalletConnection::Connected(account));
        assert_eq!(wallet.prompts(), 1);
    }

    #[tokio::test]
    async fn test_request_connection_rejected() {
        let wallet = FakeWallet::with_authorized(vec![]);
        wallet.reject_on_request();
        let machine = ConnectionMachine::new();

        let err = machine.request_connection(Some(&wallet)).await.unwrap_err();
        assert_eq!(err, WaveError::ConnectionRejected);
        assert_eq!(machine.current(), WalletConnection::Disconnected);

        // Retryable: the user can accept on a second prompt
        let account = Address::repeat_byte(0x0c);
        wallet.grant_on_request(vec![account]);
        machine.request_connection(Some(&wallet)).await.unwrap();
        assert_eq!(machine.current().account(), Some(account));
    }

    #[tokio::test]
    async fn test_request_without_wallet() {
        let machine = ConnectionMachine::new();
        let err = machine
            .request_connection::<FakeWallet>(None)
            .await
            .unwrap_err();
        assert_eq!(err, WaveError::WalletUnavailable);
        assert_eq!(machine.current(), WalletConnection::Unavailable);
    }

    #[tokio::test]
    async fn test_failed_account_query_reports_chain_read() {
        let wallet = FakeWallet::with_authorized(vec![Address::repeat_byte(0x01)]);
        wallet.fail_account_queries();
        let machine = ConnectionMachine::new();

        let err = machine
            .check_existing_connection(Some(&wallet))
            .await
            .unwrap_err();
        assert!(matches!(err, WaveError::ChainRead(_)));
        assert_eq!(machine.current(), WalletConnection::Disconnected);
    }

    #[test]
    fn test_connection_serializes_with_account() {
        let account = Address::repeat_byte(0x11);
        let json = serde_json::to_value(WalletConnection::Connected(account)).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["account"], account.to_string());

        let json = serde_json::to_value(WalletConnection::Unavailable).unwrap();
        assert_eq!(json["status"], "unavailable");
    }
}
