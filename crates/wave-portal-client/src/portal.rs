use crate::{
    ConnectionMachine, ContractEvent, Detection, EventHub, InjectedWallet, PendingTransaction,
    PortalConfig, SubscriptionGuard, TransactionTracker, TxState, WalletConnection,
    WalletProvider, WaveContract, WavePortalClient, WaveError, WaveRecord, WaveStore,
    detect_provider, handler,
    retry::{RetryConfig, retry_with_classifier},
};
use alloy::{primitives::U256, providers::DynProvider};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Subscriber name under which the portal feeds live events into its store.
pub const STORE_SUBSCRIBER: &str = "wave-store";

/// Portal bound to a wallet endpoint reached over WebSocket.
pub type InjectedPortal = Portal<InjectedWallet, WavePortalClient<DynProvider>>;

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalView {
    pub connection: WalletConnection,
    pub waves: Vec<WaveRecord>,
    pub transaction: TxState,
}

/// Application state for one wave portal session.
///
/// Without a wallet every chain operation is refused with
/// [`WaveError::WalletUnavailable`]; the connection still reports `Unavailable`.
pub struct Portal<W: WalletProvider, C: WaveContract> {
    wallet: Option<Arc<W>>,
    contract: Option<Arc<C>>,
    connection: ConnectionMachine,
    store: Arc<Mutex<WaveStore>>,
    tracker: Option<TransactionTracker<C>>,
    events: Option<EventHub<C>>,
    read_retry: RetryConfig,
}

impl InjectedPortal {
    /// Look for the configured wallet endpoint and build a portal around it.
    pub async fn detect(config: &PortalConfig) -> Self {
        let detection = detect_provider(
            config.contract.rpc_url.as_deref(),
            config.contract.max_ws_retries,
        )
        .await;
        Self::from_detection(detection, config)
    }

    pub fn from_detection(detection: Detection, config: &PortalConfig) -> Self {
        match detection {
            Detection::Available(wallet) => {
                let contract = wallet.contract_client(config.contract.contract_address);
                Self::new(Some((Arc::new(wallet), Arc::new(contract))), config)
            }
            Detection::Unavailable => Self::new(None, config),
        }
    }
}

impl<W: WalletProvider, C: WaveContract> Portal<W, C> {
    pub fn new(injected: Option<(Arc<W>, Arc<C>)>, config: &PortalConfig) -> Self {
        let store = Arc::new(Mutex::new(WaveStore::new(config.pending_clock_skew)));
        let (wallet, contract) = injected.unzip();

        let tracker = contract.as_ref().map(|contract| {
            TransactionTracker::new(
                contract.clone(),
                store.clone(),
                config.send,
                config.confirmation_timeout,
            )
        });
        let events = contract.as_ref().map(|contract| EventHub::new(contract.clone()));

        Self {
            wallet,
            contract,
            connection: ConnectionMachine::new(),
            store,
            tracker,
            events,
            read_retry: config.read_retry.clone(),
        }
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    pub fn connection(&self) -> WalletConnection {
        self.connection.current()
    }

    pub fn watch_connection(&self) -> watch::Receiver<WalletConnection> {
        self.connection.watch()
    }

    /// Records in display order.
    pub async fn waves(&self) -> Vec<WaveRecord> {
        self.store.lock().await.records().to_vec()
    }

    pub fn store(&self) -> Arc<Mutex<WaveStore>> {
        self.store.clone()
    }

    pub fn tx_state(&self) -> TxState {
        self.tracker
            .as_ref()
            .map(TransactionTracker::state)
            .unwrap_or_default()
    }

    pub fn watch_tx_state(&self) -> Option<watch::Receiver<TxState>> {
        self.tracker.as_ref().map(TransactionTracker::watch)
    }

    pub async fn view(&self) -> PortalView {
        PortalView {
            connection: self.connection(),
            waves: self.waves().await,
            transaction: self.tx_state(),
        }
    }

    pub async fn check_existing_connection(&self) -> Result<WalletConnection, WaveError> {
        self.connection
            .check_existing_connection(self.wallet.as_deref())
            .await
    }

    /// Prompt the wallet for an account.
    pub async fn connect(&self) -> Result<WalletConnection, WaveError> {
        self.connection
            .request_connection(self.wallet.as_deref())
            .await
    }

    /// Read every stored wave and merge it into the store.
    ///
    /// On failure the store keeps whatever it showed before.
    pub async fn load_waves(&self) -> Result<usize, WaveError> {
        let contract = self.contract.as_ref().ok_or(WaveError::WalletUnavailable)?;

        let waves = retry_with_classifier(
            self.read_retry.clone(),
            "getAllWaves",
            || contract.read_all(),
            WaveError::is_retryable,
        )
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to load waves, keeping the current list"))?;

        let count = waves.len();
        let mut store = self.store.lock().await;
        store.load_historical(waves);
        info!(count, shown = store.len(), "Loaded waves");
        Ok(count)
    }

    pub async fn total_waves(&self) -> Result<U256, WaveError> {
        let contract = self.contract.as_ref().ok_or(WaveError::WalletUnavailable)?;

        let total = retry_with_classifier(
            self.read_retry.clone(),
            "getTotalWaves",
            || contract.total_waves(),
            WaveError::is_retryable,
        )
        .await?;
        info!(total = %total, "Retrieved total wave count");
        Ok(total)
    }

    /// Send a wave from the connected account.
    pub async fn send(&self, message: &str) -> Result<PendingTransaction, WaveError> {
        let Some(tracker) = &self.tracker else {
            return Err(WaveError::WalletUnavailable);
        };
        tracker.send(self.connection(), message).await
    }

    /// Feed live `NewWave` events into the store until the guard is dropped.
    ///
    /// Only a connected wallet may subscribe.
    pub fn mount(&self) -> Result<SubscriptionGuard, WaveError> {
        let events = self.events.as_ref().ok_or(WaveError::WalletUnavailable)?;
        if let Some(refusal) = self.connection().send_refusal() {
            return Err(refusal);
        }
        let store = self.store.clone();

        events.subscribe(
            ContractEvent::NewWave,
            STORE_SUBSCRIBER,
            handler(move |wave| {
                let store = store.clone();
                async move {
                    let sender = wave.sender;
                    let merge = store.lock().await.apply_live_event(wave);
                    debug!(sender = %sender, merge = ?merge, "NewWave");
                }
            }),
        )
    }

    /// Event hub for additional subscribers, when a wallet is present.
    pub fn events(&self) -> Option<&EventHub<C>> {
        self.events.as_ref()
    }
}
