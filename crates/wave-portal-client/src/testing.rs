//! In-memory wallet and contract doubles shared by the unit tests.

use crate::{
    Confirmation, ContractEvent, SendOptions, TxHandle, WalletProvider, WaveContract, WaveEntry,
    WaveError, WaveEventStream,
};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::DateTime;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// A wave from `Address::repeat_byte(sender)` at `secs` since the epoch.
pub(crate) fn wave(sender: u8, secs: i64, message: &str) -> WaveEntry {
    WaveEntry::new(
        Address::repeat_byte(sender),
        DateTime::from_timestamp(secs, 0).unwrap(),
        message,
    )
}

/// Poll `check` until it holds, failing the test after two seconds.
pub(crate) async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

enum RequestBehavior {
    Grant(Vec<Address>),
    Reject,
}

pub(crate) struct FakeWallet {
    authorized: Mutex<Vec<Address>>,
    on_request: Mutex<RequestBehavior>,
    fail_queries: AtomicBool,
    prompts: AtomicUsize,
}

impl FakeWallet {
    pub(crate) fn with_authorized(accounts: Vec<Address>) -> Self {
        Self {
            on_request: Mutex::new(RequestBehavior::Grant(accounts.clone())),
            authorized: Mutex::new(accounts),
            fail_queries: AtomicBool::new(false),
            prompts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_authorized(&self, accounts: Vec<Address>) {
        *self.authorized.lock().unwrap() = accounts;
    }

    pub(crate) fn grant_on_request(&self, accounts: Vec<Address>) {
        *self.on_request.lock().unwrap() = RequestBehavior::Grant(accounts);
    }

    pub(crate) fn reject_on_request(&self) {
        *self.on_request.lock().unwrap() = RequestBehavior::Reject;
    }

    pub(crate) fn fail_account_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub(crate) fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn authorized_accounts(&self) -> Result<Vec<Address>, WaveError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(WaveError::ChainRead("eth_accounts: connection reset".into()));
        }
        Ok(self.authorized.lock().unwrap().clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WaveError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        match &*self.on_request.lock().unwrap() {
            RequestBehavior::Grant(accounts) => {
                self.set_authorized(accounts.clone());
                Ok(accounts.clone())
            }
            RequestBehavior::Reject => Err(WaveError::ConnectionRejected),
        }
    }
}

/// How the fake resolves `await_confirmation`.
#[derive(Debug, Clone)]
pub(crate) enum ConfirmBehavior {
    Mine,
    Revert(String),
    /// Never mined: waits out the timeout.
    Never,
}

struct ContractState {
    waves: Vec<WaveEntry>,
    read_failures: usize,
    send_error: Option<WaveError>,
    confirm: ConfirmBehavior,
    sent: Vec<(Address, String)>,
    live: Option<mpsc::UnboundedSender<Result<WaveEntry, WaveError>>>,
    failing_subscriptions: usize,
    subscriptions: usize,
}

pub(crate) struct FakeContract {
    state: Mutex<ContractState>,
}

impl Default for FakeContract {
    fn default() -> Self {
        Self::with_waves(Vec::new())
    }
}

impl FakeContract {
    pub(crate) fn with_waves(waves: Vec<WaveEntry>) -> Self {
        Self {
            state: Mutex::new(ContractState {
                waves,
                read_failures: 0,
                send_error: None,
                confirm: ConfirmBehavior::Mine,
                sent: Vec::new(),
                live: None,
                failing_subscriptions: 0,
                subscriptions: 0,
            }),
        }
    }

    pub(crate) fn set_waves(&self, waves: Vec<WaveEntry>) {
        self.state.lock().unwrap().waves = waves;
    }

    pub(crate) fn fail_next_reads(&self, count: usize) {
        self.state.lock().unwrap().read_failures = count;
    }

    pub(crate) fn fail_sends_with(&self, error: WaveError) {
        self.state.lock().unwrap().send_error = Some(error);
    }

    pub(crate) fn confirm_with(&self, behavior: ConfirmBehavior) {
        self.state.lock().unwrap().confirm = behavior;
    }

    pub(crate) fn fail_next_subscriptions(&self, count: usize) {
        self.state.lock().unwrap().failing_subscriptions = count;
    }

    pub(crate) fn sent(&self) -> Vec<(Address, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Number of `events` calls, failed ones included.
    pub(crate) fn subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscriptions
    }

    pub(crate) fn emit(&self, wave: WaveEntry) {
        if let Some(live) = &self.state.lock().unwrap().live {
            let _ = live.send(Ok(wave));
        }
    }

    pub(crate) fn emit_error(&self, error: WaveError) {
        if let Some(live) = &self.state.lock().unwrap().live {
            let _ = live.send(Err(error));
        }
    }

    /// End the current live stream, as a dropped websocket would.
    pub(crate) fn drop_connection(&self) {
        self.state.lock().unwrap().live = None;
    }

    /// Whether the consumer side of the live stream is gone.
    pub(crate) fn stream_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .live
            .as_ref()
            .is_none_or(|live| live.is_closed())
    }
}

#[async_trait]
impl WaveContract for FakeContract {
    async fn read_all(&self) -> Result<Vec<WaveEntry>, WaveError> {
        let mut state = self.state.lock().unwrap();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(WaveError::ChainRead("getAllWaves: connection reset".into()));
        }
        Ok(state.waves.clone())
    }

    async fn total_waves(&self) -> Result<U256, WaveError> {
        Ok(U256::from(self.state.lock().unwrap().waves.len()))
    }

    async fn send_wave(
        &self,
        from: Address,
        message: String,
        _options: SendOptions,
    ) -> Result<TxHandle, WaveError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.send_error.clone() {
            return Err(error);
        }
        state.sent.push((from, message));
        Ok(TxHandle(B256::with_last_byte(state.sent.len() as u8)))
    }

    async fn await_confirmation(
        &self,
        tx: TxHandle,
        _options: SendOptions,
        timeout: Duration,
    ) -> Result<Confirmation, WaveError> {
        let behavior = self.state.lock().unwrap().confirm.clone();
        match behavior {
            ConfirmBehavior::Mine => Ok(Confirmation {
                tx,
                block_number: Some(1),
                gas_used: 50_000,
            }),
            ConfirmBehavior::Revert(reason) => Err(WaveError::ContractRevert(reason)),
            ConfirmBehavior::Never => {
                tokio::time::sleep(timeout).await;
                Err(WaveError::ConfirmationTimeout {
                    tx_hash: tx.hash(),
                    waited: timeout,
                })
            }
        }
    }

    async fn events(&self, _event: ContractEvent) -> Result<WaveEventStream, WaveError> {
        let mut state = self.state.lock().unwrap();
        state.subscriptions += 1;
        if state.failing_subscriptions > 0 {
            state.failing_subscriptions -= 1;
            return Err(WaveError::EventDelivery("subscription refused".into()));
        }

        let (live, receiver) = mpsc::unbounded_channel();
        state.live = Some(live);
        Ok(futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        })
        .boxed())
    }
}
