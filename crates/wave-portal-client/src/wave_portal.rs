use crate::{
    ContractEvent, SendOptions, TxHandle, WaveEntry, WaveError,
    common::{
        errors::{CallKind, classify_contract_error},
        tx_submitter::{Confirmation, TransactionSubmitter, await_receipt},
    },
};
use alloy::{
    primitives::{Address, U256},
    providers::Provider,
    sol,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream::BoxStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    contract WavePortal {
        struct Wave {
            address waver;
            string message;
            uint256 timestamp;
        }

        event NewWave(address indexed from, uint256 timestamp, string message);

        function wave(string memory _message) public;
        function getAllWaves() public view returns (Wave[] memory);
        function getTotalWaves() public view returns (uint256);
    }
}

use WavePortal::{NewWave, WavePortalInstance};

/// Live contract events, already mapped to [`WaveEntry`].
pub type WaveEventStream = BoxStream<'static, Result<WaveEntry, WaveError>>;

/// Typed operations against a deployed wave portal contract.
#[async_trait]
pub trait WaveContract: Send + Sync + 'static {
    /// Read every wave stored by the contract. Read-only, safe to retry.
    async fn read_all(&self) -> Result<Vec<WaveEntry>, WaveError>;

    async fn total_waves(&self) -> Result<U256, WaveError>;

    /// Submit a `wave` call signed by `from`. Returns once the network has
    /// accepted the transaction.
    async fn send_wave(
        &self,
        from: Address,
        message: String,
        options: SendOptions,
    ) -> Result<TxHandle, WaveError>;

    async fn await_confirmation(
        &self,
        tx: TxHandle,
        options: SendOptions,
        timeout: Duration,
    ) -> Result<Confirmation, WaveError>;

    /// Open a stream of live events.
    async fn events(&self, event: ContractEvent) -> Result<WaveEventStream, WaveError>;
}

/// Client for the WavePortal contract.
#[derive(Clone)]
pub struct WavePortalClient<P: Provider + Clone> {
    provider: P,
    contract: WavePortalInstance<P>,
    submitter: TransactionSubmitter,
}

impl<P: Provider + Clone> WavePortalClient<P> {
    pub fn new(provider: P, address: Address, tx_lock: Arc<Mutex<()>>) -> Self {
        let contract = WavePortalInstance::new(address, provider.clone());
        let submitter = TransactionSubmitter::new(tx_lock);
        Self {
            provider,
            contract,
            submitter,
        }
    }

    /// Get the contract address.
    pub fn address(&self) -> Address {
        *self.contract.address()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> WaveContract for WavePortalClient<P> {
    async fn read_all(&self) -> Result<Vec<WaveEntry>, WaveError> {
        let waves = self
            .contract
            .getAllWaves()
            .call()
            .await
            .map_err(|e| classify_contract_error("getAllWaves", CallKind::Read, &e))?;

        waves.into_iter().map(stored_wave_entry).collect()
    }

    async fn total_waves(&self) -> Result<U256, WaveError> {
        self.contract
            .getTotalWaves()
            .call()
            .await
            .map_err(|e| classify_contract_error("getTotalWaves", CallKind::Read, &e))
    }

    async fn send_wave(
        &self,
        from: Address,
        message: String,
        options: SendOptions,
    ) -> Result<TxHandle, WaveError> {
        let call = self.contract.wave(message).from(from);
        self.submitter.submit("wave", call, options).await
    }

    async fn await_confirmation(
        &self,
        tx: TxHandle,
        options: SendOptions,
        timeout: Duration,
    ) -> Result<Confirmation, WaveError> {
        await_receipt(&self.provider, "wave", tx, options.gas_limit, timeout).await
    }

    async fn events(&self, event: ContractEvent) -> Result<WaveEventStream, WaveError> {
        match event {
            ContractEvent::NewWave => {
                let subscription = self
                    .contract
                    .event_filter::<NewWave>()
                    .subscribe()
                    .await
                    .map_err(|e| WaveError::EventDelivery(format!("subscribe {event}: {e}")))?;

                let stream = subscription
                    .into_stream()
                    .map(|item| match item {
                        Ok((event, _log)) => new_wave_entry(event),
                        Err(e) => Err(WaveError::EventDelivery(format!("decode NewWave: {e}"))),
                    })
                    .boxed();
                Ok(stream)
            }
        }
    }
}

fn stored_wave_entry(wave: WavePortal::Wave) -> Result<WaveEntry, WaveError> {
    Ok(WaveEntry::new(
        wave.waver,
        chain_time(wave.timestamp)?,
        wave.message,
    ))
}

fn new_wave_entry(event: NewWave) -> Result<WaveEntry, WaveError> {
    Ok(WaveEntry::new(
        event.from,
        chain_time(event.timestamp)?,
        event.message,
    ))
}

/// Convert a `block.timestamp` value into UTC.
pub fn chain_time(timestamp: U256) -> Result<DateTime<Utc>, WaveError> {
    let out_of_range = || WaveError::ChainRead(format!("timestamp {timestamp} out of range"));
    let secs = u64::try_from(timestamp).map_err(|_| out_of_range())?;
    let secs = i64::try_from(secs).map_err(|_| out_of_range())?;
    DateTime::from_timestamp(secs, 0).ok_or_else(out_of_range)
}
