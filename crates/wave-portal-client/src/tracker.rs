//! Lifecycle of a single `wave` transaction, from submission to mined or failed.
//!
//! A send inserts an optimistic pending record into the [`WaveStore`] as soon as
//! the network accepts it. Confirmation runs in the background; the pending record
//! is dropped again when the transaction definitively fails, and is promoted by
//! the matching live event otherwise. A confirmation timeout leaves it in place.

use crate::{
    Confirmation, SendOptions, SequenceKey, TxHandle, WalletConnection, WaveContract, WaveEntry,
    WaveError, WaveStore, now_secs,
};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

/// Transaction status published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TxState {
    #[default]
    Idle,
    Submitting,
    Submitted {
        tx: TxHandle,
    },
    Mined {
        tx: TxHandle,
    },
    Failed {
        tx: Option<TxHandle>,
        #[serde(serialize_with = "display")]
        error: WaveError,
    },
}

impl TxState {
    /// A send is in flight and a second one must be refused.
    pub fn is_busy(&self) -> bool {
        matches!(self, TxState::Submitting | TxState::Submitted { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Mined { .. } | TxState::Failed { .. })
    }
}

fn display<S: Serializer>(error: &WaveError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    Submitted,
    Mined(Confirmation),
    Failed(WaveError),
}

impl PendingState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PendingState::Submitted)
    }
}

/// Handle returned by a successful submission.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    tx: TxHandle,
    sequence_key: SequenceKey,
    state: watch::Receiver<PendingState>,
}

impl PendingTransaction {
    pub fn tx(&self) -> TxHandle {
        self.tx
    }

    /// Key of this wave's record in the store.
    pub fn sequence_key(&self) -> SequenceKey {
        self.sequence_key
    }

    pub fn state(&self) -> PendingState {
        self.state.borrow().clone()
    }

    /// Wait until the transaction is mined or has failed.
    pub async fn wait(&mut self) -> PendingState {
        let settled = match self.state.wait_for(PendingState::is_terminal).await {
            Ok(state) => Some(state.clone()),
            // The tracking task always publishes a terminal state before exiting
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state.borrow().clone())
    }
}

/// Sends waves and follows each one until it settles.
pub struct TransactionTracker<C: WaveContract> {
    contract: Arc<C>,
    store: Arc<Mutex<WaveStore>>,
    state: Arc<watch::Sender<TxState>>,
    options: SendOptions,
    confirmation_timeout: Duration,
}

impl<C: WaveContract> TransactionTracker<C> {
    pub fn new(
        contract: Arc<C>,
        store: Arc<Mutex<WaveStore>>,
        options: SendOptions,
        confirmation_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(TxState::Idle);
        Self {
            contract,
            store,
            state: Arc::new(state),
            options,
            confirmation_timeout,
        }
    }

    pub fn state(&self) -> TxState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<TxState> {
        self.state.subscribe()
    }

    /// Submit `message` as a wave from the connected account.
    ///
    /// Returns once the network accepted the transaction. The optimistic record
    /// is already in the store by then; confirmation continues in the background.
    pub async fn send(
        &self,
        connection: WalletConnection,
        message: &str,
    ) -> Result<PendingTransaction, WaveError> {
        if let Some(refusal) = connection.send_refusal() {
            warn!(connection = ?connection, "Refusing to send without a connected wallet");
            return Err(refusal);
        }
        let Some(account) = connection.account() else {
            return Err(WaveError::NoWalletConnected);
        };
        if message.trim().is_empty() {
            return Err(WaveError::EmptyMessage);
        }

        let claimed = self.state.send_if_modified(|state| {
            if state.is_busy() {
                false
            } else {
                *state = TxState::Submitting;
                true
            }
        });
        if !claimed {
            return Err(WaveError::SendInProgress);
        }

        info!(account = %account, "Sending wave");
        let tx = match self
            .contract
            .send_wave(account, message.to_string(), self.options)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "Wave was not submitted");
                self.state.send_replace(TxState::Failed {
                    tx: None,
                    error: e.clone(),
                });
                return Err(e);
            }
        };

        let sequence_key = self
            .store
            .lock()
            .await
            .apply_optimistic(WaveEntry::new(account, now_secs(), message));
        self.state.send_replace(TxState::Submitted { tx });
        info!(tx_hash = %tx, "Mining");

        let (pending, receiver) = watch::channel(PendingState::Submitted);
        tokio::spawn(track_confirmation(
            self.contract.clone(),
            self.store.clone(),
            self.state.clone(),
            pending,
            Submitted {
                tx,
                sequence_key,
                options: self.options,
                timeout: self.confirmation_timeout,
            },
        ));

        Ok(PendingTransaction {
            tx,
            sequence_key,
            state: receiver,
        })
    }
}

struct Submitted {
    tx: TxHandle,
    sequence_key: SequenceKey,
    options: SendOptions,
    timeout: Duration,
}

async fn track_confirmation<C: WaveContract>(
    contract: Arc<C>,
    store: Arc<Mutex<WaveStore>>,
    state: Arc<watch::Sender<TxState>>,
    pending: watch::Sender<PendingState>,
    submitted: Submitted,
) {
    let Submitted {
        tx,
        sequence_key,
        options,
        timeout,
    } = submitted;

    match contract.await_confirmation(tx, options, timeout).await {
        Ok(confirmation) => {
            info!(
                tx_hash = %tx,
                block_number = ?confirmation.block_number,
                "Mined"
            );
            state.send_replace(TxState::Mined { tx });
            pending.send_replace(PendingState::Mined(confirmation));
        }
        Err(e) => {
            if e.discards_pending() {
                let discarded = store.lock().await.discard_pending(&sequence_key);
                error!(tx_hash = %tx, error = %e, discarded, "Wave failed");
            } else {
                warn!(
                    tx_hash = %tx,
                    error = %e,
                    "Wave not confirmed in time, keeping it pending until its event arrives"
                );
            }
            state.send_replace(TxState::Failed {
                tx: Some(tx),
                error: e.clone(),
            });
            pending.send_replace(PendingState::Failed(e));
        }
    }
}
