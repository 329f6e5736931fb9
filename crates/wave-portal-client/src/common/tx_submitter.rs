use crate::{
    SendOptions, TxHandle, WaveError,
    common::errors::{CallKind, classify_contract_error},
};
use alloy::{
    contract::{CallBuilder, CallDecoder},
    providers::{PendingTransactionBuilder, Provider},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx: TxHandle,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Submits state-changing calls through the wallet, one at a time.
#[derive(Clone)]
pub(crate) struct TransactionSubmitter {
    tx_lock: Arc<Mutex<()>>,
}

impl TransactionSubmitter {
    pub(crate) fn new(tx_lock: Arc<Mutex<()>>) -> Self {
        Self { tx_lock }
    }

    /// Simulate, then hand the call to the wallet. Returns once the network has
    /// accepted the transaction; it is not mined yet.
    pub(crate) async fn submit<P, D>(
        &self,
        method: &str,
        call: CallBuilder<P, D>,
        options: SendOptions,
    ) -> Result<TxHandle, WaveError>
    where
        P: Provider + Clone,
        D: CallDecoder,
    {
        // Pre-simulate to catch reverts with proper error messages
        if let Err(e) = call.call().await {
            return Err(classify_contract_error(method, CallKind::Submit, &e));
        }

        let call = match options.gas_limit {
            Some(gas) => call.gas(gas),
            None => call,
        };

        let _guard = self.tx_lock.lock().await;
        let pending = call
            .send()
            .await
            .map_err(|e| classify_contract_error(method, CallKind::Submit, &e))?;

        let tx = TxHandle(*pending.tx_hash());
        debug!(method = %method, tx_hash = %tx, "transaction accepted by the network");
        Ok(tx)
    }
}

/// Wait for a submitted transaction to be mined.
///
/// A transaction that is not mined within `timeout` yields
/// [`WaveError::ConfirmationTimeout`]; it may still be mined later.
pub(crate) async fn await_receipt<P: Provider + Clone>(
    provider: &P,
    method: &str,
    tx: TxHandle,
    gas_limit: Option<u64>,
    timeout: Duration,
) -> Result<Confirmation, WaveError> {
    let pending = PendingTransactionBuilder::new(provider.root().clone(), tx.hash());

    let receipt = match tokio::time::timeout(timeout, pending.get_receipt()).await {
        Ok(Ok(receipt)) => receipt,
        Ok(Err(e)) => {
            return Err(WaveError::Submission(format!(
                "{method}: lost track of {tx}: {e}"
            )));
        }
        Err(_) => {
            return Err(WaveError::ConfirmationTimeout {
                tx_hash: tx.hash(),
                waited: timeout,
            });
        }
    };

    if !receipt.status() {
        if let Some(limit) = gas_limit {
            let used = receipt.gas_used;
            if used >= limit {
                warn!(method = %method, tx_hash = %tx, used, limit, "transaction ran out of gas");
                return Err(WaveError::ContractRevert(format!(
                    "{method} ran out of gas (used {used} of {limit} limit). Tx: {tx}"
                )));
            }
        }
        return Err(WaveError::ContractRevert(format!(
            "{method} reverted on-chain. Tx: {tx}"
        )));
    }

    info!(
        method = %method,
        tx_hash = %tx,
        block_number = ?receipt.block_number,
        gas_used = receipt.gas_used,
        effective_gas_price = receipt.effective_gas_price,
        "transaction mined"
    );

    Ok(Confirmation {
        tx,
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
    })
}
