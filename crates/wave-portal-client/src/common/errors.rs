//! Classification of alloy failures into [`WaveError`] kinds.

use crate::WaveError;
use alloy::{
    hex,
    sol_types::{Revert, SolError, decode_revert_reason},
};

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Geth/anvil execution-reverted code.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Read,
    Submit,
}

/// The parts of a failed JSON-RPC call that matter for classification.
#[derive(Debug)]
pub(crate) struct RpcFailure<'a> {
    pub code: Option<i64>,
    pub message: String,
    pub revert_data: Option<&'a [u8]>,
}

/// Classify a contract call error.
pub(crate) fn classify_contract_error(
    method: &str,
    kind: CallKind,
    error: &alloy::contract::Error,
) -> WaveError {
    let revert_data = error.as_revert_data();
    let (code, message) = match error {
        alloy::contract::Error::TransportError(e) => match e.as_error_resp() {
            Some(payload) => (Some(payload.code), payload.message.to_string()),
            None => (None, e.to_string()),
        },
        other => (None, other.to_string()),
    };
    classify(
        method,
        kind,
        RpcFailure {
            code,
            message,
            revert_data: revert_data.as_ref().map(|data| &data[..]),
        },
    )
}

pub(crate) fn classify(method: &str, kind: CallKind, failure: RpcFailure<'_>) -> WaveError {
    let RpcFailure {
        code,
        message,
        revert_data,
    } = failure;

    if kind == CallKind::Read {
        return WaveError::ChainRead(format!("{method}: {message}"));
    }

    if code == Some(USER_REJECTED_CODE) {
        return WaveError::UserRejected(format!("{method}: {message}"));
    }

    if let Some(data) = revert_data {
        let reason = Revert::abi_decode(data)
            .map(|revert| revert.reason)
            .ok()
            .or_else(|| decode_revert_reason(data))
            .unwrap_or_else(|| hex::encode_prefixed(data));
        return WaveError::ContractRevert(format!("{method}: {reason}"));
    }

    if code == Some(EXECUTION_REVERTED_CODE) || message.to_lowercase().contains("revert") {
        return WaveError::ContractRevert(format!("{method}: {message}"));
    }

    WaveError::Submission(format!("{method}: {message}"))
}
