use alloy::primitives::B256;
use std::time::Duration;

/// Every failure the client surfaces to its callers.
///
/// Raw transport and contract errors are classified into one of these kinds
/// before they leave the contract client (see [`crate::common::errors`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaveError {
    #[error("no wallet detected")]
    WalletUnavailable,

    #[error("wallet connection was rejected by the user")]
    ConnectionRejected,

    #[error("no wallet account is connected")]
    NoWalletConnected,

    #[error("wave message is empty")]
    EmptyMessage,

    #[error("a wave is already being sent")]
    SendInProgress,

    #[error("{subscriber} is already subscribed to {event}")]
    AlreadySubscribed { event: String, subscriber: String },

    #[error("chain read failed: {0}")]
    ChainRead(String),

    #[error("transaction rejected by the wallet: {0}")]
    UserRejected(String),

    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("contract reverted: {0}")]
    ContractRevert(String),

    #[error("transaction {tx_hash} not confirmed within {waited:?}")]
    ConfirmationTimeout { tx_hash: B256, waited: Duration },

    #[error("event delivery failed: {0}")]
    EventDelivery(String),
}

impl WaveError {
    /// Whether the caller's retry policy should try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WaveError::ChainRead(_))
    }

    /// Failures after which an optimistic record must be dropped.
    pub fn discards_pending(&self) -> bool {
        !matches!(self, WaveError::ConfirmationTimeout { .. })
    }
}
