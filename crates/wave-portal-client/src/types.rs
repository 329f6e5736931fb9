use alloy::primitives::{Address, B256, keccak256};
use alloy::sol_types::SolValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A wave as read from the chain, before the store assigns it an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveEntry {
    pub sender: Address,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl WaveEntry {
    pub fn new(sender: Address, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            sender,
            timestamp,
            message: message.into(),
        }
    }

    /// Key used for de-duplication. Timestamps compare at whole-second resolution.
    pub fn sequence_key(&self) -> SequenceKey {
        SequenceKey::derive(self.sender, self.timestamp, &self.message)
    }
}

/// Where a record in the store came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaveOrigin {
    Historical,
    Live,
    Pending,
}

/// keccak256(abi.encode(sender, timestampSecs, message))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey(pub B256);

impl SequenceKey {
    pub fn derive(sender: Address, timestamp: DateTime<Utc>, message: &str) -> Self {
        let encoded = (sender, timestamp.timestamp(), message.to_string()).abi_encode();
        Self(keccak256(encoded))
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub sender: Address,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub origin: WaveOrigin,
    pub sequence_key: SequenceKey,
}

impl WaveRecord {
    pub fn from_entry(entry: WaveEntry, origin: WaveOrigin) -> Self {
        let sequence_key = entry.sequence_key();
        Self {
            sender: entry.sender,
            timestamp: entry.timestamp,
            message: entry.message,
            origin,
            sequence_key,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.origin == WaveOrigin::Pending
    }
}

/// Opaque reference to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(pub B256);

impl TxHandle {
    pub fn hash(&self) -> B256 {
        self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for a state-changing `wave` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub gas_limit: Option<u64>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            gas_limit: Some(crate::DEFAULT_GAS_LIMIT),
        }
    }
}

/// Events the contract emits that the client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractEvent {
    NewWave,
}

impl ContractEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ContractEvent::NewWave => "NewWave",
        }
    }
}

impl fmt::Display for ContractEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Local time truncated to whole seconds, matching chain timestamp resolution.
pub fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_sequence_key_ignores_subsecond_precision() {
        let sender = Address::repeat_byte(0xab);
        let whole = WaveEntry::new(sender, at(1_700_000_000), "hello");
        let fractional = WaveEntry::new(
            sender,
            DateTime::from_timestamp(1_700_000_000, 750_000_000).unwrap(),
            "hello",
        );
        assert_eq!(whole.sequence_key(), fractional.sequence_key());
    }

    #[test]
    fn test_sequence_key_distinguishes_fields() {
        let sender = Address::repeat_byte(0xab);
        let base = WaveEntry::new(sender, at(100), "hello");
        let other_sender = WaveEntry::new(Address::repeat_byte(0xcd), at(100), "hello");
        let other_time = WaveEntry::new(sender, at(101), "hello");
        let other_message = WaveEntry::new(sender, at(100), "hello!");

        assert_ne!(base.sequence_key(), other_sender.sequence_key());
        assert_ne!(base.sequence_key(), other_time.sequence_key());
        assert_ne!(base.sequence_key(), other_message.sequence_key());
    }

    #[test]
    fn test_now_secs_has_no_fraction() {
        assert_eq!(now_secs().timestamp_subsec_nanos(), 0);
    }
}
