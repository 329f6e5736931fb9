pub mod errors;
pub(crate) mod tx_submitter;
