use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod address;
pub mod amount;
pub mod rpc;

pub use address::{Address, AddressError};
pub use amount::{AmountError, Wei};
pub use rpc::JsonRpcLedger;

/// Hash of a transaction the network accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        TxHash(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("recipient address was rejected")]
    InvalidRecipient,
    #[error("faucet account has insufficient funds")]
    InsufficientFunds,
    #[error("ledger node unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("transaction rejected by the network: {0}")]
    Rejected(String),
    #[error("submission did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("ledger client fault: {0}")]
    Internal(String),
}

/// Sends a single value transfer from the faucet account.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit(&self, destination: &Address, amount: Wei) -> Result<TxHash, SubmissionError>;
}
