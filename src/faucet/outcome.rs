use std::time::Duration;

use thiserror::Error;

use crate::database::StoreError;
use crate::ledger::{SubmissionError, TxHash};

/// What happened to a single disbursement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisbursementOutcome {
    /// The transfer was submitted and the cooldown recorded.
    Admitted { tx_hash: TxHash },
    /// The requester is still inside the cooldown window.
    Denied { retry_after: Duration },
    /// Nothing was recorded; the requester may retry straight away.
    SubmissionFailed { cause: SubmissionError },
    InvalidAddress,
}

/// Failures of the cooldown store. Neither is an admit or a deny.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("cooldown store unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    #[error("transfer {tx_hash} was submitted but its cooldown could not be recorded: {source}")]
    CommitFailed {
        tx_hash: TxHash,
        #[source]
        source: StoreError,
    },
}
