use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::database::CooldownStore;
use crate::faucet::gate::AdmissionGate;
use crate::faucet::outcome::{CoordinatorError, DisbursementOutcome};
use crate::ledger::{Address, LedgerClient, SubmissionError, TxHash, Wei};

pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(60 * 60 * 24);
pub const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed parameters of every disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisbursementPolicy {
    pub amount: Wei,
    pub cooldown_window: Duration,
    pub submission_timeout: Duration,
}

impl DisbursementPolicy {
    pub fn new(amount: Wei) -> Self {
        DisbursementPolicy {
            amount,
            cooldown_window: DEFAULT_COOLDOWN_WINDOW,
            submission_timeout: DEFAULT_SUBMISSION_TIMEOUT,
        }
    }

    /// Time left before `requester` may be paid again, or `None` if eligible.
    ///
    /// Eligibility needs strictly more than one window since the last
    /// disbursement. The wait is `window - elapsed`, except exactly on the
    /// boundary where that would be zero while the request is still denied:
    /// there it is reported as one second, the earliest time a retry succeeds.
    pub fn remaining_cooldown(&self, last_disbursed_at: Option<i64>, now: i64) -> Option<Duration> {
        let last = last_disbursed_at?;
        let window = i64::try_from(self.cooldown_window.as_secs()).unwrap_or(i64::MAX);
        // A timestamp from the future (clock skew) counts as "just now".
        let elapsed = now.saturating_sub(last).max(0);
        if elapsed > window {
            return None;
        }
        let remaining = window.saturating_sub(elapsed).max(1);
        Some(Duration::from_secs(remaining as u64))
    }
}

/// Decides, submits and records disbursements.
///
/// Requests from one requester are serialized from the cooldown read until
/// the commit; requests from different requesters run concurrently and share
/// nothing but the store.
pub struct Coordinator {
    store: Arc<dyn CooldownStore>,
    ledger: Arc<dyn LedgerClient>,
    gate: AdmissionGate,
    policy: DisbursementPolicy,
}

impl Coordinator {
    pub fn new(store: Arc<dyn CooldownStore>, ledger: Arc<dyn LedgerClient>, policy: DisbursementPolicy) -> Self {
        Coordinator {
            store,
            ledger,
            gate: AdmissionGate::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &DisbursementPolicy {
        &self.policy
    }

    #[tracing::instrument(name = "disbursement", skip_all, fields(requester = %requester))]
    pub async fn request_disbursement(&self, requester: &str, destination: &str, now: i64) -> Result<DisbursementOutcome, CoordinatorError> {
        let destination: Address = match destination.parse() {
            Ok(address) => address,
            Err(e) => {
                tracing::info!("Rejected destination {:?}: {}", destination, e);
                return Ok(DisbursementOutcome::InvalidAddress);
            }
        };

        let _pass = self.gate.acquire(requester).await;

        let last_disbursed_at = self.store.get(requester).await.map_err(|e| {
            tracing::error!("Could not read cooldown: {}", e);
            CoordinatorError::StorageUnavailable(e)
        })?;

        if let Some(retry_after) = self.policy.remaining_cooldown(last_disbursed_at, now) {
            tracing::info!("Denied, retry in {}s", retry_after.as_secs());
            return Ok(DisbursementOutcome::Denied { retry_after });
        }

        let tx_hash = match self.submit(&destination).await {
            Ok(tx_hash) => tx_hash,
            Err(SubmissionError::InvalidRecipient) => {
                tracing::info!("Ledger rejected recipient {}", destination);
                return Ok(DisbursementOutcome::InvalidAddress);
            }
            Err(cause) => {
                if let SubmissionError::TimedOut(_) = cause {
                    tracing::warn!(target: "reconciliation", requester, destination = %destination, "Submission outcome unknown: {}", cause);
                } else {
                    tracing::warn!("Submission to {} failed: {}", destination, cause);
                }
                return Ok(DisbursementOutcome::SubmissionFailed { cause });
            }
        };

        self.commit(requester, last_disbursed_at, now, &tx_hash).await?;

        tracing::info!(tx_hash = %tx_hash, "Sent {} to {}", self.policy.amount, destination);
        Ok(DisbursementOutcome::Admitted { tx_hash })
    }

    async fn submit(&self, destination: &Address) -> Result<TxHash, SubmissionError> {
        let attempt = AssertUnwindSafe(self.ledger.submit(destination, self.policy.amount)).catch_unwind();

        match tokio::time::timeout(self.policy.submission_timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(SubmissionError::Internal(panic_message(panic.as_ref()))),
            Err(_) => Err(SubmissionError::TimedOut(self.policy.submission_timeout)),
        }
    }

    async fn commit(&self, requester: &str, observed: Option<i64>, now: i64, tx_hash: &TxHash) -> Result<(), CoordinatorError> {
        match self.store.compare_and_put(requester, observed, now).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                // Another process sharing the database committed first. Our transfer still went out.
                tracing::warn!(target: "reconciliation", requester, tx_hash = %tx_hash, "Cooldown changed while the transfer was in flight");
                Ok(())
            }
            Err(source) => {
                tracing::error!(target: "reconciliation", requester, tx_hash = %tx_hash, "Transfer sent but cooldown not recorded: {}", source);
                Err(CoordinatorError::CommitFailed {
                    tx_hash: tx_hash.clone(),
                    source,
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "ledger client panicked".to_string()
    }
}
