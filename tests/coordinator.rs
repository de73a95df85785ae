use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use faucet_bot::database::{CooldownStore, MemoryCooldownStore, SqliteCooldownStore, StoreError, StoreResult};
use faucet_bot::faucet::{Coordinator, CoordinatorError, DisbursementOutcome, DisbursementPolicy};
use faucet_bot::ledger::{Address, LedgerClient, SubmissionError, TxHash, Wei};

const ADDRESS: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";
const DAY: i64 = 86_400;

enum Step {
    Succeed(&'static str),
    Fail(SubmissionError),
    Delay(Duration, &'static str),
    Hang,
    Panic,
}

/// Plays back a script of submission results; an empty script succeeds with `0xdeadbeef`.
#[derive(Default)]
struct ScriptedLedger {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLedger {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(ScriptedLedger {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn submit(&self, _destination: &Address, _amount: Wei) -> Result<TxHash, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(TxHash::new("0xdeadbeef")),
            Some(Step::Succeed(hash)) => Ok(TxHash::new(hash)),
            Some(Step::Fail(cause)) => Err(cause),
            Some(Step::Delay(delay, hash)) => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(TxHash::new(hash))
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(TxHash::new("0xlate"))
            }
            Some(Step::Panic) => panic!("ledger exploded"),
        }
    }
}

/// Reads always succeed with `last`; writes fail.
struct ReadOnlyStore {
    last: Option<i64>,
}

#[async_trait]
impl CooldownStore for ReadOnlyStore {
    async fn get(&self, _requester: &str) -> StoreResult<Option<i64>> {
        Ok(self.last)
    }

    async fn put(&self, _requester: &str, _timestamp: i64) -> StoreResult<()> {
        Err(StoreError::Task("disk full".to_string()))
    }

    async fn compare_and_put(&self, _requester: &str, _expected: Option<i64>, _timestamp: i64) -> StoreResult<bool> {
        Err(StoreError::Task("disk full".to_string()))
    }
}

struct BrokenStore;

#[async_trait]
impl CooldownStore for BrokenStore {
    async fn get(&self, _requester: &str) -> StoreResult<Option<i64>> {
        Err(StoreError::Task("database is locked".to_string()))
    }

    async fn put(&self, _requester: &str, _timestamp: i64) -> StoreResult<()> {
        Err(StoreError::Task("database is locked".to_string()))
    }

    async fn compare_and_put(&self, _requester: &str, _expected: Option<i64>, _timestamp: i64) -> StoreResult<bool> {
        Err(StoreError::Task("database is locked".to_string()))
    }
}

fn policy() -> DisbursementPolicy {
    DisbursementPolicy {
        submission_timeout: Duration::from_millis(500),
        ..DisbursementPolicy::new(Wei::new(100))
    }
}

fn coordinator(store: Arc<dyn CooldownStore>, ledger: Arc<ScriptedLedger>) -> Coordinator {
    Coordinator::new(store, ledger, policy())
}

fn admitted(hash: &str) -> DisbursementOutcome {
    DisbursementOutcome::Admitted { tx_hash: TxHash::new(hash) }
}

fn denied(secs: u64) -> DisbursementOutcome {
    DisbursementOutcome::Denied {
        retry_after: Duration::from_secs(secs),
    }
}

#[tokio::test]
async fn first_request_is_admitted_and_recorded() {
    let store = Arc::new(MemoryCooldownStore::new());
    let ledger = ScriptedLedger::new(vec![]);
    let coordinator = coordinator(store.clone(), ledger.clone());

    let outcome = coordinator.request_disbursement("discord:1", ADDRESS, 1_000).await.unwrap();

    assert_eq!(outcome, admitted("0xdeadbeef"));
    assert_eq!(store.get("discord:1").await.unwrap(), Some(1_000));
    assert_eq!(ledger.calls(), 1);
}

#[tokio::test]
async fn daily_request_scenario() {
    let store = Arc::new(MemoryCooldownStore::new());
    let ledger = ScriptedLedger::new(vec![Step::Succeed("0xdeadbeef"), Step::Succeed("0xfeedface")]);
    let coordinator = coordinator(store.clone(), ledger.clone());

    assert_eq!(coordinator.request_disbursement("discord:7", ADDRESS, 0).await.unwrap(), admitted("0xdeadbeef"));
    assert_eq!(coordinator.request_disbursement("discord:7", ADDRESS, 3_600).await.unwrap(), denied(82_800));
    assert_eq!(coordinator.request_disbursement("discord:7", ADDRESS, DAY + 1).await.unwrap(), admitted("0xfeedface"));

    assert_eq!(ledger.calls(), 2);
    assert_eq!(store.get("discord:7").await.unwrap(), Some(DAY + 1));
}

#[tokio::test]
async fn window_boundary_is_exclusive() {
    let store = Arc::new(MemoryCooldownStore::new());
    store.put("discord:1", 0).await.unwrap();
    let ledger = ScriptedLedger::new(vec![]);
    let coordinator = coordinator(store, ledger.clone());

    assert_eq!(coordinator.request_disbursement("discord:1", ADDRESS, DAY).await.unwrap(), denied(1));
    assert_eq!(ledger.calls(), 0);
    assert_eq!(coordinator.request_disbursement("discord:1", ADDRESS, DAY + 1).await.unwrap(), admitted("0xdeadbeef"));
}

#[tokio::test]
async fn denial_leaves_the_cooldown_alone() {
    let store = Arc::new(MemoryCooldownStore::new());
    store.put("discord:1", 500).await.unwrap();
    let coordinator = coordinator(store.clone(), ScriptedLedger::new(vec![]));

    coordinator.request_disbursement("discord:1", ADDRESS, 600).await.unwrap();

    assert_eq!(store.get("discord:1").await.unwrap(), Some(500));
}

#[tokio::test]
async fn invalid_address_never_reaches_the_ledger() {
    let store = Arc::new(MemoryCooldownStore::new());
    let ledger = ScriptedLedger::new(vec![]);
    let coordinator = coordinator(store.clone(), ledger.clone());

    for address in ["", "0x123", "not an address", "0xZZCDEF0123456789ABCDEF0123456789ABCDEF01"] {
        let outcome = coordinator.request_disbursement("discord:1", address, 0).await.unwrap();
        assert_eq!(outcome, DisbursementOutcome::InvalidAddress, "{:?}", address);
    }

    assert_eq!(ledger.calls(), 0);
    assert_eq!(store.get("discord:1").await.unwrap(), None);
}

#[tokio::test]
async fn recipient_rejected_by_ledger_is_an_invalid_address() {
    let store = Arc::new(MemoryCooldownStore::new());
    let ledger = ScriptedLedger::new(vec![Step::Fail(SubmissionError::InvalidRecipient)]);
    let coordinator = coordinator(store.clone(), ledger);

    let outcome = coordinator.request_disbursement("discord:1", ADDRESS, 0).await.unwrap();

    assert_eq!(outcome, DisbursementOutcome::InvalidAddress);
    assert_eq!(store.get("discord:1").await.unwrap(), None);
}

#[tokio::test]
async fn failed_submission_can_be_retried_immediately() {
    let store = Arc::new(MemoryCooldownStore::new());
    let ledger = ScriptedLedger::new(vec![Step::Fail(SubmissionError::InsufficientFunds)]);
    let coordinator = coordinator(store.clone(), ledger.clone());

    let outcome = coordinator.request_disbursement("discord:1", ADDRESS, 0).await.unwrap();
    assert_eq!(
        outcome,
        DisbursementOutcome::SubmissionFailed {
            cause: SubmissionError::InsufficientFunds
        }
    );
    assert_eq!(store.get("discord:1").await.unwrap(), None);

    assert_eq!(coordinator.request_disbursement("discord:1", ADDRESS, 1).await.unwrap(), admitted("0xdeadbeef"));
    assert_eq!(ledger.calls(), 2);
}

#[tokio::test]
async fn hanging_ledger_times_out_without_recording() {
    let store = Arc::new(MemoryCooldownStore::new());
    let coordinator = coordinator(store.clone(), ScriptedLedger::new(vec![Step::Hang]));

    let outcome = coordinator.request_disbursement("discord:1", ADDRESS, 0).await.unwrap();

    assert_eq!(
        outcome,
        DisbursementOutcome::SubmissionFailed {
            cause: SubmissionError::TimedOut(Duration::from_millis(500))
        }
    );
    assert_eq!(store.get("discord:1").await.unwrap(), None);
}

#[tokio::test]
async fn panicking_ledger_is_contained() {
    let store = Arc::new(MemoryCooldownStore::new());
    let coordinator = coordinator(store.clone(), ScriptedLedger::new(vec![Step::Panic]));

    let outcome = coordinator.request_disbursement("discord:1", ADDRESS, 0).await.unwrap();
    assert_eq!(
        outcome,
        DisbursementOutcome::SubmissionFailed {
            cause: SubmissionError::Internal("ledger exploded".to_string())
        }
    );
    assert_eq!(store.get("discord:1").await.unwrap(), None);

    // The requester's slot was released by the panic.
    assert_eq!(coordinator.request_disbursement("discord:1", ADDRESS, 1).await.unwrap(), admitted("0xdeadbeef"));
}

#[tokio::test]
async fn unreadable_store_is_neither_admit_nor_deny() {
    let ledger = ScriptedLedger::new(vec![]);
    let coordinator = coordinator(Arc::new(BrokenStore), ledger.clone());

    let result = coordinator.request_disbursement("discord:1", ADDRESS, 0).await;

    assert!(matches!(result, Err(CoordinatorError::StorageUnavailable(_))));
    assert_eq!(ledger.calls(), 0);
}

#[tokio::test]
async fn unrecorded_transfer_reports_its_hash() {
    let coordinator = coordinator(Arc::new(ReadOnlyStore { last: None }), ScriptedLedger::new(vec![Step::Succeed("0xabc123")]));

    match coordinator.request_disbursement("discord:1", ADDRESS, 0).await {
        Err(CoordinatorError::CommitFailed { tx_hash, .. }) => assert_eq!(tx_hash, TxHash::new("0xabc123")),
        other => panic!("expected CommitFailed, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_from_one_requester_pay_once() {
    let store = Arc::new(MemoryCooldownStore::new());
    let steps = (0..16).map(|_| Step::Delay(Duration::from_millis(20), "0xdeadbeef")).collect();
    let ledger = ScriptedLedger::new(steps);
    let coordinator = Arc::new(coordinator(store.clone(), ledger.clone()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.request_disbursement("telegram:9", ADDRESS, 100).await })
        })
        .collect();

    let mut admitted_count = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            DisbursementOutcome::Admitted { .. } => admitted_count += 1,
            DisbursementOutcome::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(86_400)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(admitted_count, 1);
    assert_eq!(ledger.calls(), 1);
    assert_eq!(store.get("telegram:9").await.unwrap(), Some(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_requesters_do_not_wait_for_each_other() {
    let store = Arc::new(MemoryCooldownStore::new());
    let steps = (0..4).map(|_| Step::Delay(Duration::from_millis(80), "0xdeadbeef")).collect();
    let ledger = ScriptedLedger::new(steps);
    let coordinator = Arc::new(coordinator(store.clone(), ledger.clone()));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.request_disbursement(&format!("discord:{}", i), ADDRESS, 0).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), admitted("0xdeadbeef"));
    }

    assert!(ledger.max_in_flight.load(Ordering::SeqCst) > 1);
    for i in 0..4 {
        assert_eq!(store.get(&format!("discord:{}", i)).await.unwrap(), Some(0));
    }
}

#[tokio::test]
async fn cooldowns_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cooldowns.sqlite3");

    {
        let store = Arc::new(SqliteCooldownStore::open(&path).unwrap());
        let coordinator = coordinator(store, ScriptedLedger::new(vec![]));
        assert_eq!(coordinator.request_disbursement("discord:5", ADDRESS, 0).await.unwrap(), admitted("0xdeadbeef"));
    }

    let store = Arc::new(SqliteCooldownStore::open(&path).unwrap());
    let ledger = ScriptedLedger::new(vec![]);
    let coordinator = coordinator(store, ledger.clone());

    assert_eq!(coordinator.request_disbursement("discord:5", ADDRESS, 3_600).await.unwrap(), denied(82_800));
    assert_eq!(ledger.calls(), 0);
}
