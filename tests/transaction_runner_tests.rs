/// Transaction runner tests
///
/// Retry loop behaviour: attempt budget, retry classification, backoff
/// between attempts, retry hints and rollback handling.
/// Run with: cargo test --test transaction_runner_tests

use async_trait::async_trait;
use docdb_client::rpc::memory::{RpcCall, RpcMethod};
use docdb_client::{
    Backoff, BackoffSettings, Code, Connection, DocumentData, DocumentReference, Error,
    ExponentialBackoff, InMemoryRpc, Status, Transaction, TransactionId, TransactionRunner, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DB: &str = "projects/test/databases/(default)";

/// Wraps the real backoff and records every wait it performs
#[derive(Clone)]
struct RecordingBackoff {
    inner: ExponentialBackoff,
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingBackoff {
    fn new() -> Self {
        Self {
            inner: ExponentialBackoff::new(BackoffSettings::deterministic(
                Duration::from_millis(100),
                2.0,
                Duration::from_millis(1000),
            )),
            waits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn waits(&self) -> Vec<u64> {
        self.waits
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl Backoff for RecordingBackoff {
    async fn backoff_and_wait(&mut self) -> Duration {
        let waited = self.inner.backoff_and_wait().await;
        self.waits.lock().unwrap().push(waited);
        waited
    }

    fn reset_to_max(&mut self) {
        self.inner.reset_to_max();
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

fn setup() -> (InMemoryRpc, Connection, RecordingBackoff) {
    let rpc = InMemoryRpc::new();
    let connection = Connection::new(Arc::new(rpc.clone()), DB);
    (rpc, connection, RecordingBackoff::new())
}

fn runner(connection: &Connection, backoff: &RecordingBackoff, max_attempts: usize) -> TransactionRunner {
    TransactionRunner::new(connection.clone())
        .max_attempts(max_attempts)
        .backoff(backoff.clone())
}

fn doc(path: &str) -> DocumentReference {
    DocumentReference::new(path).unwrap()
}

fn data(field: &str, value: i64) -> DocumentData {
    [(field.to_string(), Value::Integer(value))].into()
}

#[tokio::test(start_paused = true)]
async fn test_retryable_error_exhausts_attempts() {
    let (rpc, connection, backoff) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let started = tokio::time::Instant::now();

    let result: Result<(), Error> = runner(&connection, &backoff, 3)
        .run(|_txn| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Status::unavailable("backend unavailable").into())
            }
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), Some(Code::Unavailable));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 3);
    assert_eq!(rpc.call_count(RpcMethod::Rollback).await, 3);
    assert_eq!(rpc.call_count(RpcMethod::Commit).await, 0);

    // No wait before the first attempt, growing waits afterwards.
    assert_eq!(backoff.waits(), vec![100, 200]);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(rpc.active_transaction_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_fails_after_one_attempt() {
    let (rpc, connection, backoff) = setup();

    let err = runner(&connection, &backoff, 5)
        .run(|_txn| async { Err::<(), _>(Status::new(Code::PermissionDenied, "denied").into()) })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(Code::PermissionDenied));
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 1);
    assert_eq!(rpc.call_count(RpcMethod::Rollback).await, 1);
    assert!(backoff.waits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_every_retryable_code_is_retried() {
    for code in [
        Code::Aborted,
        Code::Cancelled,
        Code::Unknown,
        Code::DeadlineExceeded,
        Code::Internal,
        Code::Unavailable,
        Code::Unauthenticated,
        Code::ResourceExhausted,
    ] {
        let (rpc, connection, backoff) = setup();
        rpc.fail_next(RpcMethod::Commit, Status::new(code, "transient")).await;

        let value = runner(&connection, &backoff, 2)
            .run(|txn| async move {
                txn.set(&doc("c/d"), data("n", 1))?;
                Ok(code)
            })
            .await
            .unwrap();

        assert_eq!(value, code);
        assert_eq!(rpc.call_count(RpcMethod::Commit).await, 2, "{}", code);
    }
}

#[tokio::test(start_paused = true)]
async fn test_resource_exhausted_waits_max_delay() {
    let (rpc, connection, backoff) = setup();
    rpc.fail_next(RpcMethod::Commit, Status::new(Code::ResourceExhausted, "quota"))
        .await;

    let result = runner(&connection, &backoff, 5)
        .run(|txn| async move {
            txn.set(&doc("quota/x"), data("n", 1))?;
            Ok("done")
        })
        .await
        .unwrap();

    assert_eq!(result, "done");
    assert_eq!(backoff.waits(), vec![1000]);
    assert!(rpc.document(&doc("quota/x")).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_previous_handle_is_sent_as_retry_hint() {
    let (rpc, connection, backoff) = setup();
    let seen: Arc<Mutex<Vec<TransactionId>>> = Arc::new(Mutex::new(Vec::new()));

    let attempts = runner(&connection, &backoff, 3)
        .run(|txn| {
            let seen = seen.clone();
            async move {
                let id = txn.transaction_id()?.unwrap();
                let attempt = {
                    let mut seen = seen.lock().unwrap();
                    seen.push(id);
                    seen.len()
                };
                if attempt < 3 {
                    return Err(Status::aborted("contention").into());
                }
                Ok(attempt)
            }
        })
        .await
        .unwrap();
    assert_eq!(attempts, 3);

    let seen = seen.lock().unwrap().clone();
    let hints: Vec<Option<TransactionId>> = rpc
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            RpcCall::BeginTransaction(request) => Some(request.retry_transaction().cloned()),
            _ => None,
        })
        .collect();

    assert_eq!(hints, vec![None, Some(seen[0].clone()), Some(seen[1].clone())]);
    assert_ne!(seen[0], seen[1]);
}

#[tokio::test(start_paused = true)]
async fn test_begin_failure_propagates_without_retry() {
    let (rpc, connection, backoff) = setup();
    rpc.fail_next(RpcMethod::BeginTransaction, Status::unavailable("no begin"))
        .await;
    let calls = Arc::new(AtomicUsize::new(0));

    let err = runner(&connection, &backoff, 5)
        .run(|_txn| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(Code::Unavailable));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 1);
    assert_eq!(rpc.call_count(RpcMethod::Rollback).await, 0);
    assert!(backoff.waits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_begin_failure_on_retry_ends_the_run() {
    let (rpc, connection, backoff) = setup();
    let script = rpc.clone();

    let err = runner(&connection, &backoff, 5)
        .run(|_txn| {
            let script = script.clone();
            async move {
                script
                    .fail_next(RpcMethod::BeginTransaction, Status::new(Code::Internal, "begin broke"))
                    .await;
                Err::<(), _>(Status::aborted("contention").into())
            }
        })
        .await
        .unwrap_err();

    // The begin error ends the run even though INTERNAL is retryable.
    assert_eq!(err.code(), Some(Code::Internal));
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 2);
    assert_eq!(rpc.call_count(RpcMethod::Rollback).await, 1);
    assert_eq!(backoff.waits(), vec![100]);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_failure_keeps_original_error() {
    let (rpc, connection, backoff) = setup();
    rpc.fail_next(RpcMethod::Rollback, Status::new(Code::Internal, "rollback broke"))
        .await;

    let err = runner(&connection, &backoff, 5)
        .run(|_txn| async { Err::<(), _>(Status::new(Code::PermissionDenied, "denied").into()) })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(Code::PermissionDenied));
    assert!(err.to_string().contains("denied"));
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_failure_does_not_stop_retries() {
    let (rpc, connection, backoff) = setup();
    rpc.fail_next(RpcMethod::Rollback, Status::unavailable("rollback lost"))
        .await;
    rpc.fail_next(RpcMethod::Commit, Status::aborted("contention")).await;

    let value = runner(&connection, &backoff, 3)
        .run(|txn| async move {
            txn.create(&doc("c/one"), data("v", 1))?;
            Ok(7)
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_commit_conflict_is_not_retried() {
    let (rpc, connection, backoff) = setup();
    rpc.insert_document(doc("users/alice"), data("age", 30)).await;

    let err = runner(&connection, &backoff, 5)
        .run(|txn| async move {
            txn.create(&doc("users/alice"), data("age", 1))?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(Code::AlreadyExists));
    assert_eq!(rpc.call_count(RpcMethod::Commit).await, 1);
    assert_eq!(rpc.call_count(RpcMethod::Rollback).await, 1);
    assert_eq!(rpc.document(&doc("users/alice")).await.unwrap(), data("age", 30));
}

#[tokio::test(start_paused = true)]
async fn test_application_error_is_not_retried() {
    let (rpc, connection, backoff) = setup();

    let err = runner(&connection, &backoff, 5)
        .run(|_txn| async { Err::<(), _>(anyhow::anyhow!("insufficient funds").into()) })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Application(_)));
    assert_eq!(err.to_string(), "insufficient funds");
    assert_eq!(rpc.call_count(RpcMethod::BeginTransaction).await, 1);
}

#[tokio::test]
async fn test_zero_attempts_is_rejected_before_any_rpc() {
    let (rpc, connection, backoff) = setup();

    let err = runner(&connection, &backoff, 0)
        .run(|_txn| async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(rpc.calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_read_after_write_fails_the_run() {
    let (rpc, connection, backoff) = setup();

    let err = runner(&connection, &backoff, 5)
        .run(|txn| async move {
            txn.set(&doc("c/a"), data("n", 1))?;
            txn.get(&doc("c/b")).await?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OrderingViolation));
    assert_eq!(rpc.call_count(RpcMethod::BatchGetDocuments).await, 0);
    assert_eq!(rpc.call_count(RpcMethod::Commit).await, 0);
    assert_eq!(rpc.call_count(RpcMethod::Rollback).await, 1);
    assert!(rpc.document(&doc("c/a")).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_handle_is_rejected_in_later_attempt() {
    let (_rpc, connection, backoff) = setup();
    let first: Arc<Mutex<Option<Transaction>>> = Arc::new(Mutex::new(None));

    let outcome = runner(&connection, &backoff, 2)
        .run(|txn| {
            let first = first.clone();
            async move {
                let stale = first.lock().unwrap().replace(txn.clone());
                match stale {
                    None => Err(Status::aborted("retry me").into()),
                    Some(stale) => Ok(stale.set(&doc("c/x"), DocumentData::new()).is_err()),
                }
            }
        })
        .await
        .unwrap();

    assert!(outcome);
}

#[tokio::test]
async fn test_concurrent_reads_share_the_attempt() {
    let (rpc, connection, backoff) = setup();
    rpc.insert_document(doc("accounts/a"), data("balance", 70)).await;
    rpc.insert_document(doc("accounts/b"), data("balance", 30)).await;

    let total = runner(&connection, &backoff, 1)
        .run(|txn| async move {
            let (a, b) = (doc("accounts/a"), doc("accounts/b"));
            let (a_snap, b_snap) = futures::future::try_join(txn.get(&a), txn.get(&b)).await?;

            let balance = |snap: &docdb_client::DocumentSnapshot| {
                snap.data()
                    .and_then(|fields| fields.get("balance"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0)
            };
            let total = balance(&a_snap) + balance(&b_snap);

            txn.set(&a, data("balance", 0))?.set(&b, data("balance", total))?;
            Ok(total)
        })
        .await
        .unwrap();

    assert_eq!(total, 100);
    assert_eq!(rpc.document(&doc("accounts/b")).await.unwrap(), data("balance", 100));

    let transaction_ids: Vec<_> = rpc
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            RpcCall::BatchGetDocuments(request) => Some(request.transaction),
            _ => None,
        })
        .collect();
    assert_eq!(transaction_ids.len(), 2);
    assert!(transaction_ids.iter().all(|id| id.is_some() && *id == transaction_ids[0]));
}

#[tokio::test(start_paused = true)]
async fn test_inverted_backoff_settings_retry_at_max_delay() {
    let (rpc, connection, _backoff) = setup();
    rpc.fail_next(RpcMethod::Commit, Status::aborted("contention")).await;
    let started = tokio::time::Instant::now();

    let value = TransactionRunner::new(connection)
        .max_attempts(2)
        .backoff(ExponentialBackoff::new(BackoffSettings::deterministic(
            Duration::from_secs(10),
            1.5,
            Duration::from_secs(1),
        )))
        .run(|txn| async move {
            txn.set(&doc("c/inverted"), data("n", 1))?;
            Ok(1)
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_resource_exhausted_wait_is_exact_with_jitter() {
    let (rpc, connection, _backoff) = setup();
    rpc.fail_next(RpcMethod::Commit, Status::new(Code::ResourceExhausted, "quota"))
        .await;

    let settings = BackoffSettings {
        jitter_factor: 1.0,
        ..BackoffSettings::deterministic(Duration::from_millis(100), 2.0, Duration::from_millis(1000))
    };
    let recording = RecordingBackoff {
        inner: ExponentialBackoff::new(settings),
        waits: Arc::new(Mutex::new(Vec::new())),
    };

    runner(&connection, &recording, 2)
        .run(|txn| async move {
            txn.set(&doc("quota/y"), data("n", 1))?;
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(recording.waits(), vec![1000]);
}
